//! Local hyper server the integration tests point requests at. Each test
//! passes a closure that maps requests to responses; the server counts the
//! requests it serves so tests can assert on attempt counts.
#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::net;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use tokio::runtime;
use tokio::sync::oneshot;

pub type Body = Full<Bytes>;
type Builder = hyper_util::server::conn::auto::Builder<hyper_util::rt::TokioExecutor>;

pub struct Server {
    addr: net::SocketAddr,
    hits: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Server {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn assert_hits(&self, hits: usize) {
        assert_eq!(self.hits(), hits);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// http() is generic and tiny; http_inner() carries the body. A closure is a
// fresh type per test, so keeping the generic part small keeps rebuilds fast.

pub fn http<F, Fut>(func: F) -> Server
where
    F: Fn(Request<hyper::body::Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    http_inner(Arc::new(move |req| Box::new(Box::pin(func(req)))))
}

type Serv = dyn Fn(Request<hyper::body::Incoming>) -> Box<ServFut> + Send + Sync;
type ServFut = dyn Future<Output = Response<Body>> + Send + Unpin;

fn http_inner(func: Arc<Serv>) -> Server {
    // The server gets its own runtime in its own thread so blocking client
    // code in the test body can't starve it.
    thread::spawn(move || {
        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("new rt");
        let listener = rt.block_on(async {
            tokio::net::TcpListener::bind(&net::SocketAddr::from(([127, 0, 0, 1], 0)))
                .await
                .unwrap()
        });
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        {
            let hits = hits.clone();
            thread::spawn(move || {
                let serve = rt.spawn(async move {
                    let builder = Builder::new(hyper_util::rt::TokioExecutor::new());
                    loop {
                        let svc = {
                            let func = func.clone();
                            let hits = hits.clone();
                            service_fn(move |req| {
                                let fut = func(req);
                                let hits = hits.clone();
                                async move {
                                    hits.fetch_add(1, Ordering::SeqCst);
                                    Ok::<_, Infallible>(fut.await)
                                }
                            })
                        };
                        let (io, _) = listener.accept().await.unwrap();
                        let builder = builder.clone();
                        tokio::spawn(async move {
                            let _ = builder
                                .serve_connection(hyper_util::rt::TokioIo::new(io), svc)
                                .await;
                        });
                    }
                });
                let _ = rt.block_on(shutdown_rx);
                serve.abort();
            });
        }

        Server { addr, hits, shutdown_tx: Some(shutdown_tx) }
    })
    .join()
    .unwrap()
}
