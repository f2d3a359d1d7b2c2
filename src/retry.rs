//! The retry engine: drives attempts, replays bodies, backs off between
//! failures, and defers to the context at every suspension point.
//!
//! ```text
//! Initial -> (context precheck) -> Attempt -> {Success | RetriableFail | TerminalFail}
//! RetriableFail -> (context check) -> Sleep -> (context check) -> Attempt
//! ```

use std::io;
use std::time::Duration;

use reqwest::blocking::{Client, Request, Response};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::options::RetryOptions;

/// The capability the engine needs from a transport. `Client` satisfies it;
/// tests and embedders can inject their own.
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request) -> reqwest::Result<Response>;
}

impl Transport for Client {
    fn execute(&self, request: Request) -> reqwest::Result<Response> {
        Client::execute(self, request)
    }
}

/// Buffer the body once, then clone per attempt. Clones share the buffer,
/// so replay costs nothing beyond the first materialization.
fn clone_request(request: &mut Request) -> Result<Request> {
    if let Some(body) = request.body_mut().as_mut() {
        body.buffer()?;
    }
    // Guaranteed to succeed once the body is buffered.
    Ok(request.try_clone().expect("buffered request is cloneable"))
}

fn backoff_delay(retry: &RetryOptions, attempt: u32) -> Duration {
    let factor = retry.multiplier.powi(attempt as i32);
    retry.delay.mul_f64(factor)
}

/// Read out and drop a response that will not be surfaced, so the
/// connection can be reused by the next attempt.
fn drain(mut response: Response) {
    let _ = io::copy(&mut response, &mut io::sink());
}

pub(crate) fn send_with_retries(
    transport: &dyn Transport,
    mut request: Request,
    retry: &RetryOptions,
    ctx: &Context,
) -> Result<Response> {
    if let Some(kind) = ctx.error() {
        return Err(Error::context(kind, 0));
    }

    let mut attempt: u32 = 0;
    loop {
        let mut this_attempt = clone_request(&mut request)?;
        if let Some(remaining) = ctx.remaining() {
            if remaining.is_zero() {
                return Err(Error::context(
                    crate::error::ContextErrorKind::DeadlineExceeded,
                    attempt,
                ));
            }
            // The deadline is authoritative; it rides on the request so the
            // transport aborts mid-flight when it passes.
            *this_attempt.timeout_mut() = Some(remaining);
        }

        match transport.execute(this_attempt) {
            Ok(response) => {
                let status = response.status().as_u16();
                if attempt >= retry.max_retries || !retry.statuses.contains(&status) {
                    return Ok(response);
                }
                log::debug!("attempt {attempt} got HTTP {status}, will retry");
                drain(response);
            }
            Err(err) => {
                // A context that fired during the attempt wins over the
                // transport's own description of the failure.
                if let Some(kind) = ctx.error() {
                    return Err(Error::context(kind, attempt));
                }
                if attempt >= retry.max_retries {
                    return Err(err.into());
                }
                log::debug!("attempt {attempt} failed ({err}), will retry");
            }
        }

        if let Some(kind) = ctx.error() {
            return Err(Error::context(kind, attempt));
        }
        ctx.sleep(backoff_delay(retry, attempt))
            .map_err(|kind| Error::context(kind, attempt))?;
        attempt += 1;
    }
}
