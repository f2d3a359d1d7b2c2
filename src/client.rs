//! Per-request transport construction.
//!
//! Every execution builds its own `reqwest::blocking::Client` so that
//! per-request TLS, proxy, and timeout options are honoured independently
//! and no state leaks between requests that don't share a jar.

use std::fs::File;
use std::io::Read as _;
use std::net::ToSocketAddrs as _;

use reqwest::blocking::{Client, ClientBuilder};
use url::Url;

use crate::context::Context;
use crate::cookies::CookieJar;
use crate::error::{Error, Result};
use crate::options::RequestOptions;
use crate::{proxy, tls};

pub(crate) struct BuiltClient {
    pub client: Client,
    pub jar: CookieJar,
}

/// The jar for this request: the caller's shared handle, or a fresh one,
/// pre-loaded from the cookie file when one is set.
fn resolve_jar(options: &RequestOptions) -> Result<CookieJar> {
    let jar = options.jar.clone().unwrap_or_default();
    if let Some(path) = &options.cookie_file {
        jar.load_from(path)?;
    }
    Ok(jar)
}

pub(crate) fn build_client(options: &RequestOptions, ctx: &Context) -> Result<BuiltClient> {
    let jar = resolve_jar(options)?;

    let mut builder = Client::builder()
        .http1_title_case_headers()
        .http2_adaptive_window(true)
        .redirect(redirect_policy(options))
        .connect_timeout(options.connect_timeout)
        .timeout(effective_timeout(options, ctx))
        .no_gzip()
        .no_deflate()
        .no_brotli()
        .use_rustls_tls()
        .cookie_provider(jar.store());

    builder = match (options.http2, options.http2_only) {
        (_, true) => builder.http2_prior_knowledge(),
        (true, false) => builder,
        (false, false) => builder.http1_only(),
    };

    builder = apply_tls(builder, options)?;

    if let Some(proxy) = proxy::build_proxy(&options.proxy)? {
        builder = builder.proxy(proxy);
        builder = apply_proxy_tls(builder, options)?;
    }

    if let Some(server_name) = &options.tls.server_name {
        builder = pin_sni_address(builder, options, server_name)?;
    }

    log::trace!("finalizing client for {:?}", options.url);
    let client = builder.build()?;
    Ok(BuiltClient { client, jar })
}

/// Context Priority Pattern: a context deadline silences the client-level
/// timeout entirely; the retry engine installs the remaining time on each
/// attempt instead. Without a deadline the options timeout is the only
/// authority.
fn effective_timeout(
    options: &RequestOptions,
    ctx: &Context,
) -> Option<std::time::Duration> {
    if ctx.deadline().is_some() {
        None
    } else {
        options.timeout
    }
}

fn redirect_policy(options: &RequestOptions) -> reqwest::redirect::Policy {
    if options.follow_redirects && options.max_redirects > 0 {
        reqwest::redirect::Policy::limited(options.max_redirects as usize)
    } else {
        reqwest::redirect::Policy::none()
    }
}

fn apply_tls(mut builder: ClientBuilder, options: &RequestOptions) -> Result<ClientBuilder> {
    let tls = &options.tls;

    if tls.needs_custom_config() {
        // Cipher selection and pinning go beyond the builder's vocabulary.
        let config = tls::build_rustls_config(tls, options.http2, options.http2_only)?;
        return Ok(builder.use_preconfigured_tls(config));
    }

    if let Some(min) = tls.min_version {
        builder = builder.min_tls_version(min.into());
    }
    if let Some(max) = tls.max_version {
        builder = builder.max_tls_version(max.into());
    }
    if tls.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &tls.ca_cert {
        builder = builder.tls_built_in_root_certs(false);
        builder = add_root_certificates(builder, path)?;
    }
    if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
        builder = builder.identity(load_identity(cert, key)?);
    }
    Ok(builder)
}

/// An `https://` proxy handshakes with the same client TLS configuration,
/// so its CA, identity, and skip-verify material merge in here. SOCKS and
/// plain-http proxies have no TLS leg; their fields validate and then rest.
fn apply_proxy_tls(
    mut builder: ClientBuilder,
    options: &RequestOptions,
) -> Result<ClientBuilder> {
    if !proxy::proxy_uses_tls(&options.proxy) {
        return Ok(builder);
    }
    let proxy = &options.proxy;
    if proxy.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = &proxy.ca_cert {
        builder = add_root_certificates(builder, path)?;
    }
    if let (Some(cert), Some(key)) = (&proxy.cert, &proxy.key) {
        builder = builder.identity(load_identity(cert, key)?);
    }
    Ok(builder)
}

fn add_root_certificates(
    mut builder: ClientBuilder,
    path: &std::path::Path,
) -> Result<ClientBuilder> {
    let mut buffer = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|err| Error::file(path, "read CA bundle", err))?;
    let pems = pem::parse_many(&buffer).map_err(|err| {
        Error::validation("cacert", format!("cannot parse {}: {err}", path.display()))
    })?;
    if pems.is_empty() {
        return Err(Error::validation(
            "cacert",
            format!("no certificates in {}", path.display()),
        ));
    }
    for block in pems {
        let certificate = reqwest::Certificate::from_pem(pem::encode(&block).as_bytes())
            .map_err(|err| {
                Error::validation("cacert", format!("bad certificate in {}: {err}", path.display()))
            })?;
        builder = builder.add_root_certificate(certificate);
    }
    Ok(builder)
}

/// reqwest wants cert and key concatenated in one PEM buffer.
fn load_identity(
    cert: &std::path::Path,
    key: &std::path::Path,
) -> Result<reqwest::Identity> {
    let mut buffer = Vec::new();
    File::open(cert)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|err| Error::file(cert, "read cert file", err))?;
    buffer.push(b'\n');
    File::open(key)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|err| Error::file(key, "read key file", err))?;
    reqwest::Identity::from_pem(&buffer)
        .map_err(|err| Error::validation("cert", format!("bad client identity: {err}")))
}

/// SNI override: the request is re-addressed at the override name (see
/// [`crate::request`]), and the override name is pinned here to the real
/// host's address so the bytes still go to the original server.
fn pin_sni_address(
    builder: ClientBuilder,
    options: &RequestOptions,
    server_name: &str,
) -> Result<ClientBuilder> {
    let url = options.url.as_ref().expect("validated");
    let host = url
        .host_str()
        .ok_or_else(|| Error::validation("url", "no host to resolve"))?;
    let port = url.port_or_known_default().unwrap_or(443);
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|err| {
            Error::validation("sni", format!("cannot resolve {host}:{port}: {err}"))
        })?
        .next()
        .ok_or_else(|| {
            Error::validation("sni", format!("no addresses for {host}:{port}"))
        })?;
    log::debug!("SNI override: {server_name} pinned to {addr}");
    Ok(builder.resolve(server_name, addr))
}

/// Re-address a URL at the SNI override name, when one is set.
pub(crate) fn effective_url(options: &RequestOptions) -> Result<Url> {
    let mut url = options.url.clone().expect("validated");
    if let Some(server_name) = &options.tls.server_name {
        url.set_host(Some(server_name))
            .map_err(|err| Error::validation("sni", format!("bad server name: {err}")))?;
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_disables_client_timeout() {
        let mut options = RequestOptions::new("https://example.test".parse().unwrap());
        options.timeout = Some(std::time::Duration::from_secs(30));

        let ctx = Context::background();
        assert_eq!(
            effective_timeout(&options, &ctx),
            Some(std::time::Duration::from_secs(30))
        );

        let (ctx, _cancel) = Context::with_timeout(std::time::Duration::from_secs(1));
        assert_eq!(effective_timeout(&options, &ctx), None);
    }

    #[test]
    fn builds_a_plain_client() {
        let options = RequestOptions::new("https://example.test".parse().unwrap());
        let built = build_client(&options, &Context::background()).unwrap();
        drop(built);
    }

    #[test]
    fn builds_with_custom_ciphers() {
        let mut options = RequestOptions::new("https://example.test".parse().unwrap());
        options.tls.ciphers.push("ECDHE-RSA-AES128-GCM-SHA256".into());
        build_client(&options, &Context::background()).unwrap();
    }

    #[test]
    fn effective_url_swaps_host_for_sni() {
        let mut options = RequestOptions::new("https://origin.test/p?q=1".parse().unwrap());
        options.tls.server_name = Some("front.test".into());
        let url = effective_url(&options).unwrap();
        assert_eq!(url.as_str(), "https://front.test/p?q=1");
    }
}
