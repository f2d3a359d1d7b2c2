//! Proxy selection. The URL scheme picks the dialer: `http://` and
//! `https://` CONNECT proxies, `socks5://` (and `socks5h://`) SOCKS.

use crate::error::Result;
use crate::options::ProxyOptions;

/// The proxy to install on the client builder, if any. No-proxy entries
/// use reqwest's suffix matching, which covers both the `host` and
/// `.domain` forms.
pub(crate) fn build_proxy(options: &ProxyOptions) -> Result<Option<reqwest::Proxy>> {
    let Some(url) = &options.url else {
        return Ok(None);
    };
    let mut proxy = reqwest::Proxy::all(url.clone())?;
    if !options.no_proxy.is_empty() {
        proxy = proxy.no_proxy(reqwest::NoProxy::from_string(&options.no_proxy.join(",")));
    }
    Ok(Some(proxy))
}

/// Whether the proxy leg itself is TLS, i.e. whether the proxy TLS options
/// have anything to act on.
pub(crate) fn proxy_uses_tls(options: &ProxyOptions) -> bool {
    options
        .url
        .as_ref()
        .is_some_and(|url| url.scheme() == "https")
}
