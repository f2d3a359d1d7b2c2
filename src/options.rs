//! The canonical request-options record.
//!
//! Produced by the flag converter or filled in directly by library callers,
//! validated by [`crate::validate`], and consumed read-only during
//! execution.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::context::Context;
use crate::retry::Transport;

pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Statuses retried by default: 408, 425, 429, 500, 502, 503, 504.
pub const DEFAULT_RETRY_STATUSES: &[u16] = &[408, 425, 429, 500, 502, 503, 504];

/// One part of a multipart body. File parts hold a reference; the file is
/// opened during body assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        path: PathBuf,
        /// Explicit `;type=` override. Guessed from the extension otherwise.
        content_type: Option<String>,
        /// Explicit `;filename=` override.
        file_name: Option<String>,
    },
}

/// The request body. At most one of the three shapes is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    #[default]
    None,
    Raw(Vec<u8>),
    Form(Vec<(String, String)>),
    Multipart(Vec<Part>),
}

impl Body {
    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    /// POST when a body is present, GET otherwise; an explicit method always
    /// wins over this.
    pub fn pick_method(&self) -> Method {
        if self.is_none() {
            Method::GET
        } else {
            Method::POST
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls1_0,
    Tls1_1,
    Tls1_2,
    Tls1_3,
}

impl TlsVersion {
    pub fn parse(s: &str) -> Option<TlsVersion> {
        match s {
            "1.0" | "tlsv1.0" => Some(TlsVersion::Tls1_0),
            "1.1" | "tlsv1.1" => Some(TlsVersion::Tls1_1),
            "1.2" | "tlsv1.2" => Some(TlsVersion::Tls1_2),
            "1.3" | "tlsv1.3" => Some(TlsVersion::Tls1_3),
            _ => None,
        }
    }
}

impl From<TlsVersion> for reqwest::tls::Version {
    fn from(version: TlsVersion) -> Self {
        match version {
            TlsVersion::Tls1_0 => reqwest::tls::Version::TLS_1_0,
            TlsVersion::Tls1_1 => reqwest::tls::Version::TLS_1_1,
            TlsVersion::Tls1_2 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::Tls1_3 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub min_version: Option<TlsVersion>,
    pub max_version: Option<TlsVersion>,
    /// TLS 1.2 cipher names, curl/OpenSSL or IANA spelling.
    pub ciphers: Vec<String>,
    /// TLS 1.3 cipher names.
    pub tls13_ciphers: Vec<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub insecure: bool,
    /// SNI / verification-name override.
    pub server_name: Option<String>,
    /// `sha256//BASE64` pins; a handshake passes when any pin matches the
    /// SHA-256 of the leaf certificate's SubjectPublicKeyInfo.
    pub pinned_keys: Vec<String>,
}

impl TlsOptions {
    /// Whether any field forces a hand-built rustls config instead of the
    /// plain reqwest builder calls.
    pub(crate) fn needs_custom_config(&self) -> bool {
        !self.ciphers.is_empty() || !self.tls13_ciphers.is_empty() || !self.pinned_keys.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    /// `http://`, `https://`, or `socks5://`. The scheme picks the dialer.
    pub url: Option<Url>,
    /// Hosts and domain suffixes that bypass the proxy.
    pub no_proxy: Vec<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub insecure: bool,
}

#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Inclusive retry budget: up to `max_retries + 1` attempts.
    pub max_retries: u32,
    pub delay: Duration,
    /// Backoff multiplier applied per attempt; 1.0 keeps the delay flat.
    pub multiplier: f64,
    pub statuses: BTreeSet<u16>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            max_retries: 0,
            delay: Duration::from_secs(1),
            multiplier: 1.0,
            statuses: DEFAULT_RETRY_STATUSES.iter().copied().collect(),
        }
    }
}

/// Everything needed to execute one request.
#[derive(Clone)]
pub struct RequestOptions {
    // Addressing
    pub method: Option<Method>,
    pub url: Option<Url>,
    pub query: Vec<(String, String)>,
    pub follow_redirects: bool,
    pub max_redirects: u32,

    // Body
    pub body: Body,
    /// `-G`: raw data becomes query parameters instead of a body.
    pub data_as_query: bool,

    // Headers & auth
    /// User headers in the order given; repeated names all survive.
    pub headers: Vec<(String, String)>,
    pub basic_auth: Option<(String, Option<String>)>,
    pub bearer: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,

    // Cookies
    /// Inline `name=value` cookie strings from `-b`.
    pub cookies: Vec<String>,
    /// Netscape-format file read before the request.
    pub cookie_file: Option<PathBuf>,
    /// Netscape-format file written after the request.
    pub cookie_jar: Option<PathBuf>,
    /// Shared in-memory jar; one is created per request when absent.
    pub jar: Option<crate::cookies::CookieJar>,

    // TLS
    pub tls: TlsOptions,

    // Proxy
    pub proxy: ProxyOptions,

    // Transport
    pub http2: bool,
    pub http2_only: bool,
    /// Advertise `Accept-Encoding` and decode the response.
    pub compression: bool,
    /// Explicit encodings to advertise instead of the default trio.
    pub compression_methods: Vec<String>,
    pub connect_timeout: Option<Duration>,
    pub timeout: Option<Duration>,
    pub max_response_body: Option<u64>,

    // Retry
    pub retry: RetryOptions,

    // Execution
    pub fail_on_status: bool,
    pub verbose: bool,
    pub silent: bool,
    pub include_headers: bool,
    pub head_only: bool,
    pub output: Option<PathBuf>,
    pub transport: Option<Arc<dyn Transport>>,
    pub context: Option<Context>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // headers may hold credentials; run them through the redaction
        // helpers before they can reach a log line.
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &crate::redact::redact_pairs(&self.headers))
            .field("body", &self.body)
            .field("follow_redirects", &self.follow_redirects)
            .field("max_redirects", &self.max_redirects)
            .field("tls", &self.tls)
            .field("proxy", &self.proxy)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestOptions {
    pub fn new(url: Url) -> RequestOptions {
        RequestOptions { url: Some(url), ..RequestOptions::default() }
    }

    /// The method actually sent on the wire.
    pub fn effective_method(&self) -> Method {
        if self.head_only {
            return Method::HEAD;
        }
        self.method.clone().unwrap_or_else(|| self.body.pick_method())
    }

    /// Append a header, preserving the order and any repeats.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the user already supplied a header with this name.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            method: None,
            url: None,
            query: Vec::new(),
            // The engine follows redirects out of the box, capped at 10.
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            body: Body::None,
            data_as_query: false,
            headers: Vec::new(),
            basic_auth: None,
            bearer: None,
            user_agent: None,
            referer: None,
            cookies: Vec::new(),
            cookie_file: None,
            cookie_jar: None,
            jar: None,
            tls: TlsOptions::default(),
            proxy: ProxyOptions::default(),
            http2: false,
            http2_only: false,
            compression: false,
            compression_methods: Vec::new(),
            connect_timeout: None,
            timeout: None,
            max_response_body: None,
            retry: RetryOptions::default(),
            fail_on_status: false,
            verbose: false,
            silent: false,
            include_headers: false,
            head_only: false,
            output: None,
            transport: None,
            context: None,
        }
    }
}
