//! The cookie jar and its Netscape-format persistence.
//!
//! In memory the jar is a `cookie_store::CookieStore` behind a mutex so it
//! can be shared between the transport (which reads and writes it during
//! requests) and the options record (which loads and saves it). On disk the
//! format is the tab-separated Netscape convention curl uses:
//!
//! ```text
//! domain <TAB> include_subdomains <TAB> path <TAB> secure <TAB> expires <TAB> name <TAB> value
//! ```

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use cookie_store::{CookieDomain, CookieExpiration, RawCookie};
use reqwest_cookie_store::CookieStoreMutex;
use time::OffsetDateTime;
use url::Url;

use crate::error::{Error, Result};

const NETSCAPE_BANNER: &str = "# Netscape HTTP Cookie File";

/// Shared, thread-safe cookie jar. Clones observe the same store.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    store: Arc<CookieStoreMutex>,
}

impl CookieJar {
    pub fn new() -> CookieJar {
        CookieJar::default()
    }

    /// A new jar pre-populated from a Netscape cookie file.
    pub fn load(path: &Path) -> Result<CookieJar> {
        let jar = CookieJar::new();
        jar.load_from(path)?;
        Ok(jar)
    }

    /// The handle handed to `ClientBuilder::cookie_provider`.
    pub(crate) fn store(&self) -> Arc<CookieStoreMutex> {
        self.store.clone()
    }

    /// Merge a Netscape cookie file into the jar. Expired entries are
    /// dropped on the floor, like curl does on load.
    pub fn load_from(&self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::file(path, "read cookie file", err))?;
        let mut store = self.store.lock().unwrap();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        for (lineno, raw_line) in text.lines().enumerate() {
            let (line, http_only) = match raw_line.strip_prefix("#HttpOnly_") {
                Some(rest) => (rest, true),
                None => (raw_line, false),
            };
            if line.trim().is_empty() || (!http_only && line.starts_with('#')) {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 7 {
                return Err(Error::validation(
                    "cookie",
                    format!(
                        "{}:{}: expected 7 tab-separated fields, found {}",
                        path.display(),
                        lineno + 1,
                        fields.len()
                    ),
                ));
            }
            let [domain, include_subdomains, cookie_path, secure, expires, name, value]: [&str; 7] =
                fields.try_into().unwrap();

            let include_subdomains =
                include_subdomains.eq_ignore_ascii_case("TRUE") || domain.starts_with('.');
            let secure = secure.eq_ignore_ascii_case("TRUE");
            let expires: i64 = expires.parse().map_err(|_| {
                Error::validation(
                    "cookie",
                    format!("{}:{}: bad expiry {expires:?}", path.display(), lineno + 1),
                )
            })?;
            if expires != 0 && expires <= now {
                continue;
            }

            let host = domain.trim_start_matches('.');
            let mut builder = RawCookie::build((name, value)).path(cookie_path.to_string());
            if include_subdomains {
                builder = builder.domain(host.to_string());
            }
            if secure {
                builder = builder.secure(true);
            }
            if http_only {
                builder = builder.http_only(true);
            }
            if expires != 0 {
                let at = OffsetDateTime::from_unix_timestamp(expires).map_err(|err| {
                    Error::validation(
                        "cookie",
                        format!("{}:{}: bad expiry: {err}", path.display(), lineno + 1),
                    )
                })?;
                builder = builder.expires(at);
            }

            let scheme = if secure { "https" } else { "http" };
            let source = Url::parse(&format!("{scheme}://{host}{cookie_path}"))
                .or_else(|_| Url::parse(&format!("{scheme}://{host}/")))
                .map_err(|err| {
                    Error::validation(
                        "cookie",
                        format!("{}:{}: bad domain: {err}", path.display(), lineno + 1),
                    )
                })?;
            store
                .insert_raw(&builder.build(), &source)
                .map_err(|err| {
                    Error::validation(
                        "cookie",
                        format!("{}:{}: {err}", path.display(), lineno + 1),
                    )
                })?;
        }
        Ok(())
    }

    /// Write every unexpired cookie to a Netscape file, replacing it.
    pub fn save(&self, path: &Path) -> Result<()> {
        let store = self.store.lock().unwrap();
        let mut out = Vec::new();
        writeln!(out, "{NETSCAPE_BANNER}").unwrap();
        writeln!(out).unwrap();

        for cookie in store.iter_unexpired() {
            let (domain, include_subdomains) = match &cookie.domain {
                CookieDomain::HostOnly(host) => (host.clone(), false),
                CookieDomain::Suffix(suffix) => (format!(".{suffix}"), true),
                CookieDomain::NotPresent | CookieDomain::Empty => continue,
            };
            let expires = match &cookie.expires {
                CookieExpiration::AtUtc(at) => at.unix_timestamp(),
                CookieExpiration::SessionEnd => 0,
            };
            let http_only_prefix = if cookie.http_only().unwrap_or(false) {
                "#HttpOnly_"
            } else {
                ""
            };
            writeln!(
                out,
                "{http_only_prefix}{domain}\t{include_subdomains}\t{path}\t{secure}\t{expires}\t{name}\t{value}",
                include_subdomains = if include_subdomains { "TRUE" } else { "FALSE" },
                path = cookie.path().unwrap_or("/"),
                secure = if cookie.secure().unwrap_or(false) { "TRUE" } else { "FALSE" },
                name = cookie.name(),
                value = cookie.value(),
            )
            .unwrap();
        }

        fs::write(path, out).map_err(|err| Error::file(path, "write cookie jar", err))
    }

    /// The `Cookie:` request-header value the jar would contribute for `url`.
    pub fn request_values(&self, url: &Url) -> Option<String> {
        let store = self.store.lock().unwrap();
        let joined = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Number of unexpired cookies currently held.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
