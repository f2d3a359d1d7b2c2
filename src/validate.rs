//! Pre-flight validation of a [`RequestOptions`] record.
//!
//! Pure checks over the record itself, plus an optional strict pass that
//! touches the filesystem for every referenced file. First failure wins;
//! nothing is partially accepted.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::options::{Body, Part, RequestOptions};
use crate::tls;

pub fn validate(options: &RequestOptions) -> Result<()> {
    if options.url.is_none() {
        return Err(Error::validation("url", "no URL"));
    }
    let url = options.url.as_ref().unwrap();
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::validation(
                "url",
                format!("unsupported scheme {other:?}"),
            ));
        }
    }

    match (&options.tls.cert, &options.tls.key) {
        (Some(_), None) => {
            return Err(Error::validation("key", "client cert given without a key"));
        }
        (None, Some(_)) => {
            return Err(Error::validation("cert", "client key given without a cert"));
        }
        _ => {}
    }
    match (&options.proxy.cert, &options.proxy.key) {
        (Some(_), None) => {
            return Err(Error::validation("proxy-key", "proxy cert given without a key"));
        }
        (None, Some(_)) => {
            return Err(Error::validation("proxy-cert", "proxy key given without a cert"));
        }
        _ => {}
    }

    if let (Some(min), Some(max)) = (options.tls.min_version, options.tls.max_version) {
        if min > max {
            return Err(Error::validation("tls-max", "TLS minimum exceeds maximum"));
        }
    }

    if options.http2_only && !options.http2 {
        return Err(Error::validation(
            "http2",
            "http2-prior-knowledge requires HTTP/2",
        ));
    }

    // Cipher and pin syntax fails here, before any I/O.
    tls::resolve_tls12_suites(&options.tls.ciphers)?;
    tls::resolve_tls13_suites(&options.tls.tls13_ciphers)?;
    tls::parse_pins(&options.tls.pinned_keys)?;

    if let Some(proxy_url) = &options.proxy.url {
        match proxy_url.scheme() {
            "http" | "https" | "socks5" | "socks5h" => {}
            other => {
                return Err(Error::validation(
                    "proxy",
                    format!("unsupported proxy scheme {other:?}"),
                ));
            }
        }
    }

    if options.retry.multiplier < 1.0 {
        return Err(Error::validation(
            "retry",
            "backoff multiplier below 1 would shrink delays",
        ));
    }

    Ok(())
}

/// [`validate`], then confirm that every referenced file exists and is
/// readable. The binary runs this; library callers opt in.
pub fn validate_strict(options: &RequestOptions) -> Result<()> {
    validate(options)?;

    let mut files: Vec<(&'static str, &Path)> = Vec::new();
    for (field, path) in [
        ("cert", &options.tls.cert),
        ("key", &options.tls.key),
        ("cacert", &options.tls.ca_cert),
        ("proxy-cert", &options.proxy.cert),
        ("proxy-key", &options.proxy.key),
        ("proxy-cacert", &options.proxy.ca_cert),
        ("cookie", &options.cookie_file),
    ] {
        if let Some(path) = path {
            files.push((field, path));
        }
    }
    if let Body::Multipart(parts) = &options.body {
        for part in parts {
            if let Part::File { path, .. } = part {
                files.push(("form", path));
            }
        }
    }

    for (field, path) in files {
        fs::metadata(path)
            .and_then(|meta| {
                if meta.is_dir() {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "is a directory",
                    ))
                } else {
                    // Readability, not just existence.
                    fs::File::open(path).map(|_| ())
                }
            })
            .map_err(|err| {
                Error::validation(field, format!("{}: {err}", path.display()))
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TlsVersion;

    fn base() -> RequestOptions {
        RequestOptions::new("https://example.test".parse().unwrap())
    }

    #[test]
    fn accepts_defaults() {
        validate(&base()).unwrap();
    }

    #[test]
    fn rejects_missing_url() {
        let err = validate(&RequestOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "url", .. }));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let options = RequestOptions::new("ftp://example.test".parse().unwrap());
        assert!(validate(&options).is_err());
    }

    #[test]
    fn cert_requires_key_and_vice_versa() {
        let mut options = base();
        options.tls.cert = Some("client.pem".into());
        assert!(matches!(
            validate(&options).unwrap_err(),
            Error::Validation { field: "key", .. }
        ));

        let mut options = base();
        options.tls.key = Some("client.key".into());
        assert!(matches!(
            validate(&options).unwrap_err(),
            Error::Validation { field: "cert", .. }
        ));
    }

    #[test]
    fn http2_only_implies_http2() {
        let mut options = base();
        options.http2_only = true;
        assert!(validate(&options).is_err());
        options.http2 = true;
        validate(&options).unwrap();
    }

    #[test]
    fn unknown_cipher_fails_validation() {
        let mut options = base();
        options.tls.ciphers.push("TLS_TOTALLY_REAL".into());
        assert!(validate(&options).is_err());
    }

    #[test]
    fn inverted_tls_bounds_fail() {
        let mut options = base();
        options.tls.min_version = Some(TlsVersion::Tls1_3);
        options.tls.max_version = Some(TlsVersion::Tls1_2);
        assert!(validate(&options).is_err());
    }

    #[test]
    fn strict_checks_files() {
        let mut options = base();
        options.tls.cert = Some("/definitely/not/here.pem".into());
        options.tls.key = Some("/definitely/not/here.key".into());
        validate(&options).unwrap();
        assert!(validate_strict(&options).is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        let mut options = base();
        options.cookie_file = Some(file.path().to_path_buf());
        validate_strict(&options).unwrap();
    }
}
