//! Table-driven conversion from curl tokens to [`RequestOptions`].
//!
//! Every supported flag has one table entry: its spellings, whether it takes
//! a value, and the function that applies it. The walk over the token stream
//! also handles the short-flag conveniences curl users expect: clustered
//! booleans (`-sv`), attached short values (`-XPOST`), and `--long=value`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::error::{Error, Result};
use crate::options::{Body, Part, RequestOptions, TlsVersion};
use crate::tokenizer::Token;

struct FlagSpec {
    /// All spellings, e.g. `&["-H", "--header"]`.
    names: &'static [&'static str],
    takes_value: bool,
    apply: fn(&mut RequestOptions, &str) -> Result<()>,
}

macro_rules! flag {
    ($names:expr, value, $apply:expr) => {
        FlagSpec { names: $names, takes_value: true, apply: $apply }
    };
    ($names:expr, $apply:expr) => {
        FlagSpec { names: $names, takes_value: false, apply: $apply }
    };
}

static FLAGS: &[FlagSpec] = &[
    // Request data
    flag!(&["-X", "--request"], value, |o, v| {
        o.method = Some(Method::from_bytes(v.to_uppercase().as_bytes()).map_err(|_| {
            Error::validation("method", format!("invalid HTTP method {v:?}"))
        })?);
        Ok(())
    }),
    flag!(&["-d", "--data", "--data-ascii"], value, |o, v| {
        let data = if let Some(path) = v.strip_prefix('@') {
            let bytes = read_file(path, "read data file")?;
            strip_newlines(bytes)
        } else {
            v.as_bytes().to_vec()
        };
        append_raw_data(o, data)
    }),
    flag!(&["--data-raw"], value, |o, v| {
        append_raw_data(o, v.as_bytes().to_vec())
    }),
    flag!(&["--data-binary"], value, |o, v| {
        let data = if let Some(path) = v.strip_prefix('@') {
            read_file(path, "read data file")?
        } else {
            v.as_bytes().to_vec()
        };
        append_raw_data(o, data)
    }),
    flag!(&["--data-urlencode"], value, |o, v| {
        append_raw_data(o, urlencode_data(v)?)
    }),
    flag!(&["-F", "--form"], value, |o, v| {
        let part = parse_form_part(v)?;
        match &mut o.body {
            Body::None => o.body = Body::Multipart(vec![part]),
            Body::Multipart(parts) => parts.push(part),
            Body::Raw(..) | Body::Form(..) => return Err(Error::ConflictingBody),
        }
        Ok(())
    }),
    flag!(&["-G", "--get"], |o, _| {
        // Accumulated -d data moves into the query string once all flags
        // are in, so -G works in any position.
        o.data_as_query = true;
        Ok(())
    }),
    // Headers, form, auth
    flag!(&["-H", "--header"], value, |o, v| {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            Error::validation("header", format!("expected \"Name: value\", got {v:?}"))
        })?;
        o.header(name.trim(), value.trim());
        Ok(())
    }),
    flag!(&["-u", "--user"], value, |o, v| {
        let (user, password) = match v.split_once(':') {
            Some((user, password)) => (user.to_string(), Some(password.to_string())),
            None => (v.to_string(), None),
        };
        o.basic_auth = Some((user, password));
        Ok(())
    }),
    flag!(&["--oauth2-bearer"], value, |o, v| {
        o.bearer = Some(v.to_string());
        Ok(())
    }),
    flag!(&["-A", "--user-agent"], value, |o, v| {
        o.user_agent = Some(v.to_string());
        Ok(())
    }),
    flag!(&["-e", "--referer"], value, |o, v| {
        o.referer = Some(v.to_string());
        Ok(())
    }),
    flag!(&["-b", "--cookie"], value, |o, v| {
        // curl: an '=' means inline cookie data, otherwise a file name.
        if v.contains('=') {
            o.cookies.push(v.to_string());
        } else {
            o.cookie_file = Some(PathBuf::from(v));
        }
        Ok(())
    }),
    flag!(&["-c", "--cookie-jar"], value, |o, v| {
        o.cookie_jar = Some(PathBuf::from(v));
        Ok(())
    }),
    // Network & output
    flag!(&["-L", "--location"], |o, _| {
        o.follow_redirects = true;
        Ok(())
    }),
    flag!(&["--max-redirs"], value, |o, v| {
        let max: u32 = v.parse().map_err(|_| {
            Error::validation("max-redirs", format!("not a redirect count: {v:?}"))
        })?;
        o.max_redirects = max;
        o.follow_redirects = max > 0;
        Ok(())
    }),
    flag!(&["--compressed"], |o, _| {
        o.compression = true;
        Ok(())
    }),
    flag!(&["-m", "--max-time"], value, |o, v| {
        o.timeout = Some(parse_seconds(v, "max-time")?);
        Ok(())
    }),
    flag!(&["--connect-timeout"], value, |o, v| {
        o.connect_timeout = Some(parse_seconds(v, "connect-timeout")?);
        Ok(())
    }),
    flag!(&["--max-filesize"], value, |o, v| {
        o.max_response_body = Some(v.parse().map_err(|_| {
            Error::validation("max-filesize", format!("not a byte count: {v:?}"))
        })?);
        Ok(())
    }),
    flag!(&["--retry"], value, |o, v| {
        o.retry.max_retries = v.parse().map_err(|_| {
            Error::validation("retry", format!("not a retry count: {v:?}"))
        })?;
        Ok(())
    }),
    flag!(&["--retry-delay"], value, |o, v| {
        o.retry.delay = parse_seconds(v, "retry-delay")?;
        Ok(())
    }),
    flag!(&["-o", "--output"], value, |o, v| {
        if v != "-" {
            o.output = Some(PathBuf::from(v));
        }
        Ok(())
    }),
    flag!(&["-s", "--silent"], |o, _| {
        o.silent = true;
        Ok(())
    }),
    flag!(&["-v", "--verbose"], |o, _| {
        o.verbose = true;
        Ok(())
    }),
    flag!(&["-i", "--include"], |o, _| {
        o.include_headers = true;
        Ok(())
    }),
    flag!(&["-I", "--head"], |o, _| {
        o.head_only = true;
        Ok(())
    }),
    flag!(&["-f", "--fail"], |o, _| {
        o.fail_on_status = true;
        Ok(())
    }),
    flag!(&["--url"], value, |o, v| {
        set_url(o, v)
    }),
    // TLS / security
    flag!(&["-k", "--insecure"], |o, _| {
        o.tls.insecure = true;
        Ok(())
    }),
    flag!(&["--cert"], value, |o, v| {
        o.tls.cert = Some(PathBuf::from(v));
        Ok(())
    }),
    flag!(&["--key"], value, |o, v| {
        o.tls.key = Some(PathBuf::from(v));
        Ok(())
    }),
    flag!(&["--cacert"], value, |o, v| {
        o.tls.ca_cert = Some(PathBuf::from(v));
        Ok(())
    }),
    flag!(&["--ciphers"], value, |o, v| {
        o.tls.ciphers.extend(split_cipher_list(v));
        Ok(())
    }),
    flag!(&["--tls13-ciphers"], value, |o, v| {
        o.tls.tls13_ciphers.extend(split_cipher_list(v));
        Ok(())
    }),
    flag!(&["--pinnedpubkey"], value, |o, v| {
        o.tls.pinned_keys.extend(v.split(';').map(str::to_string));
        Ok(())
    }),
    // Version selectors
    flag!(&["--tlsv1.0"], |o, _| {
        o.tls.min_version = Some(TlsVersion::Tls1_0);
        Ok(())
    }),
    flag!(&["--tlsv1.1"], |o, _| {
        o.tls.min_version = Some(TlsVersion::Tls1_1);
        Ok(())
    }),
    flag!(&["--tlsv1.2"], |o, _| {
        o.tls.min_version = Some(TlsVersion::Tls1_2);
        Ok(())
    }),
    flag!(&["--tlsv1.3"], |o, _| {
        o.tls.min_version = Some(TlsVersion::Tls1_3);
        Ok(())
    }),
    flag!(&["--tls-max"], value, |o, v| {
        o.tls.max_version = Some(TlsVersion::parse(v).ok_or_else(|| {
            Error::validation("tls-max", format!("unknown TLS version {v:?}"))
        })?);
        Ok(())
    }),
    flag!(&["--http2"], |o, _| {
        o.http2 = true;
        Ok(())
    }),
    flag!(&["--http2-prior-knowledge"], |o, _| {
        o.http2 = true;
        o.http2_only = true;
        Ok(())
    }),
    // Proxy
    flag!(&["-x", "--proxy"], value, |o, v| {
        let url = parse_url_lenient(v)?;
        o.proxy.url = Some(url);
        Ok(())
    }),
    flag!(&["--noproxy"], value, |o, v| {
        o.proxy
            .no_proxy
            .extend(v.split(',').map(|host| host.trim().to_string()));
        Ok(())
    }),
    flag!(&["--proxy-cert"], value, |o, v| {
        o.proxy.cert = Some(PathBuf::from(v));
        Ok(())
    }),
    flag!(&["--proxy-key"], value, |o, v| {
        o.proxy.key = Some(PathBuf::from(v));
        Ok(())
    }),
    flag!(&["--proxy-cacert"], value, |o, v| {
        o.proxy.ca_cert = Some(PathBuf::from(v));
        Ok(())
    }),
    flag!(&["--proxy-insecure"], |o, _| {
        o.proxy.insecure = true;
        Ok(())
    }),
];

fn lookup(name: &str) -> Option<&'static FlagSpec> {
    FLAGS.iter().find(|spec| spec.names.contains(&name))
}

/// Convert a token stream into request options.
pub fn convert(tokens: &[Token]) -> Result<RequestOptions> {
    let mut options = RequestOptions::default();
    let mut iter = tokens.iter().peekable();

    while let Some(token) = iter.next() {
        if !token.is_flag() {
            set_url(&mut options, &token.text)?;
            continue;
        }
        let text = token.text.as_str();

        // --long and --long=value
        if let Some(long) = text.strip_prefix("--") {
            if let Some((name, value)) = long.split_once('=') {
                let name = format!("--{name}");
                let spec = lookup(&name).ok_or_else(|| Error::UnknownFlag(name.clone()))?;
                if !spec.takes_value {
                    return Err(Error::validation("flag", format!("{name} takes no value")));
                }
                (spec.apply)(&mut options, value)?;
            } else {
                let spec = lookup(text).ok_or_else(|| Error::UnknownFlag(text.to_string()))?;
                let value = if spec.takes_value {
                    next_value(&mut iter, text)?
                } else {
                    ""
                };
                (spec.apply)(&mut options, value)?;
            }
            continue;
        }

        // -X value, -Xvalue, or a cluster of boolean shorts like -sv.
        if !text.is_char_boundary(2) {
            return Err(Error::UnknownFlag(text.to_string()));
        }
        let short = &text[..2];
        match lookup(short) {
            Some(spec) if spec.takes_value => {
                if text.len() > 2 {
                    (spec.apply)(&mut options, &text[2..])?;
                } else {
                    (spec.apply)(&mut options, next_value(&mut iter, short)?)?;
                }
            }
            Some(spec) if text.len() == 2 => (spec.apply)(&mut options, "")?,
            _ => {
                // Try it as clustered booleans; all must be known no-value
                // shorts or the whole token is unknown.
                let mut applications = Vec::new();
                for c in text[1..].chars() {
                    let name = format!("-{c}");
                    match lookup(&name) {
                        Some(spec) if !spec.takes_value => applications.push(spec),
                        _ => return Err(Error::UnknownFlag(text.to_string())),
                    }
                }
                for spec in applications {
                    (spec.apply)(&mut options, "")?;
                }
            }
        }
    }

    if options.data_as_query {
        options.method.get_or_insert(Method::GET);
        move_data_to_query(&mut options)?;
    }

    Ok(options)
}

fn next_value<'a>(
    iter: &mut std::iter::Peekable<std::slice::Iter<'a, Token>>,
    flag: &str,
) -> Result<&'a str> {
    iter.next()
        .map(|token| token.text.as_str())
        .ok_or_else(|| Error::validation("flag", format!("{flag} requires a value")))
}

fn set_url(options: &mut RequestOptions, text: &str) -> Result<()> {
    if options.url.is_some() {
        return Err(Error::AmbiguousUrl(text.to_string()));
    }
    options.url = Some(parse_url_lenient(text)?);
    Ok(())
}

/// Parse a URL the way curl does: a missing scheme means `http://`.
fn parse_url_lenient(text: &str) -> Result<Url> {
    let parsed = match Url::parse(text) {
        Ok(url) if !url.cannot_be_a_base() => Ok(url),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{text}"))
        }
        Err(err) => Err(err),
    };
    parsed.map_err(|err| Error::validation("url", format!("cannot parse {text:?}: {err}")))
}

fn read_file(path: &str, op: &'static str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|err| Error::file(path, op, err))
}

/// `-d @file` drops CR and LF, matching curl; `--data-binary` keeps them.
fn strip_newlines(bytes: Vec<u8>) -> Vec<u8> {
    bytes.into_iter().filter(|b| *b != b'\r' && *b != b'\n').collect()
}

/// Repeated data flags join with `&`. A raw body can only coexist with more
/// raw data, never with multipart parts.
fn append_raw_data(options: &mut RequestOptions, data: Vec<u8>) -> Result<()> {
    match &mut options.body {
        Body::None => options.body = Body::Raw(data),
        Body::Raw(existing) => {
            existing.push(b'&');
            existing.extend_from_slice(&data);
        }
        Body::Multipart(..) | Body::Form(..) => return Err(Error::ConflictingBody),
    }
    Ok(())
}

const URLENCODE: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn urlencode(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, URLENCODE).to_string()
}

/// `--data-urlencode` grammar: `content`, `=content`, `name=content`,
/// `@file`, `name@file`. An `=` anywhere beats the `name@file` form, the
/// same precedence curl applies.
fn urlencode_data(v: &str) -> Result<Vec<u8>> {
    let encoded = if let Some(path) = v.strip_prefix('@') {
        let bytes = read_file(path, "read data file")?;
        urlencode(&String::from_utf8_lossy(&bytes))
    } else if let Some(content) = v.strip_prefix('=') {
        urlencode(content)
    } else if let Some((name, content)) = v.split_once('=') {
        format!("{name}={}", urlencode(content))
    } else if let Some((name, path)) = v.split_once('@') {
        let bytes = read_file(path, "read data file")?;
        format!("{name}={}", urlencode(&String::from_utf8_lossy(&bytes)))
    } else {
        urlencode(v)
    };
    Ok(encoded.into_bytes())
}

/// `-F` grammar subset: `name=value`, `name=@file[;type=ct][;filename=fn]`,
/// `name=<file` (file contents as a text field).
fn parse_form_part(v: &str) -> Result<Part> {
    let (name, value) = v.split_once('=').ok_or_else(|| {
        Error::validation("form", format!("expected name=value, got {v:?}"))
    })?;

    if let Some(rest) = value.strip_prefix('@') {
        let mut segments = rest.split(';');
        let path = PathBuf::from(segments.next().unwrap_or_default());
        let mut content_type = None;
        let mut file_name = None;
        for segment in segments {
            if let Some(ct) = segment.strip_prefix("type=") {
                content_type = Some(ct.to_string());
            } else if let Some(fname) = segment.strip_prefix("filename=") {
                file_name = Some(fname.to_string());
            } else {
                return Err(Error::validation(
                    "form",
                    format!("unknown part attribute {segment:?}"),
                ));
            }
        }
        Ok(Part::File { name: name.to_string(), path, content_type, file_name })
    } else if let Some(path) = value.strip_prefix('<') {
        let bytes = read_file(path, "read form file")?;
        Ok(Part::Text {
            name: name.to_string(),
            value: String::from_utf8_lossy(&bytes).into_owned(),
        })
    } else {
        Ok(Part::Text { name: name.to_string(), value: value.to_string() })
    }
}

/// `-G`: rewrite accumulated raw data as query pairs.
fn move_data_to_query(options: &mut RequestOptions) -> Result<()> {
    let data = match std::mem::take(&mut options.body) {
        Body::None => return Ok(()),
        Body::Raw(data) => data,
        other => {
            options.body = other;
            return Err(Error::validation("get", "-G only applies to -d data"));
        }
    };
    let text = String::from_utf8_lossy(&data).into_owned();
    for pair in text.split('&') {
        match pair.split_once('=') {
            Some((name, value)) => options
                .query
                .push((decode_component(name), decode_component(value))),
            None => options.query.push((decode_component(pair), String::new())),
        }
    }
    Ok(())
}

fn decode_component(text: &str) -> String {
    percent_encoding::percent_decode_str(text)
        .decode_utf8_lossy()
        .into_owned()
}

fn split_cipher_list(v: &str) -> impl Iterator<Item = String> + '_ {
    v.split(':').filter(|name| !name.is_empty()).map(str::to_string)
}

fn parse_seconds(v: &str, field: &'static str) -> Result<Duration> {
    let seconds: f64 = v
        .parse()
        .map_err(|_| Error::validation(field, format!("not a number of seconds: {v:?}")))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::validation(field, format!("negative timeout: {v:?}")));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Convenience used by tests and the multipart builder.
pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
