//! curl-style presentation: `*` diagnostics, `>` request lines, `<`
//! response lines. Written over any sink so the core never touches the
//! process streams itself; the binary passes stderr.
//!
//! Values of credential-bearing headers are masked before they leave.

use std::io::{self, Write};

use reqwest::blocking::Request;

use crate::redact::redact_value;
use crate::response::Response;

fn http_version_label(version: reqwest::Version) -> &'static str {
    match version {
        reqwest::Version::HTTP_09 => "HTTP/0.9",
        reqwest::Version::HTTP_10 => "HTTP/1.0",
        reqwest::Version::HTTP_2 => "HTTP/2",
        reqwest::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    }
}

pub fn print_request(
    request: &Request,
    http2: bool,
    out: &mut impl Write,
) -> io::Result<()> {
    let url = request.url();
    writeln!(out, "* Preparing request to {url}")?;

    let path = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    let version = if http2 { "HTTP/2" } else { "HTTP/1.1" };
    writeln!(out, "> {} {path} {version}", request.method())?;

    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => writeln!(out, "> Host: {host}:{port}")?,
            None => writeln!(out, "> Host: {host}")?,
        }
    }
    for (name, value) in request.headers() {
        let value = value.to_str().unwrap_or("<binary>");
        writeln!(out, "> {}: {}", name, redact_value(name.as_str(), value))?;
    }
    writeln!(out, ">")?;
    Ok(())
}

pub fn print_response_headers(response: &Response, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "< {} {}",
        http_version_label(response.version()),
        response.status()
    )?;
    for (name, value) in response.headers() {
        let value = value.to_str().unwrap_or("<binary>");
        writeln!(out, "< {}: {}", name, redact_value(name.as_str(), value))?;
    }
    writeln!(out, "<")?;
    Ok(())
}

/// The `-i` dump: status line and headers ahead of the body, unredacted,
/// the way curl writes them to the output stream.
pub fn write_head(response: &Response, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "{} {}",
        http_version_label(response.version()),
        response.status()
    )?;
    for (name, value) in response.headers() {
        writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"))?;
    }
    writeln!(out)?;
    Ok(())
}
