//! Response delivery: content decoding, the body-size cap, and the choice
//! between a streaming reader and a materialized buffer.
//!
//! The cap sits on the decoded byte stream and is enforced on every read,
//! in both modes.

use std::cell::Cell;
use std::fmt;
use std::io::{self, Read};
use std::rc::Rc;
use std::str::FromStr;

use brotli::Decompressor as BrotliDecoder;
use flate2::read::{GzDecoder, ZlibDecoder};
use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_LENGTH, TRANSFER_ENCODING};
use reqwest::StatusCode;
use url::Url;

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
pub enum CompressionType {
    Gzip,
    Deflate,
    Brotli,
}

impl FromStr for CompressionType {
    type Err = ();
    fn from_str(value: &str) -> Result<CompressionType, ()> {
        match value {
            // RFC 2616 treats "x-gzip" as "gzip".
            "gzip" | "x-gzip" => Ok(CompressionType::Gzip),
            "deflate" => Ok(CompressionType::Deflate),
            "br" => Ok(CompressionType::Brotli),
            _ => Err(()),
        }
    }
}

pub fn get_compression_type(headers: &HeaderMap) -> Option<CompressionType> {
    let mut compression_type = headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .find_map(|value| value.to_str().ok().and_then(|value| value.parse().ok()));

    if compression_type.is_none() {
        compression_type = headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .find_map(|value| value.to_str().ok().and_then(|value| value.parse().ok()));
    }

    if compression_type.is_some() {
        if let Some(content_length) = headers.get(CONTENT_LENGTH) {
            if content_length == "0" {
                return None;
            }
        }
    }

    compression_type
}

/// A response plus the delivery options that apply to its body.
pub struct Response {
    inner: reqwest::blocking::Response,
    decompress: bool,
    cap: Option<u64>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.inner.url().as_str())
            .field("status", &self.inner.status())
            .finish_non_exhaustive()
    }
}

impl Response {
    pub(crate) fn new(
        inner: reqwest::blocking::Response,
        decompress: bool,
        cap: Option<u64>,
    ) -> Response {
        Response { inner, decompress, cap }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    pub fn version(&self) -> reqwest::Version {
        self.inner.version()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    /// Streaming delivery: a reader over the (decoded) body, cap enforced
    /// on every read. Exceeding the cap surfaces as an
    /// `io::ErrorKind::InvalidData` error carrying [`CapExceeded`].
    pub fn into_reader(self) -> impl Read {
        let Response { inner, decompress, cap } = self;
        let compression = if decompress {
            get_compression_type(inner.headers())
        } else {
            None
        };
        CapReader::new(decompress_reader(inner, compression), cap)
    }

    /// Materialized delivery: the whole (decoded) body, or
    /// [`Error::BodyTooLarge`] once the cap is crossed.
    pub fn bytes(self) -> crate::error::Result<Vec<u8>> {
        let cap = self.cap;
        let mut reader = self.into_reader();
        let mut buffer = match cap {
            Some(cap) => Vec::with_capacity(usize::try_from(cap.min(1 << 20)).unwrap_or(0)),
            None => Vec::new(),
        };
        match reader.read_to_end(&mut buffer) {
            Ok(_) => Ok(buffer),
            Err(err) => Err(map_read_error(err)),
        }
    }

    /// Materialized delivery as UTF-8 (lossy).
    pub fn text(self) -> crate::error::Result<String> {
        Ok(String::from_utf8_lossy(&self.bytes()?).into_owned())
    }

    /// Stream the (decoded, cap-checked) body into a writer. io::copy's
    /// 8 KiB buffer drags on fast local downloads; this one is bigger.
    pub fn copy_to(self, out: &mut impl io::Write) -> crate::error::Result<u64> {
        let mut reader = self.into_reader();
        let mut buf = vec![0; 128 * 1024];
        let mut total = 0u64;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(len) => {
                    out.write_all(&buf[..len])
                        .map_err(|err| Error::Transport(Box::new(err)))?;
                    total += len as u64;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_read_error(err)),
            }
        }
    }
}

/// Translate a body-read failure back into the crate taxonomy.
pub(crate) fn map_read_error(err: io::Error) -> Error {
    let is_cap = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<CapExceeded>())
        .is_some();
    if is_cap {
        let cap_err = err.into_inner().unwrap().downcast::<CapExceeded>().unwrap();
        Error::BodyTooLarge { cap: cap_err.cap, read: cap_err.read }
    } else {
        Error::Transport(Box::new(err))
    }
}

/// Marker error surfaced when the response body outgrows the cap.
#[derive(Debug)]
pub struct CapExceeded {
    pub cap: u64,
    pub read: u64,
}

impl fmt::Display for CapExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response body exceeds {} byte cap", self.cap)
    }
}

impl std::error::Error for CapExceeded {}

struct CapReader<R> {
    inner: R,
    cap: Option<u64>,
    read: u64,
}

impl<R> CapReader<R> {
    fn new(inner: R, cap: Option<u64>) -> CapReader<R> {
        CapReader { inner, cap, read: 0 }
    }
}

impl<R: Read> Read for CapReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(cap) = self.cap else {
            return self.inner.read(buf);
        };
        // A body of exactly `cap` bytes succeeds; one byte more trips it,
        // so always leave room to observe the overflowing byte.
        let allowed = (cap - self.read).saturating_add(1);
        let window = buf.len().min(usize::try_from(allowed).unwrap_or(buf.len()));
        let n = self.inner.read(&mut buf[..window])?;
        self.read += n as u64;
        if self.read > cap {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                CapExceeded { cap, read: self.read },
            ));
        }
        Ok(n)
    }
}

/// Decoder in two layers: the inner layer records whether any input byte
/// arrived and stashes real I/O errors; the outer layer suppresses decoder
/// noise for empty bodies (HEAD responses that still declare an encoding)
/// and re-surfaces stashed I/O errors as themselves.
struct OuterReader<'a> {
    decoder: Box<dyn Read + 'a>,
    status: Option<Rc<Status>>,
}

struct Status {
    has_read_data: Cell<bool>,
    read_error: Cell<Option<io::Error>>,
    error_msg: &'static str,
}

impl Read for OuterReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.decoder.read(buf) {
            Ok(n) => Ok(n),
            Err(err) => {
                let Some(ref status) = self.status else {
                    return Err(err);
                };
                match status.read_error.take() {
                    Some(read_error) => Err(read_error),
                    None if !status.has_read_data.get() => Ok(0),
                    None => Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        DecodeError { msg: status.error_msg, err },
                    )),
                }
            }
        }
    }
}

struct InnerReader<R: Read> {
    reader: R,
    status: Rc<Status>,
}

impl<R: Read> Read for InnerReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.status.read_error.set(None);
        match self.reader.read(buf) {
            Ok(0) => Ok(0),
            Ok(len) => {
                self.status.has_read_data.set(true);
                Ok(len)
            }
            Err(err) => {
                // Keep the real error aside and hand the decoder a
                // placeholder; the outer layer swaps it back.
                let msg = err.to_string();
                let kind = err.kind();
                self.status.read_error.set(Some(err));
                Err(io::Error::new(kind, msg))
            }
        }
    }
}

#[derive(Debug)]
struct DecodeError {
    msg: &'static str,
    err: io::Error,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.msg)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}

fn decompress_reader<'a>(
    reader: impl Read + 'a,
    compression_type: Option<CompressionType>,
) -> impl Read + 'a {
    let Some(compression_type) = compression_type else {
        return OuterReader { decoder: Box::new(reader), status: None };
    };

    let status = Rc::new(Status {
        has_read_data: Cell::new(false),
        read_error: Cell::new(None),
        error_msg: match compression_type {
            CompressionType::Gzip => "error decoding gzip response body",
            CompressionType::Deflate => "error decoding deflate response body",
            CompressionType::Brotli => "error decoding brotli response body",
        },
    });
    let reader = InnerReader { reader, status: Rc::clone(&status) };
    OuterReader {
        decoder: match compression_type {
            CompressionType::Gzip => Box::new(GzDecoder::new(reader)),
            CompressionType::Deflate => Box::new(ZlibDecoder::new(reader)),
            // 32K matches the gzip/deflate default buffer size.
            CompressionType::Brotli => Box::new(BrotliDecoder::new(reader, 32 * 1024)),
        },
        status: Some(status),
    }
}
