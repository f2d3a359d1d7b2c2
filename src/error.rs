use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;

/// A `Result` alias where the `Err` case is `gocurl::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a context terminated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextErrorKind {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for ContextErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextErrorKind::Canceled => f.write_str("context canceled"),
            ContextErrorKind::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// The errors that may occur while parsing curl syntax, validating options,
/// or executing a request.
#[derive(Debug)]
pub enum Error {
    /// The command string could not be lexed. The position is a byte offset
    /// into the input.
    Syntax { pos: usize, message: String },
    /// An explicit variable map was used and `$NAME` did not resolve.
    UnknownVariable(String),
    /// A flag token that no table entry recognises.
    UnknownFlag(String),
    /// More than one positional URL.
    AmbiguousUrl(String),
    /// `-d` and `-F` were both given.
    ConflictingBody,
    /// An option invariant failed before any I/O.
    Validation { field: &'static str, reason: String },
    /// Network, TLS handshake, DNS, or protocol failure from the transport,
    /// including I/O errors while the response body streams.
    Transport(Box<dyn StdError + Send + Sync>),
    /// The response status was treated as an error (`-f` / fail-on-status).
    Http(StatusCode),
    /// The caller's context ended the request. `attempt` is the attempt index
    /// at which the condition was observed.
    Context { kind: ContextErrorKind, attempt: u32 },
    /// The response body exceeded the configured cap.
    BodyTooLarge { cap: u64, read: u64 },
    /// I/O on a referenced file (cert, key, CA bundle, cookie file, body
    /// file, output file).
    File { path: PathBuf, op: &'static str, source: io::Error },
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Error {
        Error::Validation { field, reason: reason.into() }
    }

    pub(crate) fn file(path: impl Into<PathBuf>, op: &'static str, source: io::Error) -> Error {
        Error::File { path: path.into(), op, source }
    }

    pub(crate) fn context(kind: ContextErrorKind, attempt: u32) -> Error {
        Error::Context { kind, attempt }
    }

    /// True for [`Error::Context`], regardless of the kind.
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Context { .. })
    }

    /// True when the error came out of the wire transport (including
    /// timeouts that were not driven by a context deadline).
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(..))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax { pos, message } => {
                write!(f, "syntax error at byte {pos}: {message}")
            }
            Error::UnknownVariable(name) => write!(f, "unknown variable: ${name}"),
            Error::UnknownFlag(flag) => write!(f, "unknown flag: {flag}"),
            Error::AmbiguousUrl(url) => write!(f, "ambiguous second URL: {url}"),
            Error::ConflictingBody => {
                f.write_str("-d/--data and -F/--form cannot be combined")
            }
            Error::Validation { field, reason } => {
                write!(f, "invalid options: {field}: {reason}")
            }
            Error::Transport(err) => write!(f, "transport error: {err}"),
            Error::Http(status) => write!(f, "HTTP error status: {status}"),
            Error::Context { kind, attempt } => write!(f, "{kind} (attempt {attempt})"),
            Error::BodyTooLarge { cap, read } => {
                write!(f, "response body exceeds {cap} byte cap ({read} bytes read)")
            }
            Error::File { path, op, source } => {
                write!(f, "failed to {op} {}: {source}", path.display())
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Transport(err) => Some(&**err),
            Error::File { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error::Transport(Box::new(err))
    }
}
