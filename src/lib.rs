//! A programmable HTTP/HTTPS client that speaks curl command-line syntax.
//!
//! A request can start as a curl command string, a pre-split argument
//! vector, or a hand-built [`RequestOptions`] record; all three meet in the
//! same execution core, so behavior is identical whichever door you come in
//! through.
//!
//! ```no_run
//! use gocurl::{parse_command, send};
//!
//! # fn main() -> gocurl::Result<()> {
//! let options = parse_command(
//!     r#"curl -X POST -H "Content-Type: application/json" -d '{"a":1}' https://api.example.test/v1/widgets"#,
//! )?;
//! let response = send(&options)?;
//! println!("{}", response.status());
//! println!("{}", response.text()?);
//! # Ok(())
//! # }
//! ```
//!
//! Variables expand in value positions only, so a `$TOKEN` can never grow
//! into extra flags:
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! # fn main() -> gocurl::Result<()> {
//! let vars = HashMap::from([("TOKEN".to_string(), "abc".to_string())]);
//! let response = gocurl::send(&gocurl::parse_command_with_vars(
//!     r#"curl -H "Authorization: Bearer $TOKEN" https://api.example.test/me"#,
//!     &vars,
//! )?)?;
//! assert!(response.status().is_success());
//! # Ok(())
//! # }
//! ```

mod client;
mod context;
mod convert;
mod cookies;
mod error;
mod expand;
mod multipart;
mod options;
pub mod printer;
mod proxy;
mod redact;
mod request;
mod response;
mod retry;
mod tls;
mod tokenizer;
mod validate;

use std::collections::HashMap;

pub use reqwest;
pub use url::Url;

pub use crate::context::{CancelHandle, Context};
pub use crate::cookies::CookieJar;
pub use crate::error::{ContextErrorKind, Error, Result};
pub use crate::options::{
    Body, Part, ProxyOptions, RequestOptions, RetryOptions, TlsOptions, TlsVersion,
    DEFAULT_MAX_REDIRECTS, DEFAULT_RETRY_STATUSES,
};
pub use crate::response::Response;
pub use crate::retry::Transport;
pub use crate::tokenizer::{shell_quote, tokenize, tokens_from_args, Token, TokenKind};
pub use crate::validate::{validate, validate_strict};

use crate::expand::{expand_tokens, VarSource};

/// Parse a whole curl command string. No variable expansion.
pub fn parse_command(command: &str) -> Result<RequestOptions> {
    convert::convert(&tokenize(command)?)
}

/// Parse a curl command string, expanding `$NAME` / `${NAME}` in value
/// tokens from the given map. Unknown names are an error.
pub fn parse_command_with_vars(
    command: &str,
    vars: &HashMap<String, String>,
) -> Result<RequestOptions> {
    let tokens = expand_tokens(tokenize(command)?, &VarSource::Map(vars))?;
    convert::convert(&tokens)
}

/// Parse a curl command string, expanding variables from the process
/// environment. Unknown names expand to the empty string.
pub fn parse_command_env(command: &str) -> Result<RequestOptions> {
    let tokens = expand_tokens(tokenize(command)?, &VarSource::Env)?;
    convert::convert(&tokens)
}

/// Parse an already-split argument vector (no shell unquoting, no
/// expansion), e.g. the binary's argv.
pub fn parse_args<I, S>(args: I) -> Result<RequestOptions>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    convert::convert(&tokens_from_args(args))
}

/// A validated request, built and ready to go. Splitting preparation from
/// [`Prepared::send`] lets a front-end inspect or print the wire request
/// first.
pub struct Prepared {
    pub request: reqwest::blocking::Request,
    client: reqwest::blocking::Client,
    jar: CookieJar,
    ctx: Context,
}

/// Validate `options`, build the transport, and assemble the wire request.
pub fn prepare(options: &RequestOptions) -> Result<Prepared> {
    validate(options)?;
    let ctx = options.context.clone().unwrap_or_else(Context::background);
    let built = client::build_client(options, &ctx)?;
    let request = request::build_request(&built.client, options)?;
    Ok(Prepared { request, client: built.client, jar: built.jar, ctx })
}

impl Prepared {
    /// The in-memory jar this request reads from and writes to.
    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Run the retry loop and deliver the response. Consumes the prepared
    /// request; retries replay its buffered body.
    pub fn send(self, options: &RequestOptions) -> Result<Response> {
        let Prepared { request, client, jar, ctx } = self;

        let response = match &options.transport {
            Some(transport) => {
                retry::send_with_retries(transport.as_ref(), request, &options.retry, &ctx)?
            }
            None => retry::send_with_retries(&client, request, &options.retry, &ctx)?,
        };

        if options.fail_on_status && response.status().as_u16() >= 400 {
            return Err(Error::Http(response.status()));
        }

        if let Some(path) = &options.cookie_jar {
            jar.save(path)?;
        }

        Ok(Response::new(
            response,
            options.compression,
            options.max_response_body,
        ))
    }
}

/// Execute a request end to end: validate, build, retry loop, deliver.
pub fn send(options: &RequestOptions) -> Result<Response> {
    prepare(options)?.send(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_and_args_front_ends_agree() {
        let from_string =
            parse_command(r#"curl -X PUT -H "X-K: v" -d 'a=1' https://example.test/p"#).unwrap();
        let from_args = parse_args(vec![
            "-X".to_string(),
            "PUT".to_string(),
            "-H".to_string(),
            "X-K: v".to_string(),
            "-d".to_string(),
            "a=1".to_string(),
            "https://example.test/p".to_string(),
        ])
        .unwrap();

        assert_eq!(from_string.method, from_args.method);
        assert_eq!(from_string.url, from_args.url);
        assert_eq!(from_string.headers, from_args.headers);
        assert_eq!(from_string.body, from_args.body);
    }

    #[test]
    fn parse_command_with_vars_reports_missing() {
        let vars = HashMap::new();
        let err = parse_command_with_vars(
            r#"curl -H "Authorization: Bearer $TOKEN" https://api.example.test/me"#,
            &vars,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownVariable(name) if name == "TOKEN"));
    }

    #[test]
    fn prepared_exposes_the_wire_request() {
        let options = parse_command("curl -d a=1 https://example.test/x").unwrap();
        let prepared = prepare(&options).unwrap();
        assert_eq!(prepared.request.method(), "POST");
        assert_eq!(prepared.request.url().as_str(), "https://example.test/x");
    }
}
