//! Wire-request assembly from a validated options record.
//!
//! Header application order: defaults, then the user's header list (order
//! and repeats preserved), then the credential shorthands (`-u`,
//! `--oauth2-bearer`), which override a manually spelled `Authorization`.

use base64::Engine as _;
use reqwest::blocking::{Client, Request};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, COOKIE,
    REFERER, USER_AGENT,
};
use url::Url;

use crate::client::effective_url;
use crate::error::{Error, Result};
use crate::multipart;
use crate::options::{Body, RequestOptions};

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn default_user_agent() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}

/// Merge the ordered query pairs into the URL, after whatever the URL
/// already carries.
fn url_with_query(mut url: Url, query: &[(String, String)]) -> Url {
    if !query.is_empty() {
        // Building pairs unconditionally would append a stray `?`.
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    url
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| Error::validation("header", format!("bad header name {name:?}: {err}")))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|err| {
        Error::validation("header", format!("bad value for {name}: {err}"))
    })
}

pub(crate) fn build_request(client: &Client, options: &RequestOptions) -> Result<Request> {
    let url = url_with_query(effective_url(options)?, &options.query);
    let method = options.effective_method();
    log::debug!("{method} {url}");

    let mut builder = client.request(method, url);

    // Body and its implied Content-Type. The user's own header, applied
    // below, replaces the implied one.
    let mut implied_content_type = None;
    builder = match &options.body {
        Body::None => builder,
        Body::Raw(bytes) => {
            implied_content_type = Some(HeaderValue::from_static(FORM_CONTENT_TYPE));
            builder.body(bytes.clone())
        }
        Body::Form(fields) => {
            implied_content_type = Some(HeaderValue::from_static(FORM_CONTENT_TYPE));
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            builder.body(encoded.into_bytes())
        }
        Body::Multipart(parts) => {
            let assembled = multipart::assemble(parts)?;
            implied_content_type = Some(header_value("content-type", &assembled.content_type)?);
            builder.body(assembled.bytes)
        }
    };

    let mut request = builder.build()?;
    let headers = request.headers_mut();
    apply_headers(headers, options, implied_content_type)?;
    Ok(request)
}

fn apply_headers(
    headers: &mut HeaderMap,
    options: &RequestOptions,
    implied_content_type: Option<HeaderValue>,
) -> Result<()> {
    if let Some(content_type) = implied_content_type {
        headers.insert(CONTENT_TYPE, content_type);
    }

    // The agent header is always present, like curl's.
    let user_agent = options.user_agent.as_deref().unwrap_or(default_user_agent());
    headers.insert(USER_AGENT, header_value("user-agent", user_agent)?);

    if let Some(referer) = &options.referer {
        headers.insert(REFERER, header_value("referer", referer)?);
    }

    for (name, value) in &options.headers {
        let name = header_name(name)?;
        let value = header_value(name.as_str(), value)?;
        // append keeps repeated -H entries in the order given; a user
        // User-Agent/Content-Type replaces the default instead.
        if name == USER_AGENT || name == CONTENT_TYPE || name == REFERER {
            headers.insert(name, value);
        } else {
            headers.append(name, value);
        }
    }

    // Credential shorthands override a manual Authorization header.
    if let Some((user, password)) = &options.basic_auth {
        let credentials = format!("{user}:{}", password.as_deref().unwrap_or(""));
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Basic {encoded}"))?,
        );
    }
    if let Some(token) = &options.bearer {
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Bearer {token}"))?,
        );
    }

    if !options.cookies.is_empty() {
        let value = options.cookies.join("; ");
        headers.insert(COOKIE, header_value("cookie", &value)?);
    }

    if options.compression && !headers.contains_key(ACCEPT_ENCODING) {
        let value = if options.compression_methods.is_empty() {
            HeaderValue::from_static("gzip, deflate, br")
        } else {
            header_value("accept-encoding", &options.compression_methods.join(", "))?
        };
        headers.insert(ACCEPT_ENCODING, value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Part;

    fn build(options: &RequestOptions) -> Request {
        let client = Client::new();
        build_request(&client, options).unwrap()
    }

    fn options_for(url: &str) -> RequestOptions {
        RequestOptions::new(url.parse().unwrap())
    }

    #[test]
    fn default_user_agent_always_present() {
        let request = build(&options_for("https://example.test/ping"));
        let agent = request.headers()[USER_AGENT].to_str().unwrap();
        assert_eq!(agent, concat!("gocurl/", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn explicit_user_agent_wins() {
        let mut options = options_for("https://example.test");
        options.user_agent = Some("custom/2".into());
        let request = build(&options);
        assert_eq!(request.headers()[USER_AGENT], "custom/2");

        let mut options = options_for("https://example.test");
        options.header("User-Agent", "via-header/3");
        let request = build(&options);
        assert_eq!(request.headers()[USER_AGENT], "via-header/3");
    }

    #[test]
    fn query_pairs_merge_in_order() {
        let mut options = options_for("https://example.test/search?q=base");
        options.query.push(("a".into(), "1".into()));
        options.query.push(("b".into(), "x y".into()));
        let request = build(&options);
        assert_eq!(request.url().query(), Some("q=base&a=1&b=x+y"));
    }

    #[test]
    fn raw_body_defaults_to_form_content_type() {
        let mut options = options_for("https://example.test");
        options.body = Body::Raw(b"a=1".to_vec());
        let request = build(&options);
        assert_eq!(request.headers()[CONTENT_TYPE], FORM_CONTENT_TYPE);
        assert_eq!(request.body().unwrap().as_bytes().unwrap(), b"a=1");
    }

    #[test]
    fn explicit_content_type_is_not_overridden() {
        let mut options = options_for("https://example.test");
        options.body = Body::Raw(br#"{"a":1}"#.to_vec());
        options.header("Content-Type", "application/json");
        let request = build(&options);
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn form_body_urlencodes_pairs() {
        let mut options = options_for("https://example.test");
        options.body = Body::Form(vec![
            ("name".into(), "ali baba".into()),
            ("k&v".into(), "=".into()),
        ]);
        let request = build(&options);
        assert_eq!(
            request.body().unwrap().as_bytes().unwrap(),
            b"name=ali+baba&k%26v=%3D"
        );
    }

    #[test]
    fn multipart_body_sets_boundary_header() {
        let mut options = options_for("https://example.test");
        options.body = Body::Multipart(vec![Part::Text { name: "a".into(), value: "1".into() }]);
        let request = build(&options);
        let content_type = request.headers()[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let boundary = content_type.split('=').next_back().unwrap();
        let body = request.body().unwrap().as_bytes().unwrap();
        let text = std::str::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn repeated_headers_append_in_order() {
        let mut options = options_for("https://example.test");
        options.header("X-Tag", "one");
        options.header("X-Tag", "two");
        let request = build(&options);
        let values: Vec<_> = request.headers().get_all("X-Tag").iter().collect();
        assert_eq!(values, ["one", "two"]);
    }

    #[test]
    fn basic_auth_overrides_manual_authorization() {
        let mut options = options_for("https://example.test");
        options.header("Authorization", "Bearer stale");
        options.basic_auth = Some(("user".into(), Some("pass".into())));
        let request = build(&options);
        assert_eq!(request.headers()[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn bearer_token_sets_authorization() {
        let mut options = options_for("https://example.test");
        options.bearer = Some("tok123".into());
        let request = build(&options);
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok123");
    }

    #[test]
    fn inline_cookies_join() {
        let mut options = options_for("https://example.test");
        options.cookies.push("a=1".into());
        options.cookies.push("b=2".into());
        let request = build(&options);
        assert_eq!(request.headers()[COOKIE], "a=1; b=2");
    }

    #[test]
    fn compression_advertises_unless_user_did() {
        let mut options = options_for("https://example.test");
        options.compression = true;
        let request = build(&options);
        assert_eq!(request.headers()[ACCEPT_ENCODING], "gzip, deflate, br");

        let mut options = options_for("https://example.test");
        options.compression = true;
        options.header("Accept-Encoding", "gzip");
        let request = build(&options);
        assert_eq!(request.headers()[ACCEPT_ENCODING], "gzip");
    }
}
