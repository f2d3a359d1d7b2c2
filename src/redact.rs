//! Masking of credential-bearing header values in logs, errors, and
//! verbose output.

/// Header names whose values never leave the process in clear text.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
}

/// The value as printable text, masked when the header is sensitive.
pub fn redact_value<'a>(name: &str, value: &'a str) -> &'a str {
    if is_sensitive_header(name) {
        "***"
    } else {
        value
    }
}

/// Redacted copy of a header list, for Debug output.
pub fn redact_pairs(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), redact_value(name, value).to_string()))
        .collect()
}
