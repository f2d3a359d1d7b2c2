//! `$VAR` / `${VAR}` substitution over value tokens.
//!
//! Flag tokens are never rewritten, so a variable's contents cannot turn
//! into new flags. With an explicit map, a miss is an error; with the
//! process environment, a miss expands to the empty string, the same way a
//! shell would.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tokenizer::Token;

/// Where variable values come from.
pub enum VarSource<'a> {
    /// Caller-supplied map; unknown names are an error.
    Map(&'a HashMap<String, String>),
    /// Process environment; unknown names expand to "".
    Env,
}

impl VarSource<'_> {
    fn lookup(&self, name: &str) -> Result<String> {
        match self {
            VarSource::Map(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownVariable(name.to_string())),
            VarSource::Env => Ok(std::env::var(name).unwrap_or_default()),
        }
    }
}

/// Expand every value token in place. Flag tokens pass through untouched.
pub fn expand_tokens(tokens: Vec<Token>, source: &VarSource) -> Result<Vec<Token>> {
    tokens
        .into_iter()
        .map(|token| {
            if token.is_flag() || !token.text.contains('$') {
                Ok(token)
            } else {
                Ok(Token { text: expand_str(&token.text, source)?, ..token })
            }
        })
        .collect()
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn expand_str(text: &str, source: &VarSource) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'$') => {
                out.push('$');
                chars.next();
            }
            '$' => match chars.peek() {
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) if is_name_char(c) => name.push(c),
                            // An unterminated or malformed ${...} is left
                            // alone; we only promise NAME syntax.
                            other => {
                                out.push_str("${");
                                out.push_str(&name);
                                if let Some(c) = other {
                                    out.push(c);
                                }
                                name.clear();
                                break;
                            }
                        }
                    }
                    if !name.is_empty() {
                        out.push_str(&source.lookup(&name)?);
                    }
                }
                Some(&c) if is_name_start(c) => {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if is_name_char(c) {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str(&source.lookup(&name)?);
                }
                _ => out.push('$'),
            },
            _ => out.push(ch),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{tokenize, TokenKind};

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn expands_bare_and_braced_names() {
        let vars = map(&[("TOKEN", "abc"), ("HOST", "example.test")]);
        let source = VarSource::Map(&vars);
        assert_eq!(expand_str("Bearer $TOKEN", &source).unwrap(), "Bearer abc");
        assert_eq!(
            expand_str("https://${HOST}/v1", &source).unwrap(),
            "https://example.test/v1"
        );
        assert_eq!(expand_str("${TOKEN}s", &source).unwrap(), "abcs");
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let vars = map(&[("A", "x")]);
        let source = VarSource::Map(&vars);
        assert_eq!(expand_str(r"costs \$5", &source).unwrap(), "costs $5");
    }

    #[test]
    fn dollar_without_name_is_literal() {
        let vars = map(&[]);
        let source = VarSource::Map(&vars);
        assert_eq!(expand_str("100$ $$", &source).unwrap(), "100$ $$");
    }

    #[test]
    fn unknown_name_in_map_is_an_error() {
        let vars = map(&[]);
        let source = VarSource::Map(&vars);
        match expand_str("Bearer $TOKEN", &source) {
            Err(Error::UnknownVariable(name)) => assert_eq!(name, "TOKEN"),
            other => panic!("expected UnknownVariable, got {other:?}"),
        }
    }

    #[test]
    fn unknown_name_in_env_expands_empty() {
        let source = VarSource::Env;
        assert_eq!(
            expand_str("x${GOCURL_TEST_SURELY_UNSET_VAR}y", &source).unwrap(),
            "xy"
        );
    }

    #[test]
    fn flag_tokens_are_never_expanded() {
        let vars = map(&[("FLAG", "-v")]);
        let tokens = tokenize("curl -H '$FLAG: 1' https://example.test").unwrap();
        let expanded = expand_tokens(tokens, &VarSource::Map(&vars)).unwrap();
        // The header *value* expands, the "-H" flag itself never does.
        assert_eq!(expanded[0].kind, TokenKind::Flag);
        assert_eq!(expanded[0].text, "-H");
        assert_eq!(expanded[1].text, "-v: 1");
    }
}
