//! Shell-compatible lexing of a curl command line.
//!
//! The lexer produces the argv a POSIX shell would produce for the same
//! string, then classifies each word as a flag or a value. Which flags take
//! arguments is none of its business; that knowledge lives in the converter.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Flag,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn classify(text: String) -> Token {
        // A lone "-" conventionally means stdin; it is not a flag.
        let kind = if text.len() > 1 && text.starts_with('-') {
            TokenKind::Flag
        } else {
            TokenKind::Value
        };
        Token { kind, text }
    }

    pub fn value(text: impl Into<String>) -> Token {
        Token { kind: TokenKind::Value, text: text.into() }
    }

    pub fn is_flag(&self) -> bool {
        self.kind == TokenKind::Flag
    }
}

/// Lex a whole command string, possibly spanning multiple lines joined with
/// backslash continuations. A leading `curl` word is consumed silently.
pub fn tokenize(command: &str) -> Result<Vec<Token>> {
    let words = split_words(command)?;
    if words.is_empty() {
        return Err(Error::Syntax { pos: 0, message: "empty command".into() });
    }
    let mut words = words.into_iter();
    let mut tokens = Vec::new();
    match words.next() {
        Some(first) if first == "curl" => {}
        Some(first) => tokens.push(Token::classify(first)),
        None => unreachable!(),
    }
    tokens.extend(words.map(Token::classify));
    if tokens.is_empty() {
        return Err(Error::Syntax { pos: 0, message: "empty command".into() });
    }
    Ok(tokens)
}

/// Classify a pre-split argument vector. No unquoting happens here; the
/// caller's shell already did it.
pub fn tokens_from_args<I, S>(args: I) -> Vec<Token>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter().map(|arg| Token::classify(arg.into())).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    None,
    Single,
    Double,
}

fn split_words(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    // Distinguishes "" (an empty word) from no word at all.
    let mut started = false;
    let mut state = QuoteState::None;
    let mut quote_pos = 0;

    let mut chars = input.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        match state {
            QuoteState::Single => {
                if ch == '\'' {
                    state = QuoteState::None;
                } else {
                    current.push(ch);
                }
            }
            QuoteState::Double => match ch {
                '"' => state = QuoteState::None,
                '\\' => match chars.peek() {
                    // Inside double quotes only `"` and `\` are escapable;
                    // any other backslash is literal.
                    Some(&(_, next @ ('"' | '\\'))) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                _ => current.push(ch),
            },
            QuoteState::None => match ch {
                '\'' => {
                    state = QuoteState::Single;
                    quote_pos = pos;
                    started = true;
                }
                '"' => {
                    state = QuoteState::Double;
                    quote_pos = pos;
                    started = true;
                }
                '\\' => match chars.next() {
                    // Backslash-newline is a line continuation.
                    Some((_, '\n')) => {}
                    Some((_, '\r')) => {
                        if let Some(&(_, '\n')) = chars.peek() {
                            chars.next();
                        }
                    }
                    Some((_, next)) => {
                        current.push(next);
                        started = true;
                    }
                    None => {
                        return Err(Error::Syntax {
                            pos,
                            message: "trailing backslash".into(),
                        });
                    }
                },
                c if c.is_whitespace() => {
                    if started {
                        words.push(std::mem::take(&mut current));
                        started = false;
                    }
                }
                _ => {
                    current.push(ch);
                    started = true;
                }
            },
        }
    }

    match state {
        QuoteState::None => {
            if started {
                words.push(current);
            }
            Ok(words)
        }
        QuoteState::Single => Err(Error::Syntax {
            pos: quote_pos,
            message: "unterminated single quote".into(),
        }),
        QuoteState::Double => Err(Error::Syntax {
            pos: quote_pos,
            message: "unterminated double quote".into(),
        }),
    }
}

/// Quote a word so that re-lexing it yields the same word. Used by tests for
/// the round-trip property and by diagnostics that echo commands back.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            // Close, escape the quote, reopen.
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn splits_on_whitespace() {
        let tokens = tokenize("curl -X POST https://example.test").unwrap();
        assert_eq!(texts(&tokens), ["-X", "POST", "https://example.test"]);
        assert_eq!(tokens[0].kind, TokenKind::Flag);
        assert_eq!(tokens[1].kind, TokenKind::Value);
        assert_eq!(tokens[2].kind, TokenKind::Value);
    }

    #[test]
    fn leading_curl_is_optional() {
        let with = tokenize("curl https://example.test").unwrap();
        let without = tokenize("https://example.test").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn single_quotes_are_literal() {
        let tokens = tokenize(r#"curl -d '{"a": "b c"}' https://example.test"#).unwrap();
        assert_eq!(tokens[1].text, r#"{"a": "b c"}"#);
    }

    #[test]
    fn double_quotes_allow_escapes() {
        let tokens = tokenize(r#"curl -d "say \"hi\" \\ back\slash""#).unwrap();
        assert_eq!(tokens[1].text, r#"say "hi" \ back\slash"#);
    }

    #[test]
    fn backslash_escapes_outside_quotes() {
        let tokens = tokenize(r"curl -d a\ b").unwrap();
        assert_eq!(texts(&tokens), ["-d", "a b"]);
    }

    #[test]
    fn line_continuations() {
        let tokens = tokenize("curl \\\n  -H 'X-A: 1' \\\r\n  https://example.test").unwrap();
        assert_eq!(texts(&tokens), ["-H", "X-A: 1", "https://example.test"]);
    }

    #[test]
    fn adjacent_quoted_parts_join() {
        let tokens = tokenize(r#"curl -d 'a'"b"c"#).unwrap();
        assert_eq!(tokens[1].text, "abc");
    }

    #[test]
    fn empty_quoted_word_survives() {
        let tokens = tokenize("curl -d '' https://example.test").unwrap();
        assert_eq!(texts(&tokens), ["-d", "", "https://example.test"]);
    }

    #[test]
    fn empty_command_is_a_syntax_error() {
        assert!(matches!(tokenize(""), Err(Error::Syntax { .. })));
        assert!(matches!(tokenize("   \n "), Err(Error::Syntax { .. })));
        // "curl" alone leaves no tokens either.
        assert!(matches!(tokenize("curl"), Err(Error::Syntax { .. })));
    }

    #[test]
    fn unterminated_quote_reports_position() {
        match tokenize("curl -d 'oops") {
            Err(Error::Syntax { pos, .. }) => assert_eq!(pos, 8),
            other => panic!("expected syntax error, got {other:?}"),
        }
        match tokenize(r#"curl "half"#) {
            Err(Error::Syntax { pos, .. }) => assert_eq!(pos, 5),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn lone_dash_is_a_value() {
        let tokens = tokenize("curl -o - https://example.test").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Value);
    }

    #[test]
    fn quoting_round_trip() {
        let inputs = [
            "curl -X POST -H 'X-Key: a b' -d '{\"a\":1}' https://example.test",
            r"curl -d a\ b\'c https://example.test",
            "curl -d '' https://example.test",
        ];
        for input in inputs {
            let tokens = tokenize(input).unwrap();
            let requoted: Vec<String> = std::iter::once("curl".to_string())
                .chain(tokens.iter().map(|t| shell_quote(&t.text)))
                .collect();
            let relexed = tokenize(&requoted.join(" ")).unwrap();
            assert_eq!(tokens, relexed, "round trip failed for {input:?}");
        }
    }
}
