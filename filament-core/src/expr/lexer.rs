//! Tokenizer for template expressions.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Longest punctuators first so `===` wins over `==`.
const PUNCTUATORS: [&str; 32] = [
    "===", "!==", "...", "==", "!=", "<=", ">=", "&&", "||", "??", "=>", "?.", "(", ")", "[",
    "]", "{", "}", ",", ".", ":", "?", "!", "+", "-", "*", "/", "%", "<", ">", ";", "=",
];

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    'outer: while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                i += 1;
                if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &src[start..i];
            let number = text.parse::<f64>().map_err(|_| ParseError {
                message: format!("invalid number `{text}`"),
                offset: start,
                text: src.to_string(),
            })?;
            tokens.push(Spanned { token: Token::Number(number), offset: start });
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            let start = i;
            i += 1;
            let mut out = String::new();
            let mut chars = src[i..].char_indices();
            loop {
                let Some((pos, ch)) = chars.next() else {
                    return Err(ParseError {
                        message: "unterminated string".into(),
                        offset: start,
                        text: src.to_string(),
                    });
                };
                if ch == c {
                    i += pos + 1;
                    break;
                }
                if ch == '\\' {
                    match chars.next() {
                        Some((_, 'n')) => out.push('\n'),
                        Some((_, 't')) => out.push('\t'),
                        Some((_, 'r')) => out.push('\r'),
                        Some((_, other)) => out.push(other),
                        None => continue,
                    }
                    continue;
                }
                out.push(ch);
            }
            tokens.push(Spanned { token: Token::Str(out), offset: start });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            tokens.push(Spanned {
                token: Token::Ident(src[start..i].to_string()),
                offset: start,
            });
            continue;
        }

        for punct in PUNCTUATORS {
            if src[i..].starts_with(punct) {
                tokens.push(Spanned { token: Token::Punct(punct), offset: i });
                i += punct.len();
                continue 'outer;
            }
        }

        return Err(ParseError {
            message: format!("unexpected character `{c}`"),
            offset: i,
            text: src.to_string(),
        });
    }

    tokens.push(Spanned { token: Token::Eof, offset: src.len() });
    Ok(tokens)
}
