//! Tokenizer for time expressions.
//!
//! Numbers may carry a unit suffix (`f`, `s`, `ms`) written directly after the
//! digits. Identifiers are ASCII `[A-Za-z_][A-Za-z0-9_]*`; ids that need other
//! characters are written as quoted strings.

use crate::ast::Unit;
use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number { value: f64, unit: Option<Unit> },
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Dot,
    Eof,
}

impl TokenKind {
    /// Human rendering used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number { value, unit } => {
                format!("'{}{}'", value, unit.map(Unit::suffix).unwrap_or(""))
            }
            TokenKind::Ident(s) => format!("'{s}'"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Plus => "'+'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::Star => "'*'".into(),
            TokenKind::Slash => "'/'".into(),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
            TokenKind::Comma => "','".into(),
            TokenKind::Dot => "'.'".into(),
            TokenKind::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let single = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b',' => Some(TokenKind::Comma),
            // `.5` is a number; any other dot is property access.
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => Some(TokenKind::Dot),
            _ => None,
        };
        if let Some(kind) = single {
            out.push(Token { kind, offset: start });
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let (kind, next) = lex_number(src, start)?;
            out.push(Token { kind, offset: start });
            i = next;
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push(Token {
                kind: TokenKind::Ident(src[start..i].to_string()),
                offset: start,
            });
        } else if c == b'\'' || c == b'"' {
            let close = src[start + 1..]
                .find(c as char)
                .ok_or_else(|| SyntaxError::new(start, (c as char).to_string(), "unterminated string"))?;
            let end = start + 1 + close;
            out.push(Token {
                kind: TokenKind::Str(src[start + 1..end].to_string()),
                offset: start,
            });
            i = end + 1;
        } else {
            let ch = src[start..].chars().next().unwrap_or('?');
            return Err(SyntaxError::new(
                start,
                format!("'{ch}'"),
                "unexpected character",
            ));
        }
    }

    out.push(Token {
        kind: TokenKind::Eof,
        offset: src.len(),
    });
    Ok(out)
}

fn lex_number(src: &str, start: usize) -> Result<(TokenKind, usize), SyntaxError> {
    let bytes = src.as_bytes();
    let mut i = start;
    let mut seen_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => i += 1,
            // A dot followed by a digit continues the literal; otherwise it is
            // property access on whatever comes next (rejected by the parser).
            b'.' if !seen_dot && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                seen_dot = true;
                i += 1;
            }
            _ => break,
        }
    }
    let text = &src[start..i];
    let value: f64 = text
        .parse()
        .map_err(|_| SyntaxError::new(start, format!("'{text}'"), "malformed number"))?;

    let rest = &src[i..];
    let (unit, len) = if rest.starts_with("ms") {
        (Some(Unit::Millis), 2)
    } else if rest.starts_with('s') {
        (Some(Unit::Seconds), 1)
    } else if rest.starts_with('f') {
        (Some(Unit::Frames), 1)
    } else {
        (None, 0)
    };
    let end = i + len;

    // `5sec`, `10fx`, `3m`: letters glued to a number are never valid.
    if let Some(&b) = bytes.get(end) {
        if b.is_ascii_alphanumeric() || b == b'_' {
            let mut j = end;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            return Err(SyntaxError::new(
                i,
                format!("'{}'", &src[i..j]),
                "unknown unit suffix (expected f, s or ms)",
            ));
        }
    }

    Ok((TokenKind::Number { value, unit }, end))
}
