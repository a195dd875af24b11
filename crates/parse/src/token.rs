// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The tokenizer
//!
//! Turns query text into a spanned token stream. Numeric literals carry
//! their lane in a suffix (`L` long, `G` big integer, `f` float, `d`
//! double, `g` big decimal); an unsuffixed integer takes the narrowest
//! of int, long and big integer that holds it, and an unsuffixed
//! decimal is a double. Identifiers may be backtick-quoted to include
//! dots or other reserved characters.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use relq_expr::Span;
use relq_types::Value;

use crate::error::{ParseError, ParseResult};

/// One lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifier or keyword (`true`/`false`/`null`/`in` are resolved
    /// by the parser)
    Ident(String),
    /// Backtick-quoted identifier, never a keyword
    QuotedIdent(String),
    /// A fully typed literal value
    Literal(Value),
    /// `?` with an optional explicit ordinal
    Param(Option<u64>),
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    DotDot,
    OrOr,
    AndAnd,
    Pipe,
    Caret,
    Amp,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
}

/// A token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

/// Tokenize a whole query string.
pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        let tok = match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'{' => one(&mut i, Tok::LBrace),
            b'}' => one(&mut i, Tok::RBrace),
            b'(' => one(&mut i, Tok::LParen),
            b')' => one(&mut i, Tok::RParen),
            b',' => one(&mut i, Tok::Comma),
            b':' => one(&mut i, Tok::Colon),
            b'+' => one(&mut i, Tok::Plus),
            b'-' => one(&mut i, Tok::Minus),
            b'*' => one(&mut i, Tok::Star),
            b'/' => one(&mut i, Tok::Slash),
            b'%' => one(&mut i, Tok::Percent),
            b'^' => one(&mut i, Tok::Caret),
            b'~' => one(&mut i, Tok::Tilde),
            b'.' => {
                if bytes.get(i + 1) == Some(&b'.') {
                    i += 2;
                    Tok::DotDot
                } else {
                    i += 1;
                    Tok::Dot
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    i += 2;
                    Tok::OrOr
                } else {
                    i += 1;
                    Tok::Pipe
                }
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    i += 2;
                    Tok::AndAnd
                } else {
                    i += 1;
                    Tok::Amp
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::EqEq
                } else {
                    i += 1;
                    Tok::Assign
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::NotEq
                } else {
                    i += 1;
                    Tok::Bang
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::Le
                } else {
                    i += 1;
                    Tok::Lt
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Tok::Ge
                } else {
                    i += 1;
                    Tok::Gt
                }
            }
            b'?' => {
                i += 1;
                let digits_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i == digits_start {
                    Tok::Param(None)
                } else {
                    let ordinal: u64 =
                        source[digits_start..i].parse().map_err(|_| ParseError::BadLiteral {
                            message: "parameter ordinal too large".into(),
                            span: Span::new(start, i),
                        })?;
                    Tok::Param(Some(ordinal))
                }
            }
            b'"' => lex_string(source, &mut i)?,
            b'\'' => lex_char(source, &mut i)?,
            b'`' => lex_quoted_ident(source, &mut i)?,
            b'0'..=b'9' => lex_number(source, &mut i)?,
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                while i < bytes.len()
                    && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric())
                {
                    i += 1;
                }
                Tok::Ident(source[start..i].to_string())
            }
            other => {
                return Err(ParseError::Syntax {
                    message: format!("unexpected character {:?}", other as char),
                    span: Span::new(start, start + 1),
                });
            }
        };
        tokens.push(Token {
            tok,
            span: Span::new(start, i),
        });
    }
    Ok(tokens)
}

fn one(i: &mut usize, tok: Tok) -> Tok {
    *i += 1;
    tok
}

fn lex_string(source: &str, i: &mut usize) -> ParseResult<Tok> {
    let start = *i;
    let bytes = source.as_bytes();
    *i += 1; // opening quote
    let mut out = String::new();
    while *i < bytes.len() {
        match bytes[*i] {
            b'"' => {
                *i += 1;
                return Ok(Tok::Literal(Value::Text(out)));
            }
            b'\\' => {
                *i += 1;
                let escaped = bytes.get(*i).copied().ok_or_else(|| unterminated(start, *i))?;
                out.push(unescape(escaped).ok_or_else(|| ParseError::BadLiteral {
                    message: format!("unknown escape \\{}", escaped as char),
                    span: Span::new(*i - 1, *i + 1),
                })?);
                *i += 1;
            }
            _ => {
                let c = source[*i..].chars().next().expect("in bounds");
                out.push(c);
                *i += c.len_utf8();
            }
        }
    }
    Err(unterminated(start, *i))
}

fn lex_char(source: &str, i: &mut usize) -> ParseResult<Tok> {
    let start = *i;
    let bytes = source.as_bytes();
    *i += 1;
    let c = match bytes.get(*i) {
        Some(b'\\') => {
            *i += 1;
            let escaped = bytes.get(*i).copied().ok_or_else(|| unterminated(start, *i))?;
            *i += 1;
            unescape(escaped).ok_or_else(|| ParseError::BadLiteral {
                message: format!("unknown escape \\{}", escaped as char),
                span: Span::new(start, *i),
            })?
        }
        Some(_) => {
            let c = source[*i..].chars().next().expect("in bounds");
            *i += c.len_utf8();
            c
        }
        None => return Err(unterminated(start, *i)),
    };
    if source.as_bytes().get(*i) != Some(&b'\'') {
        return Err(ParseError::BadLiteral {
            message: "character literal must hold exactly one character".into(),
            span: Span::new(start, *i),
        });
    }
    *i += 1;
    Ok(Tok::Literal(Value::Char(c)))
}

fn unescape(b: u8) -> Option<char> {
    Some(match b {
        b'"' => '"',
        b'\'' => '\'',
        b'\\' => '\\',
        b'n' => '\n',
        b'r' => '\r',
        b't' => '\t',
        b'0' => '\0',
        _ => return None,
    })
}

fn lex_quoted_ident(source: &str, i: &mut usize) -> ParseResult<Tok> {
    let start = *i;
    let bytes = source.as_bytes();
    *i += 1;
    let mut out = String::new();
    while *i < bytes.len() {
        if bytes[*i] == b'`' {
            // Doubled backtick escapes itself.
            if bytes.get(*i + 1) == Some(&b'`') {
                out.push('`');
                *i += 2;
                continue;
            }
            *i += 1;
            return Ok(Tok::QuotedIdent(out));
        }
        let c = source[*i..].chars().next().expect("in bounds");
        out.push(c);
        *i += c.len_utf8();
    }
    Err(unterminated(start, *i))
}

fn lex_number(source: &str, i: &mut usize) -> ParseResult<Tok> {
    let start = *i;
    let bytes = source.as_bytes();
    let mut has_dot = false;
    let mut has_exp = false;
    while *i < bytes.len() {
        match bytes[*i] {
            b'0'..=b'9' | b'_' => *i += 1,
            // A dot starts a fraction only when a digit follows; `1..3`
            // keeps its range token.
            b'.' if !has_dot
                && !has_exp
                && bytes.get(*i + 1).is_some_and(u8::is_ascii_digit) =>
            {
                has_dot = true;
                *i += 1;
            }
            b'e' | b'E' if !has_exp => {
                let next = bytes.get(*i + 1).copied();
                let after_sign = bytes.get(*i + 2).copied();
                let exp_digits = matches!(next, Some(d) if d.is_ascii_digit())
                    || (matches!(next, Some(b'+') | Some(b'-'))
                        && matches!(after_sign, Some(d) if d.is_ascii_digit()));
                if !exp_digits {
                    break;
                }
                has_exp = true;
                *i += if matches!(next, Some(b'+') | Some(b'-')) { 2 } else { 1 };
            }
            _ => break,
        }
    }
    let digits: String = source[start..*i].chars().filter(|&c| c != '_').collect();
    let suffix = match bytes.get(*i).copied() {
        Some(s @ (b'L' | b'G' | b'f' | b'd' | b'g')) => {
            *i += 1;
            Some(s)
        }
        _ => None,
    };
    let span = Span::new(start, *i);
    let bad = |message: String| ParseError::BadLiteral { message, span };

    let value = if has_dot || has_exp || matches!(suffix, Some(b'f' | b'd' | b'g')) {
        match suffix {
            Some(b'f') => Value::Float(
                f32::from_str(&digits).map_err(|e| bad(e.to_string()))?,
            ),
            Some(b'g') => Value::BigDecimal(
                BigDecimal::from_str(&digits).map_err(|e| bad(e.to_string()))?,
            ),
            _ => Value::Double(f64::from_str(&digits).map_err(|e| bad(e.to_string()))?),
        }
    } else {
        match suffix {
            Some(b'L') => Value::Long(i64::from_str(&digits).map_err(|e| bad(e.to_string()))?),
            Some(b'G') => Value::BigInteger(
                BigInt::from_str(&digits).map_err(|e| bad(e.to_string()))?,
            ),
            _ => {
                // Narrowest of int, long, big integer.
                if let Ok(v) = i32::from_str(&digits) {
                    Value::Int(v)
                } else if let Ok(v) = i64::from_str(&digits) {
                    Value::Long(v)
                } else {
                    Value::BigInteger(
                        BigInt::from_str(&digits).map_err(|e| bad(e.to_string()))?,
                    )
                }
            }
        }
    };
    Ok(Tok::Literal(value))
}

fn unterminated(start: usize, end: usize) -> ParseError {
    ParseError::Syntax {
        message: "unterminated literal".into(),
        span: Span::new(start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            toks("a && b || !c"),
            vec![
                Tok::Ident("a".into()),
                Tok::AndAnd,
                Tok::Ident("b".into()),
                Tok::OrOr,
                Tok::Bang,
                Tok::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn test_number_lanes() {
        assert_eq!(toks("5"), vec![Tok::Literal(Value::Int(5))]);
        assert_eq!(toks("5L"), vec![Tok::Literal(Value::Long(5))]);
        assert_eq!(toks("99999999999"), vec![Tok::Literal(Value::Long(99_999_999_999))]);
        assert_eq!(
            toks("123456789012345678901234567890"),
            vec![Tok::Literal(Value::BigInteger(
                BigInt::from_str("123456789012345678901234567890").unwrap()
            ))]
        );
        assert_eq!(toks("1.5"), vec![Tok::Literal(Value::Double(1.5))]);
        assert_eq!(toks("1.5f"), vec![Tok::Literal(Value::Float(1.5))]);
        assert_eq!(
            toks("1.5g"),
            vec![Tok::Literal(Value::BigDecimal(
                BigDecimal::from_str("1.5").unwrap()
            ))]
        );
        assert_eq!(toks("2e3"), vec![Tok::Literal(Value::Double(2000.0))]);
    }

    #[test]
    fn test_range_vs_fraction() {
        assert_eq!(
            toks("1..3"),
            vec![
                Tok::Literal(Value::Int(1)),
                Tok::DotDot,
                Tok::Literal(Value::Int(3)),
            ]
        );
        assert_eq!(
            toks("-1..1"),
            vec![
                Tok::Minus,
                Tok::Literal(Value::Int(1)),
                Tok::DotDot,
                Tok::Literal(Value::Int(1)),
            ]
        );
    }

    #[test]
    fn test_strings_and_chars() {
        assert_eq!(
            toks(r#""he\"llo""#),
            vec![Tok::Literal(Value::Text("he\"llo".into()))]
        );
        assert_eq!(toks("'x'"), vec![Tok::Literal(Value::Char('x'))]);
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn test_quoted_ident() {
        assert_eq!(
            toks("`addr.city`"),
            vec![Tok::QuotedIdent("addr.city".into())]
        );
        assert_eq!(toks("`a``b`"), vec![Tok::QuotedIdent("a`b".into())]);
    }

    #[test]
    fn test_params() {
        assert_eq!(toks("? ?7"), vec![Tok::Param(None), Tok::Param(Some(7))]);
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("ab == ?1").unwrap();
        assert_eq!((tokens[0].span.start, tokens[0].span.end), (0, 2));
        assert_eq!((tokens[1].span.start, tokens[1].span.end), (3, 5));
        assert_eq!((tokens[2].span.start, tokens[2].span.end), (6, 8));
    }
}
