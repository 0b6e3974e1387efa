//! Tokenizer for the embedded scripting language.

use crate::errors::PlScriptError;

/// Keywords recognized by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Function,
    Var,
    Let,
    Const,
    Return,
    If,
    Else,
    While,
    Break,
    Continue,
    Throw,
    New,
    True,
    False,
    Null,
    Undefined,
}

/// Byte span of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    Number(f64),
    BigInt(i64),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn scan_error(message: impl Into<String>, line: usize, column: usize) -> PlScriptError {
    PlScriptError::Compile {
        message: message.into(),
        line,
        column,
    }
}

/// Tokenizes script source text.
pub fn tokenize(source: &str) -> Result<Vec<Token>, PlScriptError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut idx = 0usize;
    let mut line = 1usize;
    let mut column = 1usize;

    while idx < source.len() {
        let ch = next_char(source, idx).expect("idx validated by loop condition");

        if ch.is_whitespace() {
            let start = idx;
            idx += ch.len_utf8();
            while idx < source.len() {
                let c = next_char(source, idx).expect("idx validated by loop condition");
                if !c.is_whitespace() {
                    break;
                }
                idx += c.len_utf8();
            }
            advance_position(&source[start..idx], &mut line, &mut column);
            continue;
        }

        if source[idx..].starts_with("//") {
            let start = idx;
            while idx < source.len() && bytes[idx] != b'\n' {
                idx += 1;
            }
            advance_position(&source[start..idx], &mut line, &mut column);
            continue;
        }

        if source[idx..].starts_with("/*") {
            let start = idx;
            let rel = source[idx + 2..]
                .find("*/")
                .ok_or_else(|| scan_error("unterminated block comment", line, column))?;
            idx = idx + 2 + rel + 2;
            advance_position(&source[start..idx], &mut line, &mut column);
            continue;
        }

        let token_line = line;
        let token_col = column;
        let start = idx;

        if is_ident_start(ch) {
            idx += ch.len_utf8();
            while idx < source.len() {
                let c = next_char(source, idx).expect("idx validated by loop condition");
                if !is_ident_part(c) {
                    break;
                }
                idx += c.len_utf8();
            }
            let text = &source[start..idx];
            let kind = match keyword_from_ident(text) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(text.to_string()),
            };
            push_token(&mut tokens, kind, start, idx, token_line, token_col);
            advance_position(&source[start..idx], &mut line, &mut column);
            continue;
        }

        if ch.is_ascii_digit() {
            idx += 1;
            while idx < source.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            let mut is_float = false;
            if idx + 1 < source.len()
                && bytes[idx] == b'.'
                && bytes[idx + 1].is_ascii_digit()
            {
                is_float = true;
                idx += 1;
                while idx < source.len() && bytes[idx].is_ascii_digit() {
                    idx += 1;
                }
            }
            if idx < source.len() && (bytes[idx] == b'e' || bytes[idx] == b'E') {
                let mut probe = idx + 1;
                if probe < source.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
                    probe += 1;
                }
                if probe < source.len() && bytes[probe].is_ascii_digit() {
                    is_float = true;
                    idx = probe;
                    while idx < source.len() && bytes[idx].is_ascii_digit() {
                        idx += 1;
                    }
                }
            }
            let text = &source[start..idx];
            let kind = if !is_float && idx < source.len() && bytes[idx] == b'n' {
                idx += 1;
                let parsed = text.parse::<i64>().map_err(|_| {
                    scan_error(
                        format!("big integer literal out of range: {text}n"),
                        token_line,
                        token_col,
                    )
                })?;
                TokenKind::BigInt(parsed)
            } else {
                let parsed = text.parse::<f64>().map_err(|_| {
                    scan_error(format!("malformed number: {text}"), token_line, token_col)
                })?;
                TokenKind::Number(parsed)
            };
            push_token(&mut tokens, kind, start, idx, token_line, token_col);
            advance_position(&source[start..idx], &mut line, &mut column);
            continue;
        }

        if ch == '\'' || ch == '"' {
            let quote = ch;
            idx += 1;
            let mut text = String::new();
            let mut terminated = false;
            while idx < source.len() {
                let c = next_char(source, idx).expect("idx validated by loop condition");
                idx += c.len_utf8();
                if c == quote {
                    terminated = true;
                    break;
                }
                if c == '\\' {
                    let escaped = next_char(source, idx)
                        .ok_or_else(|| scan_error("unterminated string", token_line, token_col))?;
                    idx += escaped.len_utf8();
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                    continue;
                }
                text.push(c);
            }
            if !terminated {
                return Err(scan_error(
                    "unterminated string literal",
                    token_line,
                    token_col,
                ));
            }
            push_token(
                &mut tokens,
                TokenKind::Str(text),
                start,
                idx,
                token_line,
                token_col,
            );
            advance_position(&source[start..idx], &mut line, &mut column);
            continue;
        }

        let rest = &source[idx..];
        let (kind, len) = if rest.starts_with("===") {
            (TokenKind::EqEqEq, 3)
        } else if rest.starts_with("!==") {
            (TokenKind::NotEqEq, 3)
        } else if rest.starts_with("==") {
            (TokenKind::EqEq, 2)
        } else if rest.starts_with("!=") {
            (TokenKind::NotEq, 2)
        } else if rest.starts_with("<=") {
            (TokenKind::Le, 2)
        } else if rest.starts_with(">=") {
            (TokenKind::Ge, 2)
        } else if rest.starts_with("&&") {
            (TokenKind::AndAnd, 2)
        } else if rest.starts_with("||") {
            (TokenKind::OrOr, 2)
        } else if rest.starts_with("+=") {
            (TokenKind::PlusAssign, 2)
        } else if rest.starts_with("-=") {
            (TokenKind::MinusAssign, 2)
        } else if rest.starts_with("*=") {
            (TokenKind::StarAssign, 2)
        } else if rest.starts_with("/=") {
            (TokenKind::SlashAssign, 2)
        } else {
            let single = match ch {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '.' => TokenKind::Dot,
                ':' => TokenKind::Colon,
                '=' => TokenKind::Assign,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '<' => TokenKind::Lt,
                '>' => TokenKind::Gt,
                '!' => TokenKind::Not,
                other => {
                    return Err(scan_error(
                        format!("unexpected character: {other:?}"),
                        token_line,
                        token_col,
                    ));
                }
            };
            (single, ch.len_utf8())
        };
        idx += len;
        push_token(&mut tokens, kind, start, idx, token_line, token_col);
        advance_position(&source[start..idx], &mut line, &mut column);
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span {
            start: source.len(),
            end: source.len(),
            line,
            column,
        },
    });

    Ok(tokens)
}

fn push_token(
    tokens: &mut Vec<Token>,
    kind: TokenKind,
    start: usize,
    end: usize,
    line: usize,
    column: usize,
) {
    tokens.push(Token {
        kind,
        span: Span {
            start,
            end,
            line,
            column,
        },
    });
}

fn next_char(source: &str, idx: usize) -> Option<char> {
    source.get(idx..)?.chars().next()
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_ascii_alphabetic()
}

fn is_ident_part(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_ascii_alphanumeric()
}

fn advance_position(text: &str, line: &mut usize, column: &mut usize) {
    for ch in text.chars() {
        if ch == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

fn keyword_from_ident(ident: &str) -> Option<Keyword> {
    match ident {
        "function" => Some(Keyword::Function),
        "var" => Some(Keyword::Var),
        "let" => Some(Keyword::Let),
        "const" => Some(Keyword::Const),
        "return" => Some(Keyword::Return),
        "if" => Some(Keyword::If),
        "else" => Some(Keyword::Else),
        "while" => Some(Keyword::While),
        "break" => Some(Keyword::Break),
        "continue" => Some(Keyword::Continue),
        "throw" => Some(Keyword::Throw),
        "new" => Some(Keyword::New),
        "true" => Some(Keyword::True),
        "false" => Some(Keyword::False),
        "null" => Some(Keyword::Null),
        "undefined" => Some(Keyword::Undefined),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_function_declaration() {
        let tokens = tokenize("function add(a, b) { return a + b; }").expect("scan should succeed");
        assert!(matches!(
            tokens[0].kind,
            TokenKind::Keyword(Keyword::Function)
        ));
        assert!(tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::Identifier(name) if name == "add")));
        assert!(matches!(
            tokens.last().expect("token stream is never empty").kind,
            TokenKind::Eof
        ));
    }

    #[test]
    fn tokenizes_bigint_and_float_literals() {
        let tokens = tokenize("42n 4.5 1e3").expect("scan should succeed");
        assert_eq!(tokens[0].kind, TokenKind::BigInt(42));
        assert_eq!(tokens[1].kind, TokenKind::Number(4.5));
        assert_eq!(tokens[2].kind, TokenKind::Number(1000.0));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = tokenize(r#"'a\nb' "c\"d""#).expect("scan should succeed");
        assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".to_string()));
        assert_eq!(tokens[1].kind, TokenKind::Str("c\"d".to_string()));
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = tokenize("x = 'oops").expect_err("scan should fail");
        let PlScriptError::Compile { line, column, .. } = err else {
            panic!("expected compile error");
        };
        assert_eq!(line, 1);
        assert_eq!(column, 5);
    }
}
