use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::interpreter::errors::ScriptError;
use crate::op::{create_op, Op, OPERATORS};

/// All token kinds in the expression language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    Int(i64),
    Str(String),
    Ident(String),
    Op(Op),
    SquareL,
    SquareR,
    ParenL,
    ParenR,
    Semicolon,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "{}", n),
            TokenKind::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        _ => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            TokenKind::Ident(s) => f.write_str(s),
            TokenKind::Op(op) => f.write_str(op.as_str()),
            TokenKind::SquareL => f.write_str("["),
            TokenKind::SquareR => f.write_str("]"),
            TokenKind::ParenL => f.write_str("("),
            TokenKind::ParenR => f.write_str(")"),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Eof => Ok(()),
        }
    }
}

/// A token with its kind and byte offset into the source it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, pos: usize) -> Self {
        Self { kind, pos }
    }
}

/// Tokenizer for the expression language. The token sequence is owned by the
/// instance so additional source can be appended to it, which is how the REPL
/// extends a line without re-lexing what came before.
#[derive(Default)]
pub struct Tokenizer {
    tokens: Vec<Token>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize `source` in one shot.
    pub fn scan(source: &str) -> Result<Vec<Token>, ScriptError> {
        let mut tokenizer = Tokenizer::new();
        tokenizer.tokenize(source)?;
        Ok(tokenizer.into_tokens())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Append the tokens of `source` to the owned sequence. A trailing Eof
    /// from a previous call is removed first so the sequence stays contiguous.
    pub fn tokenize(&mut self, source: &str) -> Result<(), ScriptError> {
        if matches!(self.tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            self.tokens.pop();
        }

        let bytes = source.as_bytes();
        let len = bytes.len();
        let mut pos = 0usize;

        while pos < len {
            let start = pos;
            let c = bytes[pos];

            if c.is_ascii_whitespace() {
                while pos < len && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                continue;
            }

            if let Some(kind) = punctuation(c) {
                self.tokens.push(Token::new(kind, start));
                pos += 1;
                continue;
            }

            if let Some(op_text) = match_longest_operator(source, pos) {
                pos += op_text.len();
                match create_op(op_text) {
                    Some(op) => self.tokens.push(Token::new(TokenKind::Op(op), start)),
                    None => {
                        return Err(ScriptError::syntax(
                            format!("unknown operator '{}'", op_text),
                            start,
                        ))
                    }
                }
                continue;
            }

            if c.is_ascii_alphabetic() || c == b'_' {
                pos += 1;
                while pos < len && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                let ident = source[start..pos].to_string();
                self.tokens.push(Token::new(TokenKind::Ident(ident), start));
                continue;
            }

            if c.is_ascii_digit() {
                pos = self.handle_number(source, start)?;
                continue;
            }

            if c == b'"' {
                pos = self.handle_string(source, start)?;
                continue;
            }

            return Err(ScriptError::syntax(
                format!("unknown character '{}'", source[start..].chars().next().unwrap_or('?')),
                start,
            ));
        }

        debug!(count = self.tokens.len(), "tokenized source");
        self.tokens.push(Token::new(TokenKind::Eof, len));
        Ok(())
    }

    /// Integer literal: decimal, or hex/octal/binary with a `0x`/`0o`/`0b`
    /// prefix. Returns the position just past the literal.
    fn handle_number(&mut self, source: &str, start: usize) -> Result<usize, ScriptError> {
        let bytes = source.as_bytes();
        let len = bytes.len();

        let mut radix = 10u32;
        let mut pos = start;
        if bytes[start] == b'0' && start + 1 < len {
            match bytes[start + 1] {
                b'x' | b'X' => {
                    radix = 16;
                    pos = start + 2;
                }
                b'o' | b'O' => {
                    radix = 8;
                    pos = start + 2;
                }
                b'b' | b'B' => {
                    radix = 2;
                    pos = start + 2;
                }
                _ => {}
            }
        }

        let digits_start = pos;
        while pos < len && (bytes[pos] as char).is_digit(16) {
            if !(bytes[pos] as char).is_digit(radix) {
                return Err(ScriptError::syntax("invalid digit in integer literal", pos));
            }
            pos += 1;
        }
        if pos == digits_start {
            return Err(ScriptError::syntax("invalid integer literal", start));
        }

        let value = i64::from_str_radix(&source[digits_start..pos], radix)
            .map_err(|_| ScriptError::syntax("integer literal is too large", start))?;
        self.tokens.push(Token::new(TokenKind::Int(value), start));
        Ok(pos)
    }

    /// String literal: double quoted, single line, with backslash escapes.
    fn handle_string(&mut self, source: &str, start: usize) -> Result<usize, ScriptError> {
        let bytes = source.as_bytes();
        let len = bytes.len();
        let mut pos = start + 1;
        let mut value = String::new();

        while pos < len {
            match bytes[pos] {
                b'"' => {
                    self.tokens.push(Token::new(TokenKind::Str(value), start));
                    return Ok(pos + 1);
                }
                b'\n' => {
                    return Err(ScriptError::syntax(
                        "string literal may not span lines",
                        pos,
                    ));
                }
                b'\\' if pos + 1 < len => {
                    let escaped = bytes[pos + 1];
                    value.push(match escaped {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'\\' => '\\',
                        b'"' => '"',
                        other => other as char,
                    });
                    pos += 2;
                }
                _ => {
                    let c = source[pos..].chars().next().unwrap_or('?');
                    value.push(c);
                    pos += c.len_utf8();
                }
            }
        }

        Err(ScriptError::syntax("unterminated string literal", pos))
    }
}

fn punctuation(c: u8) -> Option<TokenKind> {
    match c {
        b'[' => Some(TokenKind::SquareL),
        b']' => Some(TokenKind::SquareR),
        b'(' => Some(TokenKind::ParenL),
        b')' => Some(TokenKind::ParenR),
        b';' => Some(TokenKind::Semicolon),
        _ => None,
    }
}

fn match_longest_operator(input: &str, pos: usize) -> Option<&'static str> {
    OPERATORS
        .iter()
        .copied()
        .find(|op| input[pos..].starts_with(op))
}

/// Render a token sequence back to source text, space separated.
pub fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if token.kind == TokenKind::Eof {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&token.kind.to_string());
    }
    out
}
