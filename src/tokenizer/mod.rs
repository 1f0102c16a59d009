//=====================================================
// File: tokenizer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Lexer for SolvraScript module source
// Objective: Turn module text into tokens carrying line, column and byte
//            offsets so rewrites can address exact source ranges
//=====================================================

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Represents the position of a token in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    /// Byte offset into the source text.
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    String(String),
    Boolean(bool),
    Null,

    Identifier(String),

    // Keywords
    Import,
    From,
    Let,
    Export,

    // Punctuation
    Equal,
    Dot,
    Semicolon,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Null => f.write_str("null"),
            TokenKind::Identifier(s) => f.write_str(s),
            TokenKind::Import => f.write_str("import"),
            TokenKind::From => f.write_str("from"),
            TokenKind::Let => f.write_str("let"),
            TokenKind::Export => f.write_str("export"),
            TokenKind::Equal => f.write_str("="),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with its kind and the source range it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Position,
    pub end: Position,
}

impl Token {
    pub fn new(kind: TokenKind, start: Position, end: Position) -> Self {
        Self { kind, start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {}, column {}", .position.line, .position.column)]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    let mut keywords = HashMap::new();
    keywords.insert("import", TokenKind::Import);
    keywords.insert("from", TokenKind::From);
    keywords.insert("let", TokenKind::Let);
    keywords.insert("export", TokenKind::Export);
    keywords.insert("true", TokenKind::Boolean(true));
    keywords.insert("false", TokenKind::Boolean(false));
    keywords.insert("null", TokenKind::Null);
    keywords
});

pub struct Tokenizer {
    input: Vec<(usize, char)>,
    len: usize,
    current: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.char_indices().collect(),
            len: input.len(),
            current: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.position();
            let Some(ch) = self.advance() else {
                tokens.push(Token::new(TokenKind::Eof, start, start));
                return Ok(tokens);
            };
            let kind = match ch {
                '=' => TokenKind::Equal,
                '.' => TokenKind::Dot,
                ';' => TokenKind::Semicolon,
                '"' => self.read_string(start)?,
                c if c.is_ascii_digit() || (c == '-' && self.peek().is_some_and(|n| n.is_ascii_digit())) => {
                    self.read_integer(c, start)?
                }
                c if c.is_alphabetic() || c == '_' => self.read_word(c),
                other => {
                    return Err(LexError {
                        message: format!("Unexpected character '{}'", other),
                        position: start,
                    });
                }
            };
            tokens.push(Token::new(kind, start, self.position()));
        }
    }

    fn position(&self) -> Position {
        let offset = self
            .input
            .get(self.current)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.len);
        Position::new(self.line, self.column, offset)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.current).map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.current + 1).map(|(_, ch)| *ch)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.current += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '/' && self.peek_next() == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, start: Position) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(TokenKind::String(value)),
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(other) => {
                            return Err(LexError {
                                message: format!("Unknown escape sequence '\\{}'", other),
                                position: start,
                            });
                        }
                        None => break,
                    };
                    value.push(escaped);
                }
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        Err(LexError {
            message: "Unterminated string literal".to_string(),
            position: start,
        })
    }

    fn read_integer(&mut self, first: char, start: Position) -> Result<TokenKind, LexError> {
        let mut digits = String::from(first);
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            digits.push(c);
            self.advance();
        }
        digits
            .parse::<i64>()
            .map(TokenKind::Integer)
            .map_err(|_| LexError {
                message: format!("Integer literal '{}' out of range", digits),
                position: start,
            })
    }

    fn read_word(&mut self, first: char) -> TokenKind {
        let mut word = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            word.push(c);
            self.advance();
        }
        KEYWORDS
            .get(word.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(word))
    }
}
