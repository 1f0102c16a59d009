//=============================================
// solvra_intercept/parser.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Recursive descent parser for SolvraScript modules
// Objective: Transform token streams into spanned AST nodes consumed by the
//            module compiler and the source rewriter
//=============================================

use crate::ast::{Expr, Ident, Literal, Program, Span, Stmt, StringLit};
use crate::tokenizer::{LexError, Position, Token, TokenKind, Tokenizer};
use thiserror::Error;

//=============================================
//            Section 1: Parse Errors
//=============================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("Unexpected token: expected {expected} but found {found} at line {}, column {}", .position.line, .position.column)]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        position: Position,
    },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(error) => error.position,
            ParseError::UnexpectedToken { position, .. } => *position,
        }
    }
}

/// Tokenize and parse a whole module.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

//=============================================
//            Section 2: Parser State
//=============================================

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.statement()?);
        }
        let start = Position::new(1, 1, 0);
        let end = self.peek().map(|token| token.end).unwrap_or(start);
        Ok(Program::new(statements, Span::new(start, end)))
    }

    //=============================================
    //            Section 3: Statements
    //=============================================

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance()?;
        match keyword.kind {
            TokenKind::Import => {
                let binding = self.identifier()?;
                self.expect(TokenKind::From, "'from'")?;
                let source = self.string_literal()?;
                let end = self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Import {
                    binding,
                    source,
                    span: Span::new(keyword.start, end.end),
                })
            }
            TokenKind::Let | TokenKind::Export => {
                let name = self.identifier()?;
                self.expect(TokenKind::Equal, "'='")?;
                let value = self.expression()?;
                let end = self.expect(TokenKind::Semicolon, "';'")?;
                let span = Span::new(keyword.start, end.end);
                if keyword.kind == TokenKind::Let {
                    Ok(Stmt::Let { name, value, span })
                } else {
                    Ok(Stmt::Export { name, value, span })
                }
            }
            found => Err(ParseError::UnexpectedToken {
                expected: "'import', 'let' or 'export'".to_string(),
                found,
                position: keyword.start,
            }),
        }
    }

    //=============================================
    //            Section 4: Expressions
    //=============================================

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance()?;
        let span = Span::new(token.start, token.end);
        let mut expr = match token.kind {
            TokenKind::String(value) => {
                return Ok(Expr::Literal {
                    value: Literal::Str(value),
                    span,
                });
            }
            TokenKind::Integer(value) => {
                return Ok(Expr::Literal {
                    value: Literal::Int(value),
                    span,
                });
            }
            TokenKind::Boolean(value) => {
                return Ok(Expr::Literal {
                    value: Literal::Bool(value),
                    span,
                });
            }
            TokenKind::Null => {
                return Ok(Expr::Literal {
                    value: Literal::Null,
                    span,
                });
            }
            TokenKind::Identifier(name) => Expr::Identifier(Ident { name, span }),
            found => {
                return Err(ParseError::UnexpectedToken {
                    expected: "expression".to_string(),
                    found,
                    position: token.start,
                });
            }
        };

        while self.check(&TokenKind::Dot) {
            self.advance()?;
            let property = self.identifier()?;
            let span = Span::new(expr.span().start, property.span.end);
            expr = Expr::Member {
                object: Box::new(expr),
                property,
                span,
            };
        }
        Ok(expr)
    }

    fn identifier(&mut self) -> Result<Ident, ParseError> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Identifier(name) => Ok(Ident {
                name,
                span: Span::new(token.start, token.end),
            }),
            found => Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                found,
                position: token.start,
            }),
        }
    }

    fn string_literal(&mut self) -> Result<StringLit, ParseError> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::String(value) => Ok(StringLit {
                value,
                span: Span::new(token.start, token.end),
            }),
            found => Err(ParseError::UnexpectedToken {
                expected: "module path string".to_string(),
                found,
                position: token.start,
            }),
        }
    }

    //=============================================
    //            Section 5: Token Navigation
    //=============================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        match self.peek() {
            Some(token) => &token.kind == kind,
            None => kind == &TokenKind::Eof,
        }
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        match self.tokens.get(self.current) {
            Some(token) if token.kind != TokenKind::Eof => {
                self.current += 1;
                Ok(token.clone())
            }
            Some(token) => Err(ParseError::UnexpectedToken {
                expected: "more input".to_string(),
                found: TokenKind::Eof,
                position: token.start,
            }),
            None => Err(ParseError::UnexpectedToken {
                expected: "more input".to_string(),
                found: TokenKind::Eof,
                position: Position::default(),
            }),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        let token = self.advance()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind,
                position: token.start,
            })
        }
    }
}
