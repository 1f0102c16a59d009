//=====================================================
// File: ast.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraScript module syntax tree definitions
// Objective: Define program, statement and expression nodes with source
//            spans, plus the post-order walk used by source rewriting
//=====================================================

use crate::tokenizer::Position;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Byte range covered by the node.
    pub fn range(&self) -> Range<usize> {
        self.start.offset..self.end.offset
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLit {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal { value: Literal, span: Span },
    Identifier(Ident),
    Member {
        object: Box<Expr>,
        property: Ident,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. } | Expr::Member { span, .. } => *span,
            Expr::Identifier(ident) => ident.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Import {
        binding: Ident,
        source: StringLit,
        span: Span,
    },
    Let {
        name: Ident,
        value: Expr,
        span: Span,
    },
    Export {
        name: Ident,
        value: Expr,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

impl Program {
    pub fn new(statements: Vec<Stmt>, span: Span) -> Self {
        Self { statements, span }
    }

    /// Every node of the tree, children before their parents.
    pub fn walk_post_order(&self) -> Vec<NodeRef<'_>> {
        let mut nodes = Vec::new();
        for stmt in &self.statements {
            match stmt {
                Stmt::Import {
                    binding,
                    source,
                    span,
                } => {
                    nodes.push(NodeRef::Identifier(binding));
                    nodes.push(NodeRef::ImportSource(source));
                    nodes.push(NodeRef::Stmt(stmt, *span));
                }
                Stmt::Let { name, value, span } | Stmt::Export { name, value, span } => {
                    nodes.push(NodeRef::Identifier(name));
                    push_expr(value, &mut nodes);
                    nodes.push(NodeRef::Stmt(stmt, *span));
                }
            }
        }
        nodes.push(NodeRef::Program(self));
        nodes
    }
}

fn push_expr<'a>(expr: &'a Expr, nodes: &mut Vec<NodeRef<'a>>) {
    match expr {
        Expr::Literal { .. } => nodes.push(NodeRef::Expr(expr)),
        Expr::Identifier(ident) => nodes.push(NodeRef::Identifier(ident)),
        Expr::Member {
            object, property, ..
        } => {
            push_expr(object, nodes);
            nodes.push(NodeRef::Identifier(property));
            nodes.push(NodeRef::Expr(expr));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    ImportDecl,
    LetDecl,
    ExportDecl,
    Identifier,
    Literal,
    MemberExpr,
}

/// Borrowed view of one syntax node, produced by [`Program::walk_post_order`].
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Program(&'a Program),
    Stmt(&'a Stmt, Span),
    Expr(&'a Expr),
    Identifier(&'a Ident),
    /// The string naming an imported module; exposed as a string literal.
    ImportSource(&'a StringLit),
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Program(_) => NodeKind::Program,
            NodeRef::Stmt(Stmt::Import { .. }, _) => NodeKind::ImportDecl,
            NodeRef::Stmt(Stmt::Let { .. }, _) => NodeKind::LetDecl,
            NodeRef::Stmt(Stmt::Export { .. }, _) => NodeKind::ExportDecl,
            NodeRef::Expr(Expr::Member { .. }) => NodeKind::MemberExpr,
            NodeRef::Expr(Expr::Identifier(_)) | NodeRef::Identifier(_) => NodeKind::Identifier,
            NodeRef::Expr(Expr::Literal { .. }) | NodeRef::ImportSource(_) => NodeKind::Literal,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            NodeRef::Program(program) => program.span,
            NodeRef::Stmt(_, span) => *span,
            NodeRef::Expr(expr) => expr.span(),
            NodeRef::Identifier(ident) => ident.span,
            NodeRef::ImportSource(lit) => lit.span,
        }
    }

    pub fn literal(&self) -> Option<Literal> {
        match self {
            NodeRef::Expr(Expr::Literal { value, .. }) => Some(value.clone()),
            NodeRef::ImportSource(lit) => Some(Literal::Str(lit.value.clone())),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&'a str> {
        match *self {
            NodeRef::Identifier(ident) => Some(ident.name.as_str()),
            NodeRef::Expr(Expr::Identifier(ident)) => Some(ident.name.as_str()),
            _ => None,
        }
    }
}
