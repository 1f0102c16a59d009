//=====================================================
// File: rewrite.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Node-level source rewriting for SolvraScript modules
// Objective: Visit every syntax node once, let callers replace the text of
//            any node, and hand back the rewritten module source
//=====================================================

use crate::ast::{Literal, NodeKind, Span};
use crate::parser::{ParseError, parse_source};
use std::ops::Range;
use thiserror::Error;

//=====================================================
// Section 1.0 - Errors & Transformer Trait
//=====================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("source could not be parsed for rewriting: {0}")]
    InvalidInput(ParseError),
    #[error("rewritten source is not valid: {0}")]
    InvalidOutput(ParseError),
}

/// Turns the source text of one module into its replacement text.
pub trait Transformer: Send + Sync {
    fn transform(&self, source: &str) -> Result<String, TransformError>;
}

impl<T: Transformer + ?Sized> Transformer for std::sync::Arc<T> {
    fn transform(&self, source: &str) -> Result<String, TransformError> {
        (**self).transform(source)
    }
}

//=====================================================
// Section 2.0 - Syntax Node View
//=====================================================

/// Mutable view of a node handed to rewrite visitors.
pub struct SyntaxNode<'a> {
    kind: NodeKind,
    span: Span,
    literal: Option<Literal>,
    name: Option<&'a str>,
    chunks: &'a mut [String],
}

impl<'a> SyntaxNode<'a> {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Value of a literal node as it appeared in the original source.
    pub fn literal(&self) -> Option<&Literal> {
        self.literal.as_ref()
    }

    pub fn is_string_literal(&self, value: &str) -> bool {
        matches!(&self.literal, Some(Literal::Str(s)) if s == value)
    }

    pub fn name(&self) -> Option<&str> {
        self.name
    }

    /// Current text of the node, including updates already made to its children.
    pub fn source(&self) -> String {
        self.chunks[self.clamped_range()].concat()
    }

    /// Replace the text of the whole node.
    pub fn update(&mut self, text: impl Into<String>) {
        let range = self.clamped_range();
        if range.is_empty() {
            return;
        }
        let text = text.into();
        self.chunks[range.start] = text;
        for chunk in &mut self.chunks[range.start + 1..range.end] {
            chunk.clear();
        }
    }

    fn clamped_range(&self) -> Range<usize> {
        let len = self.chunks.len();
        let range = self.span.range();
        range.start.min(len)..range.end.min(len)
    }
}

//=====================================================
// Section 3.0 - Rewrite Engine
//=====================================================

/// Parse `source`, call `visit` on every node children-first and return the
/// edited text. Output that no longer parses is rejected.
pub fn rewrite<F>(source: &str, mut visit: F) -> Result<String, TransformError>
where
    F: FnMut(&mut SyntaxNode<'_>),
{
    let program = parse_source(source).map_err(TransformError::InvalidInput)?;

    // One chunk per byte offset; continuation bytes of a char stay empty.
    let mut chunks = vec![String::new(); source.len()];
    for (offset, ch) in source.char_indices() {
        chunks[offset].push(ch);
    }

    for node in program.walk_post_order() {
        let mut view = SyntaxNode {
            kind: node.kind(),
            span: node.span(),
            literal: node.literal(),
            name: node.name(),
            chunks: &mut chunks,
        };
        visit(&mut view);
    }

    let output = chunks.concat();
    if output != source {
        parse_source(&output).map_err(TransformError::InvalidOutput)?;
    }
    Ok(output)
}

/// Quote `value` as a SolvraScript string literal.
pub fn quote_str(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

//=====================================================
// Section 4.0 - Stock Transformers
//=====================================================

/// Transformer backed by a node visitor closure.
pub struct NodeRewriter<F> {
    visit: F,
}

impl<F> NodeRewriter<F>
where
    F: Fn(&mut SyntaxNode<'_>) + Send + Sync,
{
    pub fn new(visit: F) -> Self {
        Self { visit }
    }
}

impl<F> Transformer for NodeRewriter<F>
where
    F: Fn(&mut SyntaxNode<'_>) + Send + Sync,
{
    fn transform(&self, source: &str) -> Result<String, TransformError> {
        rewrite(source, |node| (self.visit)(node))
    }
}

/// Replaces every literal equal to `target` with raw `replacement` source text.
#[derive(Debug, Clone)]
pub struct LiteralReplacer {
    target: Literal,
    replacement: String,
}

impl LiteralReplacer {
    pub fn new(target: Literal, replacement: impl Into<String>) -> Self {
        Self {
            target,
            replacement: replacement.into(),
        }
    }

    /// Swap one string literal for another, quoting the replacement.
    pub fn strings(from: &str, to: &str) -> Self {
        Self::new(Literal::Str(from.to_string()), quote_str(to))
    }
}

impl Transformer for LiteralReplacer {
    fn transform(&self, source: &str) -> Result<String, TransformError> {
        rewrite(source, |node| {
            if node.literal() == Some(&self.target) {
                node.update(self.replacement.clone());
            }
        })
    }
}
