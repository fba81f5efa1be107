//! SQL text handling: a grammar abstraction producing a shallow syntax tree,
//! statement segmentation on top of it, and literal/identifier quoting.

mod lexer;
mod quote;
mod segment;
#[cfg(feature = "tree-sitter")]
mod tree_sitter;

pub use lexer::SqlLexerGrammar;
pub use quote::{escape_sql_value, quote_identifier};
pub use segment::{
    group_statements, nearest_span, resolve_to_nearest_statement, split_sql_query, split_with,
    SqlDocument, StatementSpan,
};
#[cfg(feature = "tree-sitter")]
pub use tree_sitter::TreeSitterGrammar;

use crate::error::ParseError;

/// Kind of an immediate child of a statement node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A reserved word, normalized to upper case.
    Keyword(String),
    Identifier,
    Literal,
    /// A parenthesized sub-expression, collapsed into one child.
    Group,
    Operator,
    Semicolon,
}

/// A child token of a statement, as a byte range into the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if k == keyword)
    }

    pub fn keyword(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Keyword(k) => Some(k.as_str()),
            _ => None,
        }
    }
}

/// One top-level statement: its source range and immediate children.
/// Comments and whitespace are not children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementNode {
    pub start: usize,
    pub end: usize,
    pub tokens: Vec<Token>,
}

/// Top-level statements in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxTree {
    pub statements: Vec<StatementNode>,
}

/// Anything that can turn SQL text into top-level statement nodes.
pub trait SqlGrammar {
    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError>;
}
