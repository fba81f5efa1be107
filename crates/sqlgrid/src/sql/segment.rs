//! Statement segmentation.
//!
//! The grammar splits text at every top-level `;`. Compound bodies such as
//! trigger or procedure blocks contain inner `;`s, so consecutive statements
//! are regrouped here by counting `BEGIN` openers against `END;` closers.

use super::{SqlGrammar, SqlLexerGrammar, StatementNode, SyntaxTree, TokenKind};
use crate::error::ParseError;

/// One top-level executable statement, possibly a whole compound block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementSpan {
    /// Byte offset of the first character.
    pub from: usize,
    /// Byte offset one past the last character.
    pub to: usize,
    /// Exact source slice `[from, to)`.
    pub text: String,
}

/// SQL text plus the editor's selection start, which is the default cursor
/// for [`resolve_to_nearest_statement`].
#[derive(Debug, Clone, Copy)]
pub struct SqlDocument<'a> {
    text: &'a str,
    selection_start: usize,
}

impl<'a> SqlDocument<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            selection_start: 0,
        }
    }

    pub fn with_cursor(text: &'a str, selection_start: usize) -> Self {
        Self {
            text,
            selection_start,
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn selection_start(&self) -> usize {
        self.selection_start
    }
}

/// Split a document into statement spans using the built-in grammar.
pub fn split_sql_query(doc: &SqlDocument<'_>) -> Result<Vec<StatementSpan>, ParseError> {
    split_with(&SqlLexerGrammar, doc)
}

/// Split a document into statement spans using any grammar.
pub fn split_with<G: SqlGrammar + ?Sized>(
    grammar: &G,
    doc: &SqlDocument<'_>,
) -> Result<Vec<StatementSpan>, ParseError> {
    let tree = grammar.parse(doc.text)?;
    Ok(group_statements(doc.text, &tree))
}

/// Group top-level statements into spans, keeping `BEGIN ... END;` bodies
/// (nested or not) together.
pub fn group_statements(text: &str, tree: &SyntaxTree) -> Vec<StatementSpan> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut group: Option<(usize, usize)> = None;

    for node in &tree.statements {
        depth += open_count(node);

        if depth == 0 {
            spans.push(make_span(text, node.start, node.end));
            continue;
        }

        let from = group.map_or(node.start, |(from, _)| from);
        group = Some((from, node.end));

        if is_block_end(node) {
            depth -= 1;
            if depth == 0 {
                if let Some((from, to)) = group.take() {
                    spans.push(make_span(text, from, to));
                }
            }
        }
    }

    // Unterminated block: everything accumulated becomes one span.
    if let Some((from, to)) = group {
        spans.push(make_span(text, from, to));
    }

    spans
}

/// Number of blocks a statement opens.
fn open_count(node: &StatementNode) -> usize {
    let first_keyword = node.tokens.iter().find_map(|t| t.keyword());
    if matches!(
        first_keyword,
        Some("SELECT") | Some("INSERT") | Some("UPDATE") | Some("DELETE")
    ) {
        return 0;
    }
    node.tokens.iter().filter(|t| t.is_keyword("BEGIN")).count()
}

/// `END ;` closes one block.
fn is_block_end(node: &StatementNode) -> bool {
    match node.tokens.as_slice() {
        [first, second, ..] => first.is_keyword("END") && second.kind == TokenKind::Semicolon,
        _ => false,
    }
}

fn make_span(text: &str, from: usize, to: usize) -> StatementSpan {
    StatementSpan {
        from,
        to,
        text: text.get(from..to).unwrap_or_default().to_string(),
    }
}

/// Pick the statement the cursor belongs to, or the nearest one by line
/// distance when the cursor sits between statements.
///
/// `cursor` defaults to the document's selection start. Returns `None` only
/// when the document holds no statements.
pub fn resolve_to_nearest_statement(
    doc: &SqlDocument<'_>,
    cursor: Option<usize>,
) -> Result<Option<StatementSpan>, ParseError> {
    let spans = split_sql_query(doc)?;
    let cursor = cursor.unwrap_or(doc.selection_start);
    Ok(nearest_span(doc.text, &spans, cursor).cloned())
}

/// Nearest-span lookup over already split spans.
pub fn nearest_span<'s>(
    text: &str,
    spans: &'s [StatementSpan],
    cursor: usize,
) -> Option<&'s StatementSpan> {
    for (i, span) in spans.iter().enumerate() {
        if cursor >= span.from && cursor <= span.to {
            return Some(span);
        }
        if cursor < span.from {
            if i == 0 {
                return Some(span);
            }
            let prev = &spans[i - 1];
            let to_prev = line_distance(text, prev.to, cursor);
            let to_next = line_distance(text, cursor, span.from);
            // Ties go to the following statement.
            return if to_next > to_prev { Some(prev) } else { Some(span) };
        }
    }
    spans.last()
}

fn line_distance(text: &str, from: usize, to: usize) -> usize {
    let bytes = text.as_bytes();
    let to = to.min(bytes.len());
    let from = from.min(to);
    bytes[from..to].iter().filter(|&&b| b == b'\n').count()
}
