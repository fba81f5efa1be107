//! Grammar backed by `tree-sitter-sequel`.

use tree_sitter::{Language, Node, Parser};

use super::{SqlGrammar, StatementNode, SyntaxTree, Token, TokenKind};
use crate::error::ParseError;

/// Parses with the tree-sitter SQL grammar. Any error or missing node in the
/// concrete syntax tree is reported as a [`ParseError`].
///
/// `tree-sitter-sequel` has no rule for `CREATE TRIGGER ... BEGIN ... END;`,
/// so documents holding trigger bodies fail to parse here. Use
/// [`SqlLexerGrammar`](super::SqlLexerGrammar) for those.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterGrammar;

impl SqlGrammar for TreeSitterGrammar {
    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError> {
        let language: Language = tree_sitter_sequel::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ParseError::new(0, e.to_string()))?;
        let tree = parser
            .parse(text, None)
            .ok_or_else(|| ParseError::new(0, "parser returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            let node = first_error(root).unwrap_or(root);
            return Err(ParseError::new(
                node.start_byte(),
                format!("syntax error near `{}`", snippet(text, node)),
            ));
        }

        let mut out = SyntaxTree::default();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() == ";" {
                // Attach the terminator to the statement it ends.
                if let Some(last) = out.statements.last_mut() {
                    let open = last
                        .tokens
                        .last()
                        .is_some_and(|t| t.kind != TokenKind::Semicolon);
                    if open {
                        last.tokens.push(Token {
                            kind: TokenKind::Semicolon,
                            start: child.start_byte(),
                            end: child.end_byte(),
                        });
                        last.end = child.end_byte();
                    }
                }
                continue;
            }
            if is_comment(child) {
                continue;
            }

            let mut flat = Flattener::default();
            flat.visit(child, text);
            flat.close_group();
            out.statements.push(StatementNode {
                start: child.start_byte(),
                end: child.end_byte(),
                tokens: flat.tokens,
            });
        }

        Ok(out)
    }
}

fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "marginalia")
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

fn snippet(text: &str, node: Node<'_>) -> String {
    let end = node.end_byte().min(node.start_byte() + 20);
    text.get(node.start_byte()..end).unwrap_or_default().to_string()
}

/// Collects the leaves of a statement, collapsing parenthesized runs.
#[derive(Default)]
struct Flattener {
    tokens: Vec<Token>,
    group: Option<(usize, usize, usize)>,
}

impl Flattener {
    fn visit(&mut self, node: Node<'_>, text: &str) {
        if is_comment(node) {
            return;
        }
        if node.child_count() > 0 {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                self.visit(child, text);
            }
            return;
        }

        let (start, end) = (node.start_byte(), node.end_byte());
        let mut closed = false;
        match (node.kind(), self.group.as_mut()) {
            ("(", Some((_, depth, group_end))) => {
                *depth += 1;
                *group_end = end;
            }
            ("(", None) => self.group = Some((start, 1, end)),
            (")", Some((_, depth, group_end))) => {
                *depth -= 1;
                *group_end = end;
                closed = *depth == 0;
            }
            (_, Some((_, _, group_end))) => *group_end = end,
            (kind, None) => {
                let kind = if kind.starts_with("keyword_") {
                    TokenKind::Keyword(text[start..end].to_uppercase())
                } else if kind == ";" {
                    TokenKind::Semicolon
                } else if kind == "identifier" {
                    TokenKind::Identifier
                } else if node.is_named() {
                    TokenKind::Literal
                } else {
                    TokenKind::Operator
                };
                self.tokens.push(Token { kind, start, end });
            }
        }
        if closed {
            self.close_group();
        }
    }

    fn close_group(&mut self) {
        if let Some((start, _, end)) = self.group.take() {
            self.tokens.push(Token {
                kind: TokenKind::Group,
                start,
                end,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{split_with, SqlDocument};

    #[test]
    fn test_statements_and_keywords() {
        let tree = TreeSitterGrammar
            .parse("SELECT a FROM t; INSERT INTO t (a) VALUES (1);")
            .unwrap();
        assert_eq!(tree.statements.len(), 2);
        assert!(tree.statements[0].tokens[0].is_keyword("SELECT"));
        assert_eq!(
            tree.statements[0].tokens.last().map(|t| t.kind.clone()),
            Some(TokenKind::Semicolon)
        );
    }

    #[test]
    fn test_split_with_tree_sitter() {
        let doc = SqlDocument::new("SELECT 1; SELECT 2");
        let spans = split_with(&TreeSitterGrammar, &doc).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "SELECT 1;");
    }

    #[test]
    fn test_syntax_error() {
        assert!(TreeSitterGrammar.parse("SELEC FROM WHERE (").is_err());
    }

    #[test]
    fn test_trigger_bodies_are_not_parsed() {
        let script = "CREATE TRIGGER log_insert AFTER INSERT ON t\n\
                      BEGIN\n    INSERT INTO audit VALUES (NEW.id);\nEND;\nSELECT 1;";
        let err = split_with(&TreeSitterGrammar, &SqlDocument::new(script)).unwrap_err();
        assert_eq!(err.offset, 0);

        // The lexer grammar keeps the body together.
        let spans = crate::sql::split_sql_query(&SqlDocument::new(script)).unwrap();
        assert_eq!(spans.len(), 2);

        let doc = SqlDocument::new("INSERT INTO audit VALUES (1); SELECT * FROM audit;");
        let spans = split_with(&TreeSitterGrammar, &doc).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].text, "SELECT * FROM audit;");
    }
}
