//! Hand-written SQL tokenizer that builds the shallow statement tree.

use super::{SqlGrammar, StatementNode, SyntaxTree, Token, TokenKind};
use crate::error::ParseError;

/// Words treated as keywords. Sorted for binary search.
const KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DECLARE",
    "DEFAULT", "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP",
    "EACH", "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FOR",
    "FOREIGN", "FROM", "FULL", "FUNCTION", "GENERATED", "GLOB", "GRANT", "GROUP", "HAVING", "IF",
    "IGNORE", "IMMEDIATE", "IN", "INDEX", "INITIALLY", "INNER", "INSERT", "INSTEAD",
    "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY", "LANGUAGE", "LEFT", "LIKE", "LIMIT",
    "MATCH", "NATURAL", "NO", "NOT", "NOTNULL", "NULL", "OF", "OFFSET", "ON", "OR", "ORDER",
    "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRIMARY", "PROCEDURE", "QUERY", "RAISE",
    "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT",
    "RETURNING", "RETURNS", "REVOKE", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SCHEMA",
    "SELECT", "SET", "SHOW", "TABLE", "TEMP", "TEMPORARY", "THEN", "TO", "TRANSACTION",
    "TRIGGER", "TRUNCATE", "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW",
    "VIRTUAL", "WHEN", "WHERE", "WINDOW", "WITH", "WITHOUT",
];

fn is_keyword(upper: &str) -> bool {
    KEYWORDS.binary_search(&upper).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Word,
    QuotedIdentifier,
    Literal,
    LParen,
    RParen,
    Semicolon,
    Operator,
}

#[derive(Debug, Clone, Copy)]
struct RawToken {
    kind: RawKind,
    start: usize,
    end: usize,
}

/// Byte-oriented scanner. Comments and whitespace are skipped.
struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        self.src.get(offset..).and_then(|s| s.chars().next())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            let rest = &self.src[self.pos..];
            if let Some(c) = rest.chars().next().filter(|c| c.is_whitespace()) {
                self.pos += c.len_utf8();
            } else if rest.starts_with("--") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if rest.starts_with("/*") {
                match rest[2..].find("*/") {
                    Some(idx) => self.pos += idx + 4,
                    None => return Err(ParseError::new(self.pos, "unterminated block comment")),
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Consume a quoted run closed by `close`, where a doubled `close`
    /// is an escaped literal character.
    fn quoted(&mut self, start: usize, close: char, what: &str) -> Result<(), ParseError> {
        self.bump();
        loop {
            match self.bump() {
                Some(c) if c == close => {
                    if self.peek_char() == Some(close) {
                        self.bump();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(ParseError::new(start, format!("unterminated {}", what))),
            }
        }
    }

    /// `$tag$ ... $tag$` body. Returns `false` when the `$` does not open one.
    fn dollar_quoted(&mut self, start: usize) -> Result<bool, ParseError> {
        let rest = &self.src[start + 1..];
        let tag_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let tag = &rest[..tag_len];
        if !rest[tag_len..].starts_with('$') || tag.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(false);
        }

        let delimiter = format!("${}$", tag);
        let body_start = start + delimiter.len();
        match self.src[body_start..].find(&delimiter) {
            Some(idx) => {
                self.pos = body_start + idx + delimiter.len();
                Ok(true)
            }
            None => Err(ParseError::new(start, "unterminated dollar-quoted string")),
        }
    }

    fn consume_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn next_token(&mut self) -> Result<Option<RawToken>, ParseError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };

        let kind = match c {
            ';' => {
                self.bump();
                RawKind::Semicolon
            }
            '(' => {
                self.bump();
                RawKind::LParen
            }
            ')' => {
                self.bump();
                RawKind::RParen
            }
            '\'' => {
                self.quoted(start, '\'', "string literal")?;
                RawKind::Literal
            }
            '"' => {
                self.quoted(start, '"', "quoted identifier")?;
                RawKind::QuotedIdentifier
            }
            '`' => {
                self.quoted(start, '`', "quoted identifier")?;
                RawKind::QuotedIdentifier
            }
            '[' => {
                self.bump();
                match self.src[self.pos..].find(']') {
                    Some(idx) => self.pos += idx + 1,
                    None => return Err(ParseError::new(start, "unterminated quoted identifier")),
                }
                RawKind::QuotedIdentifier
            }
            '$' => {
                if self.dollar_quoted(start)? {
                    RawKind::Literal
                } else {
                    // Positional or named parameter ($1, $name).
                    self.bump();
                    self.consume_while(|c| c.is_alphanumeric() || c == '_');
                    RawKind::Literal
                }
            }
            '?' => {
                self.bump();
                self.consume_while(|c| c.is_ascii_digit());
                RawKind::Literal
            }
            ':' | '@' if self.char_at(start + 1).is_some_and(|n| n.is_alphabetic() || n == '_') => {
                self.bump();
                self.consume_while(|c| c.is_alphanumeric() || c == '_');
                RawKind::Literal
            }
            c if c.is_ascii_digit()
                || (c == '.' && self.char_at(start + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                self.consume_while(|c| c.is_ascii_alphanumeric() || c == '.');
                // Signed exponent, e.g. 1e-5.
                if self.src[start..self.pos].ends_with(['e', 'E'])
                    && matches!(self.peek_char(), Some('+') | Some('-'))
                {
                    self.bump();
                    self.consume_while(|c| c.is_ascii_digit());
                }
                RawKind::Literal
            }
            c if c.is_alphabetic() || c == '_' => {
                self.consume_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
                RawKind::Word
            }
            _ => {
                self.bump();
                RawKind::Operator
            }
        };

        Ok(Some(RawToken {
            kind,
            start,
            end: self.pos,
        }))
    }
}

/// Open parenthesized group: start offset, nesting depth, last consumed end.
struct OpenGroup {
    start: usize,
    depth: usize,
    end: usize,
}

/// Default grammar: tokenizes with the built-in lexer and splits statements
/// at every `;`. Parenthesized sub-expressions collapse into `Group` children.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlLexerGrammar;

impl SqlGrammar for SqlLexerGrammar {
    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError> {
        let mut lexer = Lexer::new(text);
        let mut tree = SyntaxTree::default();
        let mut current: Vec<Token> = Vec::new();
        let mut group: Option<OpenGroup> = None;

        while let Some(raw) = lexer.next_token()? {
            match raw.kind {
                RawKind::Semicolon => {
                    close_group(&mut group, &mut current);
                    current.push(Token {
                        kind: TokenKind::Semicolon,
                        start: raw.start,
                        end: raw.end,
                    });
                    finish_statement(&mut current, &mut tree);
                }
                RawKind::LParen => match group.as_mut() {
                    Some(g) => {
                        g.depth += 1;
                        g.end = raw.end;
                    }
                    None => {
                        group = Some(OpenGroup {
                            start: raw.start,
                            depth: 1,
                            end: raw.end,
                        })
                    }
                },
                RawKind::RParen => match group.as_mut() {
                    Some(g) => {
                        g.depth -= 1;
                        g.end = raw.end;
                        if g.depth == 0 {
                            close_group(&mut group, &mut current);
                        }
                    }
                    None => current.push(Token {
                        kind: TokenKind::Operator,
                        start: raw.start,
                        end: raw.end,
                    }),
                },
                _ => match group.as_mut() {
                    Some(g) => g.end = raw.end,
                    None => current.push(classify(text, raw)),
                },
            }
        }

        close_group(&mut group, &mut current);
        finish_statement(&mut current, &mut tree);
        Ok(tree)
    }
}

fn classify(text: &str, raw: RawToken) -> Token {
    let kind = match raw.kind {
        RawKind::Word => {
            let upper = text[raw.start..raw.end].to_uppercase();
            if is_keyword(&upper) {
                TokenKind::Keyword(upper)
            } else {
                TokenKind::Identifier
            }
        }
        RawKind::QuotedIdentifier => TokenKind::Identifier,
        RawKind::Literal => TokenKind::Literal,
        RawKind::Semicolon => TokenKind::Semicolon,
        RawKind::LParen | RawKind::RParen | RawKind::Operator => TokenKind::Operator,
    };
    Token {
        kind,
        start: raw.start,
        end: raw.end,
    }
}

fn close_group(group: &mut Option<OpenGroup>, current: &mut Vec<Token>) {
    if let Some(g) = group.take() {
        current.push(Token {
            kind: TokenKind::Group,
            start: g.start,
            end: g.end,
        });
    }
}

fn finish_statement(current: &mut Vec<Token>, tree: &mut SyntaxTree) {
    let tokens = std::mem::take(current);
    // A bare `;` separates statements but is not one.
    let is_empty = tokens.iter().all(|t| t.kind == TokenKind::Semicolon);
    if is_empty {
        return;
    }
    let start = tokens[0].start;
    let end = tokens[tokens.len() - 1].end;
    tree.statements.push(StatementNode { start, end, tokens });
}
