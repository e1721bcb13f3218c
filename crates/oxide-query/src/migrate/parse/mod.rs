//! Parser for the DDL a database stores for its tables, indices and
//! views.
//!
//! Only the parts the migration planner compares are extracted: column
//! names, declared types, nullability, keys, defaults and unique groups.
//! CHECK, COLLATE, REFERENCES and similar clauses are skipped.

mod lexer;

use thiserror::Error;

pub use lexer::{Lexer, Span, Token, TokenKind};

use super::{LiveColumn, LiveUnique};

/// A parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {}..{}", .span.start, .span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// A parsed `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<LiveColumn>,
    pub uniques: Vec<LiveUnique>,
}

/// A parsed `CREATE INDEX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Keywords that end a column's type and start a constraint.
const COLUMN_CONSTRAINTS: &[&str] = &[
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
    "AUTOINCREMENT",
    "IDENTITY",
];

const TABLE_CONSTRAINTS: &[&str] = &["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

/// Parses a `CREATE TABLE` statement.
///
/// # Errors
///
/// Returns [`ParseError`] if the text is not a `CREATE TABLE` statement
/// with a column list.
pub fn parse_create_table(sql: &str) -> Result<TableDefinition, ParseError> {
    Parser::new(sql).create_table()
}

/// Parses a `CREATE [UNIQUE] INDEX` statement.
///
/// # Errors
///
/// Returns [`ParseError`] if the text is not a `CREATE INDEX` statement.
pub fn parse_create_index(sql: &str) -> Result<IndexDefinition, ParseError> {
    Parser::new(sql).create_index()
}

/// Extracts the query of a `CREATE VIEW ... AS <query>` statement.
///
/// # Errors
///
/// Returns [`ParseError`] if the text is not a `CREATE VIEW` statement.
pub fn view_body(sql: &str) -> Result<String, ParseError> {
    Parser::new(sql).view_body()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
        }
    }

    fn peek(&self) -> &Token {
        // tokenize() always ends with Eof and the cursor never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn check_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.check_keyword(k))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::Error(e) => e.clone(),
            TokenKind::Eof => format!("unexpected end of input: expected {expected}"),
            other => format!("unexpected token: expected {expected}, found {other:?}"),
        };
        ParseError::new(message, token.span)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(what))
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.peek().name() {
            Some(name) => {
                let name = name.to_string();
                self.advance();
                Ok(name)
            }
            None => Err(self.error("identifier")),
        }
    }

    /// `name` or `schema.name`; returns the last part.
    fn qualified_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.identifier()?;
        while self.check(&TokenKind::Dot) {
            self.advance();
            name = self.identifier()?;
        }
        Ok(name)
    }

    fn if_not_exists(&mut self) -> Result<(), ParseError> {
        if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
        }
        Ok(())
    }

    /// Skips a balanced parenthesized group, returning its span including
    /// the parentheses.
    fn skip_group(&mut self) -> Result<Span, ParseError> {
        let open = self.peek().span;
        self.expect(&TokenKind::LeftParen, "(")?;
        let mut depth = 1;
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(open.merge(token.span));
                    }
                }
                TokenKind::Eof => return Err(ParseError::new("unbalanced parentheses", token.span)),
                TokenKind::Error(e) => return Err(ParseError::new(e, token.span)),
                _ => {}
            }
        }
    }

    /// Skips tokens up to the `,` or `)` closing the current definition.
    fn skip_to_definition_end(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek().kind {
                TokenKind::Comma | TokenKind::RightParen => return Ok(()),
                TokenKind::LeftParen => {
                    self.skip_group()?;
                }
                TokenKind::Eof => return Err(self.error(")")),
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn slice(&self, span: Span) -> String {
        self.source[span.start..span.end].to_string()
    }

    /// `( name [modifiers], ... )`
    fn column_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&TokenKind::LeftParen, "(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.identifier()?);
            self.skip_to_definition_end()?;
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                self.expect(&TokenKind::RightParen, ")")?;
                return Ok(columns);
            }
        }
    }

    fn create_table(&mut self) -> Result<TableDefinition, ParseError> {
        self.expect_keyword("CREATE")?;
        if !self.eat_keyword("TEMP") {
            self.eat_keyword("TEMPORARY");
        }
        self.expect_keyword("TABLE")?;
        self.if_not_exists()?;
        let name = self.qualified_name()?;
        self.expect(&TokenKind::LeftParen, "(")?;

        let mut table = TableDefinition {
            name,
            columns: Vec::new(),
            uniques: Vec::new(),
        };
        loop {
            if self.check_any(TABLE_CONSTRAINTS) {
                self.table_constraint(&mut table)?;
            } else {
                self.column_definition(&mut table)?;
            }
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                self.expect(&TokenKind::RightParen, ", or )")?;
                break;
            }
        }
        Ok(table)
    }

    fn column_definition(&mut self, table: &mut TableDefinition) -> Result<(), ParseError> {
        let name = self.identifier()?;

        let mut type_span: Option<Span> = None;
        loop {
            if self.check_any(COLUMN_CONSTRAINTS) {
                break;
            }
            let span = match self.peek().kind {
                TokenKind::Comma | TokenKind::RightParen | TokenKind::Eof => break,
                TokenKind::LeftParen => self.skip_group()?,
                _ => self.advance().span,
            };
            type_span = Some(type_span.map_or(span, |s| s.merge(span)));
        }

        let mut column = LiveColumn {
            raw_type: type_span.map(|s| self.slice(s)).unwrap_or_default(),
            name,
            not_null: false,
            primary_key: false,
            autoincrement: false,
            default: None,
        };

        let mut constraint_name = None;
        loop {
            if self.check(&TokenKind::Comma) || self.check(&TokenKind::RightParen) {
                break;
            }
            if self.eat_keyword("CONSTRAINT") {
                constraint_name = Some(self.identifier()?);
                continue;
            }
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                column.primary_key = true;
                column.not_null = true;
                if !self.eat_keyword("ASC") {
                    self.eat_keyword("DESC");
                }
                self.conflict_clause()?;
                if self.eat_keyword("AUTOINCREMENT") {
                    column.autoincrement = true;
                }
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                column.not_null = true;
                self.conflict_clause()?;
            } else if self.eat_keyword("NULL") {
                self.conflict_clause()?;
            } else if self.eat_keyword("UNIQUE") {
                self.conflict_clause()?;
                table.uniques.push(LiveUnique {
                    name: constraint_name.take(),
                    columns: vec![column.name.clone()],
                });
            } else if self.eat_keyword("CHECK") {
                self.skip_group()?;
            } else if self.eat_keyword("DEFAULT") {
                column.default = Some(self.default_expression()?);
            } else if self.eat_keyword("COLLATE") {
                self.identifier()?;
            } else if self.eat_keyword("AUTOINCREMENT") {
                column.autoincrement = true;
            } else if self.eat_keyword("IDENTITY") {
                column.autoincrement = true;
                if self.check(&TokenKind::LeftParen) {
                    self.skip_group()?;
                }
            } else if self.check_any(&["REFERENCES", "GENERATED", "AS"]) {
                self.skip_to_definition_end()?;
            } else {
                return Err(self.error("column constraint"));
            }
        }

        table.columns.push(column);
        Ok(())
    }

    /// `ON CONFLICT <resolution>`, ignored.
    fn conflict_clause(&mut self) -> Result<(), ParseError> {
        if self.eat_keyword("ON") {
            self.expect_keyword("CONFLICT")?;
            self.identifier()?;
        }
        Ok(())
    }

    /// The source text of a DEFAULT value: a parenthesized expression, an
    /// optionally signed literal, or a single word.
    fn default_expression(&mut self) -> Result<String, ParseError> {
        if self.check(&TokenKind::LeftParen) {
            let span = self.skip_group()?;
            return Ok(self.slice(span));
        }
        let first = self.advance();
        let span = match first.kind {
            TokenKind::Symbol('-' | '+') => {
                let value = self.advance();
                if value.kind != TokenKind::Number {
                    return Err(ParseError::new("expected number after sign", value.span));
                }
                first.span.merge(value.span)
            }
            TokenKind::Number | TokenKind::String(_) | TokenKind::Word(_) => first.span,
            TokenKind::Error(e) => return Err(ParseError::new(e, first.span)),
            _ => return Err(ParseError::new("expected default value", first.span)),
        };
        Ok(self.slice(span))
    }

    fn table_constraint(&mut self, table: &mut TableDefinition) -> Result<(), ParseError> {
        let name = if self.eat_keyword("CONSTRAINT") {
            Some(self.identifier()?)
        } else {
            None
        };
        if self.eat_keyword("PRIMARY") {
            self.expect_keyword("KEY")?;
            for key in self.column_list()? {
                if let Some(column) = table
                    .columns
                    .iter_mut()
                    .find(|c| c.name.eq_ignore_ascii_case(&key))
                {
                    column.primary_key = true;
                    column.not_null = true;
                }
            }
            self.conflict_clause()?;
        } else if self.eat_keyword("UNIQUE") {
            let columns = self.column_list()?;
            self.conflict_clause()?;
            table.uniques.push(LiveUnique { name, columns });
        } else if self.eat_keyword("CHECK") || self.eat_keyword("FOREIGN") {
            self.skip_to_definition_end()?;
        } else {
            return Err(self.error("table constraint"));
        }
        Ok(())
    }

    fn create_index(&mut self) -> Result<IndexDefinition, ParseError> {
        self.expect_keyword("CREATE")?;
        let unique = self.eat_keyword("UNIQUE");
        // SQL Server
        if !self.eat_keyword("CLUSTERED") {
            self.eat_keyword("NONCLUSTERED");
        }
        self.expect_keyword("INDEX")?;
        self.eat_keyword("CONCURRENTLY");
        self.if_not_exists()?;
        let name = self.qualified_name()?;
        self.expect_keyword("ON")?;
        self.eat_keyword("ONLY");
        let table = self.qualified_name()?;
        if self.eat_keyword("USING") {
            self.identifier()?;
        }
        let columns = self.column_list()?;
        Ok(IndexDefinition {
            name,
            table,
            columns,
            unique,
        })
    }

    fn view_body(&mut self) -> Result<String, ParseError> {
        self.expect_keyword("CREATE")?;
        if !self.eat_keyword("TEMP") {
            self.eat_keyword("TEMPORARY");
        }
        self.expect_keyword("VIEW")?;
        self.if_not_exists()?;
        self.qualified_name()?;
        if self.check(&TokenKind::LeftParen) {
            self.skip_group()?;
        }
        let as_token = self.peek().span;
        self.expect_keyword("AS")?;
        let body = self.source[as_token.end..]
            .trim()
            .trim_end_matches(';')
            .trim();
        Ok(body.to_string())
    }
}
