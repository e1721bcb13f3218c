//! SQL dialect strategies.
//!
//! Every piece of database-specific syntax goes through [`Dialect`]:
//! placeholders, quoting, type names, function rendering, paging, insert-id
//! retrieval, schema introspection and DDL. Capability flags tell the
//! command builder, the executor and the migration planner which strategy
//! to use where databases differ in what they can do at all.

mod catalog;
mod postgres;
mod sqlite;
mod sqlserver;

use std::fmt;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::command::{Fragment, Statement, Token};
use crate::entity::{ColumnDescriptor, DefaultValue, IndexDescriptor};
use crate::error::MigrationError;
use crate::migrate::{SchemaChange, TableDescriptor};
use crate::row::Row;
use crate::types::SqlType;
use crate::value::SqlValue;

/// Numbered placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?1`, `?2`, ...
    Question,
    /// `@1`, `@2`, ...
    At,
    /// `$1`, `$2`, ...
    Dollar,
}

impl PlaceholderStyle {
    /// Renders the placeholder for 1-based `index`.
    #[must_use]
    pub fn render(self, index: usize) -> String {
        match self {
            Self::Question => format!("?{index}"),
            Self::At => format!("@{index}"),
            Self::Dollar => format!("${index}"),
        }
    }
}

/// Functions whose syntax differs per database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFunction {
    /// `a LIKE b`
    Like,
    /// `REPLACE(s, from, to)`
    Replace,
    Upper,
    Lower,
    Random,
    /// `COUNT(*)` without arguments, `COUNT(x)` with one.
    Count,
    /// The physical row identity.
    RowId,
    Length,
}

impl SqlFunction {
    /// Accepted argument counts, inclusive.
    #[must_use]
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Self::Like => (2, 2),
            Self::Replace => (3, 3),
            Self::Upper | Self::Lower | Self::Length => (1, 1),
            Self::Random | Self::RowId => (0, 0),
            Self::Count => (0, 1),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Replace => "REPLACE",
            Self::Upper => "UPPER",
            Self::Lower => "LOWER",
            Self::Random => "RANDOM",
            Self::Count => "COUNT",
            Self::RowId => "ROWID",
            Self::Length => "LENGTH",
        }
    }
}

/// How a generated id is read back after an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdRetrieval {
    /// Text appended to the INSERT itself; the command yields the id.
    Suffix(String),
    /// A separate statement run on the same connection right after.
    FollowUp(String),
}

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    // ---- Syntax ----

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Opening and closing identifier quote characters.
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quotes an identifier, doubling any embedded closing quote.
    fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quotes();
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }

    /// Renders a value as an inline literal.
    fn literal(&self, value: &SqlValue) -> String {
        value.to_sql_inline()
    }

    // ---- Types ----

    /// The type name used in DDL for `ty`.
    fn type_name(&self, ty: SqlType) -> String;

    /// The type name used in DDL for `column`; differs from
    /// [`Self::type_name`] where autoincrement is expressed through the type.
    fn column_type(&self, column: &ColumnDescriptor) -> String {
        self.type_name(column.sql_type)
    }

    /// Reduces a type name to a canonical form so synonyms compare equal.
    fn canonical_type(&self, raw: &str) -> String;

    /// Whether a live column's raw type matches the declared column.
    fn types_equivalent(&self, column: &ColumnDescriptor, live: &str) -> bool {
        self.canonical_type(&self.column_type(column)) == self.canonical_type(live)
    }

    /// Reduces a default expression to a canonical form.
    fn canonical_default(&self, raw: &str) -> String {
        canonical_default_text(raw)
    }

    /// Renders a declared default.
    fn default_sql(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Value(value) => self.literal(value),
            DefaultValue::Expression(expr) => expr.clone(),
        }
    }

    // ---- Functions ----

    /// Renders a dialect function over already-compiled arguments.
    fn function(&self, func: SqlFunction, args: Vec<Fragment>) -> Fragment {
        render_function(func.name(), func, args)
    }

    /// Renders `item IN (array)` for dialects binding arrays natively.
    fn in_array(&self, item: Fragment, array: SqlValue) -> Fragment {
        let mut out = item;
        out.push(Token::Text(String::from("= ANY(")));
        out.push(Token::Param(crate::command::Parameter::Constant(array)));
        out.push(Token::Text(String::from(")")));
        out
    }

    // ---- Paging ----

    /// Renders the limit/offset pseudo-field, or `None` if neither is set.
    fn paging(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (None, Some(o)) => Some(format!("OFFSET {o}")),
        }
    }

    /// Whether paging requires an ORDER BY clause.
    fn paging_requires_order(&self) -> bool {
        false
    }

    /// An ordering term with no effect, used when paging requires one.
    fn noop_ordering(&self) -> &'static str {
        "(SELECT NULL)"
    }

    // ---- Inserts ----

    fn insert_id(&self, column: &str) -> IdRetrieval;

    // ---- Introspection ----

    /// A statement returning one row with a non-zero count if `table`
    /// exists as a table or view.
    fn table_exists(&self, table: &str) -> Statement;

    /// A statement returning the rows [`Self::parse_introspection`] reads.
    fn introspect(&self, table: &str) -> Statement;

    /// Builds the live descriptor of `table`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Unparseable`] if the rows do not describe
    /// a schema this dialect understands.
    fn parse_introspection(
        &self,
        table: &str,
        rows: &[Row],
    ) -> Result<Option<TableDescriptor>, MigrationError>;

    // ---- DDL ----

    /// Generates the statements for one schema change.
    fn generate_sql(&self, change: &SchemaChange) -> Vec<String> {
        match change {
            SchemaChange::CreateTable {
                table,
                columns,
                uniques,
            } => vec![self.create_table(table, columns, uniques)],
            SchemaChange::AddColumn { table, column } => vec![self.add_column(table, column)],
            SchemaChange::DropColumn { table, column } => vec![self.drop_column(table, column)],
            SchemaChange::AlterColumn { table, column } => self.alter_column(table, column),
            SchemaChange::AddUnique {
                table,
                name,
                columns,
            } => vec![self.add_unique(table, name, columns)],
            SchemaChange::DropUnique { table, name } => vec![self.drop_unique(table, name)],
            SchemaChange::CreateIndex { table, index } => vec![self.create_index(table, index)],
            SchemaChange::DropIndex { table, name } => vec![self.drop_index(table, name)],
            SchemaChange::CreateView { name, sql } => vec![self.create_view(name, sql)],
            SchemaChange::DropView { name } => vec![self.drop_view(name)],
            SchemaChange::RecreateTable(recreate) => recreate.statements(self),
        }
    }

    /// Generates SQL for a column definition.
    fn column_definition(&self, column: &ColumnDescriptor) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)
        );
        if column.flags.primary_key {
            sql.push_str(" PRIMARY KEY");
            if column.flags.autoincrement {
                let keyword = self.autoincrement_keyword();
                if !keyword.is_empty() {
                    sql.push(' ');
                    sql.push_str(keyword);
                }
            }
        } else if column.flags.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_sql(default));
        }
        sql
    }

    /// Keyword appended after `PRIMARY KEY` for autoincrement columns.
    fn autoincrement_keyword(&self) -> &'static str {
        ""
    }

    /// Generates SQL for CREATE TABLE. Unique groups become named table
    /// constraints.
    fn create_table(&self, table: &str, columns: &[ColumnDescriptor], uniques: &[Vec<String>]) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(c)))
            .collect();
        for group in uniques {
            defs.push(format!(
                "    CONSTRAINT {} UNIQUE ({})",
                self.quote_identifier(&unique_name(table, group)),
                self.quote_list(group)
            ));
        }
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(table),
            defs.join(",\n")
        )
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    /// Renames the staging table of a rebuild over the dropped original.
    /// Views over the original name must keep resolving to it.
    fn rename_rebuilt_table(&self, staging: &str, table: &str) -> Vec<String> {
        vec![self.rename_table(staging, table)]
    }

    /// Generates SQL for ADD COLUMN.
    fn add_column(&self, table: &str, column: &ColumnDescriptor) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// Generates SQL for DROP COLUMN.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL bringing an existing column to `column`'s type,
    /// nullability and default.
    fn alter_column(&self, table: &str, column: &ColumnDescriptor) -> Vec<String>;

    fn add_unique(&self, table: &str, name: &str, columns: &[String]) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            self.quote_identifier(table),
            self.quote_identifier(name),
            self.quote_list(columns)
        )
    }

    fn drop_unique(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        )
    }

    /// Generates SQL for CREATE INDEX.
    fn create_index(&self, table: &str, index: &IndexDescriptor) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            self.quote_list(&index.columns)
        )
    }

    /// Generates SQL for DROP INDEX.
    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    fn create_view(&self, name: &str, sql: &str) -> String {
        format!("CREATE VIEW {} AS {sql}", self.quote_identifier(name))
    }

    fn drop_view(&self, name: &str) -> String {
        format!("DROP VIEW {}", self.quote_identifier(name))
    }

    /// Quotes and comma-joins a column list.
    fn quote_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ---- Capabilities ----

    /// Whether a sequence can be bound as one parameter.
    fn supports_array_parameters(&self) -> bool;

    /// Whether several connections may be used concurrently. When false,
    /// statements are serialized and readers are fully buffered.
    fn supports_multiple_connections(&self) -> bool;

    /// Whether an existing column's type, nullability or default can be
    /// changed in place.
    fn supports_alter_column(&self) -> bool;

    /// Whether a column can be dropped in place.
    fn supports_drop_column(&self) -> bool;

    /// Whether unique constraints can be added to or dropped from an
    /// existing table.
    fn supports_alter_unique(&self) -> bool;

    /// Whether `column` can be added to an existing table in place.
    fn can_add_column(&self, column: &ColumnDescriptor) -> bool {
        let _ = column;
        true
    }
}

/// Deterministic name for a unique constraint.
#[must_use]
pub fn unique_name(table: &str, columns: &[String]) -> String {
    format!("uq_{}_{}", table, columns.join("_"))
}

/// Standard `NAME( a, b )` call rendering; `LIKE` renders infix and a
/// bare `COUNT` renders `COUNT( * )`.
pub(crate) fn render_function(name: &str, func: SqlFunction, args: Vec<Fragment>) -> Fragment {
    let mut out = Vec::new();
    match func {
        SqlFunction::Like => {
            let mut args = args.into_iter();
            out.extend(args.next().unwrap_or_default());
            out.push(Token::Text(String::from("LIKE")));
            out.extend(args.next().unwrap_or_default());
        }
        SqlFunction::RowId => out.push(Token::Text(String::from(name))),
        SqlFunction::Count if args.is_empty() => {
            out.push(Token::Text(format!("{name}(")));
            out.push(Token::Text(String::from("*")));
            out.push(Token::Text(String::from(")")));
        }
        _ => {
            out.push(Token::Text(format!("{name}(")));
            for (i, arg) in args.into_iter().enumerate() {
                if i > 0 {
                    out.push(Token::Separator);
                }
                out.extend(arg);
            }
            out.push(Token::Text(String::from(")")));
        }
    }
    out
}

/// Strips redundant outer parentheses and upper-cases anything that is
/// not a string literal.
pub(crate) fn canonical_default_text(raw: &str) -> String {
    let text = strip_outer_parens(raw);
    if text.starts_with('\'') {
        text.to_string()
    } else {
        text.to_ascii_uppercase()
    }
}

pub(crate) fn strip_outer_parens(raw: &str) -> &str {
    let mut text = raw.trim();
    while text.starts_with('(') && text.ends_with(')') && balanced(&text[1..text.len() - 1]) {
        text = text[1..text.len() - 1].trim();
    }
    text
}

/// True when parentheses in `s` never close more than they open and end
/// balanced.
fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Reads a text column from an introspection row.
pub(crate) fn text_at(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(SqlValue::Text(s)) => Some(s.clone()),
        Some(SqlValue::Int(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an integer column from an introspection row.
pub(crate) fn int_at(row: &Row, column: &str) -> i64 {
    match row.get(column) {
        Some(SqlValue::Int(n)) => *n,
        Some(SqlValue::Text(s)) => s.trim().parse().unwrap_or(0),
        Some(SqlValue::Bool(b)) => i64::from(*b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(PlaceholderStyle::Question.render(3), "?3");
        assert_eq!(PlaceholderStyle::At.render(1), "@1");
        assert_eq!(PlaceholderStyle::Dollar.render(12), "$12");
    }

    #[test]
    fn test_render_function_forms() {
        let arg = |s: &str| vec![Token::Text(String::from(s))];
        let upper = render_function("UPPER", SqlFunction::Upper, vec![arg("x")]);
        assert_eq!(
            upper,
            vec![
                Token::Text(String::from("UPPER(")),
                Token::Text(String::from("x")),
                Token::Text(String::from(")"))
            ]
        );
        let like = render_function("LIKE", SqlFunction::Like, vec![arg("a"), arg("b")]);
        assert_eq!(like[1], Token::Text(String::from("LIKE")));
        let count = render_function("COUNT", SqlFunction::Count, Vec::new());
        assert_eq!(count[1], Token::Text(String::from("*")));
    }

    #[test]
    fn test_canonical_default_strips_parens() {
        let d = SqliteDialect::new();
        assert_eq!(d.canonical_default("((0))"), "0");
        assert_eq!(d.canonical_default("current_timestamp"), "CURRENT_TIMESTAMP");
        assert_eq!(d.canonical_default("'Abc'"), "'Abc'");
        assert_eq!(d.canonical_default("(1) + (2)"), "(1) + (2)");
    }

    #[test]
    fn test_unique_name() {
        assert_eq!(
            unique_name("users", &[String::from("a"), String::from("b")]),
            "uq_users_a_b"
        );
    }
}
