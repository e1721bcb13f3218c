//! SQLite dialect.

use std::sync::LazyLock;

use regex::Regex;

use super::{Dialect, IdRetrieval, PlaceholderStyle, text_at};
use crate::command::Statement;
use crate::entity::ColumnDescriptor;
use crate::error::MigrationError;
use crate::migrate::parse::{parse_create_index, parse_create_table, view_body};
use crate::migrate::{LiveIndex, ObjectKind, TableDescriptor};
use crate::row::Row;
use crate::types::SqlType;
use crate::value::SqlValue;

/// SQLite: `"` quoting, `?N` placeholders, type affinity, and an ALTER
/// TABLE that can only rename tables and add columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

static LENGTH_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(.*\)\s*$").expect("valid length suffix regex"));

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            other => other.to_sql_inline(),
        }
    }

    fn type_name(&self, ty: SqlType) -> String {
        // SQLite has dynamic typing with type affinity
        match ty {
            SqlType::Boolean | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                "INTEGER".to_string()
            }
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Text | SqlType::VarChar(_) | SqlType::Date | SqlType::DateTime => {
                "TEXT".to_string()
            }
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    /// Reduces a declared type to its affinity.
    fn canonical_type(&self, raw: &str) -> String {
        let upper = LENGTH_SUFFIX.replace(raw.trim(), "").to_ascii_uppercase();
        let affinity = if upper.contains("INT") {
            "INTEGER"
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            "TEXT"
        } else if upper.contains("BLOB") || upper.is_empty() {
            "BLOB"
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            "REAL"
        } else {
            "NUMERIC"
        };
        affinity.to_string()
    }

    fn paging(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), None) => Some(format!("LIMIT {l}")),
            (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
            (None, Some(o)) => Some(format!("LIMIT -1 OFFSET {o}")),
        }
    }

    fn insert_id(&self, _column: &str) -> IdRetrieval {
        IdRetrieval::FollowUp(String::from("SELECT last_insert_rowid()"))
    }

    fn table_exists(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        )
        .with_params(vec![SqlValue::Text(table.to_string())])
    }

    fn introspect(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT type, name, tbl_name, sql FROM sqlite_master \
             WHERE name = ?1 OR (type = 'index' AND tbl_name = ?1) ORDER BY type DESC, name",
        )
        .with_params(vec![SqlValue::Text(table.to_string())])
    }

    fn parse_introspection(
        &self,
        table: &str,
        rows: &[Row],
    ) -> Result<Option<TableDescriptor>, MigrationError> {
        let unparseable = |detail: String| MigrationError::Unparseable {
            table: table.to_string(),
            detail,
        };

        let mut found: Option<TableDescriptor> = None;
        let mut indices = Vec::new();
        for row in rows {
            let kind = text_at(row, "type").unwrap_or_default();
            let name = text_at(row, "name").unwrap_or_default();
            // Automatic indexes backing UNIQUE constraints have no SQL.
            let Some(sql) = text_at(row, "sql") else {
                continue;
            };
            match kind.as_str() {
                "table" if name.eq_ignore_ascii_case(table) => {
                    let parsed = parse_create_table(&sql).map_err(|e| unparseable(e.to_string()))?;
                    found = Some(TableDescriptor {
                        name,
                        kind: ObjectKind::Table,
                        columns: parsed.columns,
                        uniques: parsed.uniques,
                        indices: Vec::new(),
                        view_sql: None,
                    });
                }
                "view" if name.eq_ignore_ascii_case(table) => {
                    let body = view_body(&sql).map_err(|e| unparseable(e.to_string()))?;
                    found = Some(TableDescriptor::view(name, body));
                }
                "index" => {
                    let parsed = parse_create_index(&sql).map_err(|e| unparseable(e.to_string()))?;
                    indices.push(LiveIndex {
                        name: parsed.name,
                        columns: parsed.columns,
                        unique: parsed.unique,
                    });
                }
                _ => {}
            }
        }
        Ok(found.map(|mut descriptor| {
            descriptor.indices = indices;
            descriptor
        }))
    }

    fn autoincrement_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn alter_column(&self, _table: &str, _column: &ColumnDescriptor) -> Vec<String> {
        // Never planned: columns are changed by recreating the table.
        Vec::new()
    }

    /// Outside legacy mode a rename rewrites view bodies and refuses to
    /// run while a view names the dropped table.
    fn rename_rebuilt_table(&self, staging: &str, table: &str) -> Vec<String> {
        vec![
            String::from("PRAGMA legacy_alter_table = ON"),
            self.rename_table(staging, table),
            String::from("PRAGMA legacy_alter_table = OFF"),
        ]
    }

    fn supports_array_parameters(&self) -> bool {
        false
    }

    fn supports_multiple_connections(&self) -> bool {
        false
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn supports_drop_column(&self) -> bool {
        false
    }

    fn supports_alter_unique(&self) -> bool {
        false
    }

    /// ADD COLUMN cannot add a key, a unique column, or a NOT NULL column
    /// without a default.
    fn can_add_column(&self, column: &ColumnDescriptor) -> bool {
        !column.flags.primary_key
            && !column.flags.unique
            && (!column.flags.not_null || column.default.is_some())
    }
}
