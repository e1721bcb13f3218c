//! PostgreSQL dialect.

use std::sync::LazyLock;

use regex::Regex;

use super::{catalog, canonical_default_text, Dialect, IdRetrieval, PlaceholderStyle};
use crate::command::Statement;
use crate::entity::ColumnDescriptor;
use crate::error::MigrationError;
use crate::migrate::TableDescriptor;
use crate::row::Row;
use crate::types::SqlType;
use crate::value::SqlValue;

/// PostgreSQL: `$N` placeholders, native array parameters and full
/// ALTER TABLE support.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

static TYPE_CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::[a-zA-Z_][a-zA-Z0-9_ ]*(\[\])?(\([0-9, ]*\))?").expect("valid cast regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const INTROSPECT: &str = "\
SELECT 'column' AS kind, c.column_name::text AS name, \
CASE WHEN c.character_maximum_length IS NULL THEN c.data_type::text \
ELSE c.data_type || '(' || c.character_maximum_length || ')' END AS detail, \
(CASE WHEN c.is_nullable = 'NO' THEN 1 ELSE 0 END \
+ CASE WHEN c.column_default LIKE 'nextval(%' THEN 2 ELSE 0 END) AS flag, \
c.column_default::text AS extra, c.ordinal_position::integer AS position \
FROM information_schema.columns c \
WHERE c.table_schema = current_schema() AND c.table_name = $1 \
UNION ALL \
SELECT CASE WHEN tc.constraint_type = 'PRIMARY KEY' THEN 'primary' ELSE 'unique' END, \
tc.constraint_name::text, k.column_name::text, 0, NULL, k.ordinal_position::integer \
FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage k \
ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema \
WHERE tc.table_schema = current_schema() AND tc.table_name = $1 \
AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
UNION ALL \
SELECT 'index', ic.relname::text, a.attname::text, CASE WHEN ix.indisunique THEN 1 ELSE 0 END, \
NULL, array_position(ix.indkey::int2[], a.attnum)::integer \
FROM pg_index ix \
JOIN pg_class t ON t.oid = ix.indrelid \
JOIN pg_class ic ON ic.oid = ix.indexrelid \
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
WHERE t.relname = $1 AND t.relnamespace = current_schema()::regnamespace \
AND NOT EXISTS (SELECT 1 FROM pg_constraint pc WHERE pc.conindid = ix.indexrelid) \
UNION ALL \
SELECT 'view', v.table_name::text, v.view_definition::text, 0, NULL, 0 \
FROM information_schema.views v \
WHERE v.table_schema = current_schema() AND v.table_name = $1";

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn type_name(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::VarChar(n) => format!("VARCHAR({n})"),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::DateTime => "TIMESTAMP".to_string(),
        }
    }

    fn column_type(&self, column: &ColumnDescriptor) -> String {
        if column.flags.autoincrement {
            match column.sql_type {
                SqlType::BigInt => return "BIGSERIAL".to_string(),
                SqlType::SmallInt | SqlType::Integer => return "SERIAL".to_string(),
                _ => {}
            }
        }
        self.type_name(column.sql_type)
    }

    fn canonical_type(&self, raw: &str) -> String {
        let upper = WHITESPACE
            .replace_all(raw.trim(), " ")
            .to_ascii_uppercase()
            .replace(" (", "(");
        let canonical = match upper.as_str() {
            "BOOL" => "BOOLEAN",
            "INT2" => "SMALLINT",
            "INT" | "INT4" | "SERIAL" | "SERIAL4" => "INTEGER",
            "INT8" | "BIGSERIAL" | "SERIAL8" => "BIGINT",
            "FLOAT4" => "REAL",
            "FLOAT8" | "FLOAT" => "DOUBLE PRECISION",
            "TIMESTAMP WITHOUT TIME ZONE" => "TIMESTAMP",
            other => {
                if let Some(rest) = other.strip_prefix("CHARACTER VARYING") {
                    return format!("VARCHAR{rest}");
                }
                other
            }
        };
        canonical.to_string()
    }

    /// Drops `::type` casts the catalog adds to stored defaults.
    fn canonical_default(&self, raw: &str) -> String {
        canonical_default_text(&TYPE_CAST.replace_all(raw, ""))
    }

    fn insert_id(&self, column: &str) -> IdRetrieval {
        IdRetrieval::Suffix(format!("RETURNING {}", self.quote_identifier(column)))
    }

    fn table_exists(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .with_params(vec![SqlValue::Text(table.to_string())])
    }

    fn introspect(&self, table: &str) -> Statement {
        Statement::new(INTROSPECT).with_params(vec![SqlValue::Text(table.to_string())])
    }

    fn parse_introspection(
        &self,
        table: &str,
        rows: &[Row],
    ) -> Result<Option<TableDescriptor>, MigrationError> {
        catalog::assemble(table, rows)
    }

    fn alter_column(&self, table: &str, column: &ColumnDescriptor) -> Vec<String> {
        let name = self.quote_identifier(&column.name);
        let mut actions = vec![format!(
            "ALTER COLUMN {name} TYPE {}",
            self.type_name(column.sql_type)
        )];
        actions.push(if column.is_not_null() {
            format!("ALTER COLUMN {name} SET NOT NULL")
        } else {
            format!("ALTER COLUMN {name} DROP NOT NULL")
        });
        actions.push(match &column.default {
            Some(default) => format!("ALTER COLUMN {name} SET DEFAULT {}", self.default_sql(default)),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        });
        vec![format!(
            "ALTER TABLE {} {}",
            self.quote_identifier(table),
            actions.join(", ")
        )]
    }

    fn supports_array_parameters(&self) -> bool {
        true
    }

    fn supports_multiple_connections(&self) -> bool {
        true
    }

    fn supports_alter_column(&self) -> bool {
        true
    }

    fn supports_drop_column(&self) -> bool {
        true
    }

    fn supports_alter_unique(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Parameter, Token};
    use crate::entity::DefaultValue;

    #[test]
    fn test_canonical_type_synonyms() {
        let d = PostgresDialect::new();
        assert_eq!(d.canonical_type("int8"), "BIGINT");
        assert_eq!(d.canonical_type("character varying(40)"), "VARCHAR(40)");
        assert_eq!(d.canonical_type("timestamp without time zone"), "TIMESTAMP");
        assert_eq!(d.canonical_type("double  precision"), "DOUBLE PRECISION");
    }

    #[test]
    fn test_autoincrement_uses_serial() {
        let d = PostgresDialect::new();
        let id = ColumnDescriptor::new("id", "id", SqlType::BigInt)
            .primary_key()
            .autoincrement();
        assert_eq!(d.column_definition(&id), "\"id\" BIGSERIAL PRIMARY KEY");
        assert!(d.types_equivalent(&id, "bigint"));
    }

    #[test]
    fn test_default_casts_stripped() {
        let d = PostgresDialect::new();
        assert_eq!(d.canonical_default("'abc'::text"), "'abc'");
        assert_eq!(d.canonical_default("'x'::character varying"), "'x'");
        assert_eq!(d.canonical_default("false"), "FALSE");
    }

    #[test]
    fn test_alter_column_single_statement() {
        let d = PostgresDialect::new();
        let column = ColumnDescriptor::new("age", "age", SqlType::Integer)
            .not_null()
            .default_value(DefaultValue::Value(SqlValue::Int(0)));
        assert_eq!(
            d.alter_column("users", &column),
            vec![String::from(
                "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE INTEGER, \
                 ALTER COLUMN \"age\" SET NOT NULL, ALTER COLUMN \"age\" SET DEFAULT 0"
            )]
        );
    }

    #[test]
    fn test_in_array_binds_one_parameter() {
        let d = PostgresDialect::new();
        let fragment = d.in_array(
            vec![Token::Text(String::from("x"))],
            SqlValue::Array(vec![SqlValue::Int(1)]),
        );
        assert_eq!(fragment.len(), 4);
        assert!(matches!(&fragment[2], Token::Param(p) if p.is_array()));
        assert!(matches!(fragment[2], Token::Param(Parameter::Constant(_))));
    }

    #[test]
    fn test_insert_id_returning() {
        assert_eq!(
            PostgresDialect::new().insert_id("id"),
            IdRetrieval::Suffix(String::from("RETURNING \"id\""))
        );
    }
}
