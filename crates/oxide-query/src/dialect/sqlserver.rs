//! SQL Server dialect.

use super::{
    canonical_default_text, catalog, render_function, strip_outer_parens, Dialect, IdRetrieval,
    PlaceholderStyle, SqlFunction,
};
use crate::command::{Fragment, Statement};
use crate::entity::ColumnDescriptor;
use crate::error::MigrationError;
use crate::migrate::TableDescriptor;
use crate::row::Row;
use crate::types::SqlType;
use crate::value::SqlValue;

/// SQL Server: `[x]` quoting, `@N` placeholders, OFFSET/FETCH paging that
/// requires an ORDER BY, and identity columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Creates a new SQL Server dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

const INTROSPECT: &str = "\
SELECT 'column' AS kind, c.COLUMN_NAME AS name, \
CASE WHEN c.CHARACTER_MAXIMUM_LENGTH = -1 THEN c.DATA_TYPE + '(MAX)' \
WHEN c.CHARACTER_MAXIMUM_LENGTH IS NOT NULL \
THEN c.DATA_TYPE + '(' + CAST(c.CHARACTER_MAXIMUM_LENGTH AS NVARCHAR(10)) + ')' \
ELSE c.DATA_TYPE END AS detail, \
(CASE WHEN c.IS_NULLABLE = 'NO' THEN 1 ELSE 0 END \
+ CASE WHEN COLUMNPROPERTY(OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME), c.COLUMN_NAME, 'IsIdentity') = 1 \
THEN 2 ELSE 0 END) AS flag, \
c.COLUMN_DEFAULT AS extra, c.ORDINAL_POSITION AS position \
FROM INFORMATION_SCHEMA.COLUMNS c \
WHERE c.TABLE_SCHEMA = SCHEMA_NAME() AND c.TABLE_NAME = @1 \
UNION ALL \
SELECT CASE WHEN tc.CONSTRAINT_TYPE = 'PRIMARY KEY' THEN 'primary' ELSE 'unique' END, \
tc.CONSTRAINT_NAME, k.COLUMN_NAME, 0, NULL, k.ORDINAL_POSITION \
FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA \
WHERE tc.TABLE_SCHEMA = SCHEMA_NAME() AND tc.TABLE_NAME = @1 \
AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE') \
UNION ALL \
SELECT 'index', i.name, col.name, CAST(i.is_unique AS INT), NULL, ic.key_ordinal \
FROM sys.indexes i \
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
JOIN sys.columns col ON col.object_id = ic.object_id AND col.column_id = ic.column_id \
WHERE i.object_id = OBJECT_ID(SCHEMA_NAME() + '.' + @1) \
AND i.is_primary_key = 0 AND i.is_unique_constraint = 0 AND i.name IS NOT NULL \
UNION ALL \
SELECT 'view', v.TABLE_NAME, v.VIEW_DEFINITION, 0, NULL, 0 \
FROM INFORMATION_SCHEMA.VIEWS v \
WHERE v.TABLE_SCHEMA = SCHEMA_NAME() AND v.TABLE_NAME = @1";

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::At
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            SqlValue::Text(s) => format!("N'{}'", s.replace('\'', "''")),
            SqlValue::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("0x{hex}")
            }
            other => other.to_sql_inline(),
        }
    }

    fn type_name(&self, ty: SqlType) -> String {
        match ty {
            SqlType::Boolean => "BIT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "FLOAT".to_string(),
            SqlType::Text => "NVARCHAR(MAX)".to_string(),
            SqlType::VarChar(n) => format!("NVARCHAR({n})"),
            SqlType::Blob => "VARBINARY(MAX)".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::DateTime => "DATETIME2".to_string(),
        }
    }

    fn canonical_type(&self, raw: &str) -> String {
        let upper: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        match upper.as_str() {
            "INTEGER" => "INT".to_string(),
            "FLOAT(53)" | "DOUBLEPRECISION" => "FLOAT".to_string(),
            "FLOAT(24)" => "REAL".to_string(),
            _ => upper,
        }
    }

    /// Strips the `N` prefix of Unicode string defaults. `CURRENT_TIMESTAMP`
    /// is stored as `getdate()`.
    fn canonical_default(&self, raw: &str) -> String {
        let text = strip_outer_parens(raw);
        match text.strip_prefix('N') {
            Some(rest) if rest.starts_with('\'') => rest.to_string(),
            _ => match canonical_default_text(text).as_str() {
                "GETDATE()" => String::from("CURRENT_TIMESTAMP"),
                other => other.to_string(),
            },
        }
    }

    fn function(&self, func: SqlFunction, args: Vec<Fragment>) -> Fragment {
        let name = match func {
            SqlFunction::Length => "LEN",
            SqlFunction::Random => "NEWID",
            SqlFunction::RowId => "%%physloc%%",
            other => other.name(),
        };
        render_function(name, func, args)
    }

    fn paging(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(l), o) => Some(format!(
                "OFFSET {} ROWS FETCH NEXT {l} ROWS ONLY",
                o.unwrap_or(0)
            )),
            (None, Some(o)) => Some(format!("OFFSET {o} ROWS")),
        }
    }

    fn paging_requires_order(&self) -> bool {
        true
    }

    fn insert_id(&self, _column: &str) -> IdRetrieval {
        IdRetrieval::Suffix(String::from("; SELECT SCOPE_IDENTITY()"))
    }

    fn table_exists(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) AS n FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = SCHEMA_NAME() AND TABLE_NAME = @1",
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

    fn column_definition(&self, column: &ColumnDescriptor) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)
        );
        if column.flags.autoincrement {
            sql.push_str(" IDENTITY(1,1)");
        }
        if column.flags.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if column.flags.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_sql(default));
        }
        sql
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}",
            self.literal(&SqlValue::Text(from.to_string())),
            self.literal(&SqlValue::Text(to.to_string()))
        )
    }

    fn add_column(&self, table: &str, column: &ColumnDescriptor) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// A default is a constraint bound to the column: whatever default the
    /// column has is dropped first (its name is looked up, since SQL Server
    /// generates one when none is given), then type and nullability change,
    /// then the declared default is added back as `df_<table>_<column>`.
    fn alter_column(&self, table: &str, column: &ColumnDescriptor) -> Vec<String> {
        let quoted_table = self.quote_identifier(table);
        let quoted_column = self.quote_identifier(&column.name);
        let mut statements = vec![
            format!(
                "DECLARE @df SYSNAME, @sql NVARCHAR(MAX); \
                 SELECT @df = dc.name FROM sys.default_constraints dc \
                 JOIN sys.columns c ON c.object_id = dc.parent_object_id \
                 AND c.column_id = dc.parent_column_id \
                 WHERE dc.parent_object_id = OBJECT_ID({}) AND c.name = {}; \
                 IF @df IS NOT NULL BEGIN \
                 SET @sql = {} + QUOTENAME(@df); EXEC sp_executesql @sql END",
                self.literal(&SqlValue::Text(quoted_table.clone())),
                self.literal(&SqlValue::Text(column.name.clone())),
                self.literal(&SqlValue::Text(format!("ALTER TABLE {quoted_table} DROP CONSTRAINT ")))
            ),
            format!(
                "ALTER TABLE {quoted_table} ALTER COLUMN {quoted_column} {} {}",
                self.column_type(column),
                if column.is_not_null() { "NOT NULL" } else { "NULL" }
            ),
        ];
        if let Some(default) = &column.default {
            statements.push(format!(
                "ALTER TABLE {quoted_table} ADD CONSTRAINT {} DEFAULT {} FOR {quoted_column}",
                self.quote_identifier(&format!("df_{table}_{}", column.name)),
                self.default_sql(default)
            ));
        }
        statements
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_identifier(table)
        )
    }

    fn supports_array_parameters(&self) -> bool {
        false
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
