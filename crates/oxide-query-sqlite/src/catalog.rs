//! Read-only catalog queries used by the CLI.

use serde::Serialize;

use oxide_query::migrate::ObjectKind;
use oxide_query::{
    ConnectionProvider, Dialect, Result, Session, SqlValue, SqliteDialect, Statement, TableDescriptor,
};

use crate::provider::SqliteProvider;

/// A user table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub kind: ObjectKind,
}

/// Lists user tables and views by name.
///
/// # Errors
///
/// Returns the driver error if the catalog cannot be read.
pub async fn list_objects(provider: &SqliteProvider) -> Result<Vec<CatalogEntry>> {
    let statement = Statement::new(
        "SELECT name, type FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
    );
    let mut conn = provider.open().await?;
    let rows = conn.fetch_all(&statement).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let name = match row.get("name") {
                Some(SqlValue::Text(name)) => name.clone(),
                _ => return None,
            };
            let kind = match row.get("type") {
                Some(SqlValue::Text(kind)) if kind == "view" => ObjectKind::View,
                _ => ObjectKind::Table,
            };
            Some(CatalogEntry { name, kind })
        })
        .collect())
}

/// Introspects one table or view the way schema migration sees it.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read or the stored
/// definition cannot be parsed.
pub async fn inspect(provider: &SqliteProvider, table: &str) -> Result<Option<TableDescriptor>> {
    let dialect = SqliteDialect::new();
    let mut conn = provider.open().await?;
    let rows = conn.fetch_all(&dialect.introspect(table)).await?;
    Ok(dialect.parse_introspection(table, &rows)?)
}
