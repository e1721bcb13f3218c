//! sqlx-backed connection provider.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};

use oxide_query::{
    ConnectionProvider, Database, ExecError, Row, Session, SqlValue, SqliteDialect, Statement,
    TransactionHandle,
};

use crate::options::SqliteOptions;

/// Supplies pooled SQLite connections to a [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool as described by `options`.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the URL is invalid or the database
    /// cannot be opened.
    pub async fn connect(options: &SqliteOptions) -> Result<Self, sqlx::Error> {
        Ok(Self::new(options.connect().await?))
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wraps the provider in a [`Database`] using the SQLite dialect.
    #[must_use]
    pub fn into_database(self) -> Database<Self> {
        Database::new(self, SqliteDialect::new())
    }
}

/// A pooled connection, returned to the pool on drop.
pub struct SqliteConnection(PoolConnection<Sqlite>);

/// An open transaction; rolled back by sqlx if dropped unfinished.
pub struct SqliteTransaction(sqlx::Transaction<'static, Sqlite>);

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    type Connection = SqliteConnection;
    type Transaction = SqliteTransaction;

    async fn open(&self) -> Result<Self::Connection, ExecError> {
        let conn = self.pool.acquire().await.map_err(ExecError::driver)?;
        Ok(SqliteConnection(conn))
    }

    async fn begin(&self) -> Result<Self::Transaction, ExecError> {
        let tx = self.pool.begin().await.map_err(ExecError::driver)?;
        Ok(SqliteTransaction(tx))
    }

    fn stream<'a>(&'a self, statement: &'a Statement) -> BoxStream<'a, Result<Row, ExecError>> {
        let query = match bind_params(statement) {
            Ok(query) => query,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let mut columns = None;
        query
            .fetch(&self.pool)
            .map(move |row| {
                let row = row.map_err(ExecError::driver)?;
                decode_row(&row, &mut columns)
            })
            .boxed()
    }
}

#[async_trait]
impl Session for SqliteConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ExecError> {
        execute_on(&mut self.0, statement).await
    }

    async fn fetch_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>, ExecError> {
        fetch_scalar_on(&mut self.0, statement).await
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, ExecError> {
        fetch_all_on(&mut self.0, statement).await
    }
}

#[async_trait]
impl Session for SqliteTransaction {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ExecError> {
        execute_on(&mut self.0, statement).await
    }

    async fn fetch_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>, ExecError> {
        fetch_scalar_on(&mut self.0, statement).await
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, ExecError> {
        fetch_all_on(&mut self.0, statement).await
    }
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    async fn commit(self) -> Result<(), ExecError> {
        self.0.commit().await.map_err(ExecError::driver)
    }

    async fn rollback(self) -> Result<(), ExecError> {
        self.0.rollback().await.map_err(ExecError::driver)
    }
}

async fn execute_on(conn: &mut sqlx::SqliteConnection, statement: &Statement) -> Result<u64, ExecError> {
    let result = bind_params(statement)?
        .execute(conn)
        .await
        .map_err(ExecError::driver)?;
    Ok(result.rows_affected())
}

async fn fetch_scalar_on(
    conn: &mut sqlx::SqliteConnection,
    statement: &Statement,
) -> Result<Option<SqlValue>, ExecError> {
    let row = bind_params(statement)?
        .fetch_optional(conn)
        .await
        .map_err(ExecError::driver)?;
    match row {
        Some(row) if !row.is_empty() => Ok(Some(decode_value(&row, 0)?)),
        _ => Ok(None),
    }
}

async fn fetch_all_on(conn: &mut sqlx::SqliteConnection, statement: &Statement) -> Result<Vec<Row>, ExecError> {
    let rows = bind_params(statement)?
        .fetch_all(conn)
        .await
        .map_err(ExecError::driver)?;
    let mut columns = None;
    rows.iter().map(|row| decode_row(row, &mut columns)).collect()
}

/// Binds every parameter of `statement`. Arrays are expanded into single
/// placeholders at compile time for SQLite, so an array reaching the
/// driver is an error.
fn bind_params(statement: &Statement) -> Result<Query<'_, Sqlite, SqliteArguments<'_>>, ExecError> {
    let mut query = sqlx::query(&statement.text);
    for param in &statement.params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Blob(b) => query.bind(b.as_slice()),
            SqlValue::Array(_) => {
                return Err(ExecError::driver(sqlx::Error::Protocol(String::from(
                    "array parameters are not supported by sqlite",
                ))));
            }
        };
    }
    Ok(query)
}

/// Converts a driver row. Column names are read once per result set and
/// shared by every row.
fn decode_row(row: &SqliteRow, columns: &mut Option<Arc<[String]>>) -> Result<Row, ExecError> {
    let names = columns
        .get_or_insert_with(|| row.columns().iter().map(|c| c.name().to_string()).collect())
        .clone();
    let values = (0..row.len())
        .map(|i| decode_value(row, i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(names, values))
}

/// Decodes by storage class, since SQLite columns carry no fixed type.
fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue, ExecError> {
    let raw = row.try_get_raw(index).map_err(ExecError::driver)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_info = raw.type_info();
    let value = match type_info.name() {
        "INTEGER" => row.try_get::<i64, _>(index).map(SqlValue::Int),
        "REAL" => row.try_get::<f64, _>(index).map(SqlValue::Float),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).map(SqlValue::Blob),
        _ => row.try_get::<String, _>(index).map(SqlValue::Text),
    };
    value.map_err(ExecError::driver)
}
