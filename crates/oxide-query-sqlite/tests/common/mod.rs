//! Shared entities and helpers for the SQLite integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::BoxStream;

use oxide_query::{
    ConnectionProvider, Database, Entity, ExecError, Row, Select, Session, SqlValue, SqliteDialect,
    Statement, TransactionHandle,
};
use oxide_query_sqlite::{SqliteOptions, SqliteProvider};

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "sample")]
pub struct Sample {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub integer: i64,
    pub string: String,
    pub note: Option<String>,
}

impl Sample {
    pub fn with(integer: i64, string: &str) -> Self {
        Self {
            integer,
            string: string.to_string(),
            ..Self::default()
        }
    }
}

/// `sample` without its `note` column.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "sample")]
pub struct SampleWithoutNote {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub integer: i64,
    pub string: String,
}

/// Rows of `sample` with a large `integer`.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "big_sample", view = "big_sample_definition")]
pub struct BigSample {
    pub id: i64,
    pub integer: i64,
}

pub fn big_sample_definition() -> oxide_query::query::SelectSpec {
    Select::<Sample>::new()
        .fields([Sample::id(), Sample::integer()])
        .where_clause(Sample::integer().gt(50))
        .into_spec()
}

/// First shape of `person`.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "person")]
pub struct PersonV1 {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    #[column(length = 40)]
    pub name: String,
}

/// Adds a NOT NULL column without a default.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "person")]
pub struct PersonV2 {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    #[column(length = 40)]
    pub name: String,
    pub age: i64,
}

/// Drops `name` and indexes `age`.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "person", index = "age")]
pub struct PersonV3 {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub age: i64,
}

/// Adds a nullable column, which needs no rebuild.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "person", index = "age")]
pub struct PersonV4 {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub age: i64,
    pub nickname: Option<String>,
}

/// Declares a unique group that existing rows violate.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "person", index = "age", unique = "age")]
pub struct PersonUniqueAge {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub age: i64,
    pub nickname: Option<String>,
}

/// Has a column default.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "setting")]
pub struct Setting {
    #[column(primary_key)]
    pub key: String,
    #[column(default_value = 7)]
    pub level: i64,
}

/// In-memory database on one connection.
pub async fn memory_db() -> Database<SqliteProvider> {
    SqliteProvider::connect(&SqliteOptions::default())
        .await
        .expect("open in-memory database")
        .into_database()
}

/// File database with a pool of several connections.
pub async fn file_db(dir: &tempfile::TempDir) -> Database<SqliteProvider> {
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    SqliteProvider::connect(&SqliteOptions::new(url).max_connections(4))
        .await
        .expect("open file database")
        .into_database()
}

/// Provider that records the text of every statement it runs.
#[derive(Clone)]
pub struct RecordingProvider {
    inner: SqliteProvider,
    log: Arc<Mutex<Vec<String>>>,
    fail_rollback: Arc<AtomicBool>,
}

impl RecordingProvider {
    pub async fn memory() -> Self {
        let inner = SqliteProvider::connect(&SqliteOptions::default())
            .await
            .expect("open in-memory database");
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
            fail_rollback: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every later rollback report an error. The driver transaction
    /// is still dropped, which rolls it back.
    pub fn fail_rollbacks(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }

    pub fn database(self) -> Database<Self> {
        Database::new(self, SqliteDialect::new())
    }

    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn record(&self, statement: &Statement) {
        record(&self.log, statement);
    }
}

fn record(log: &Mutex<Vec<String>>, statement: &Statement) {
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(statement.text.clone());
}

pub struct Recorded<S> {
    inner: S,
    log: Arc<Mutex<Vec<String>>>,
    fail_rollback: Arc<AtomicBool>,
}

#[async_trait]
impl<S: Session> Session for Recorded<S> {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ExecError> {
        record(&self.log, statement);
        self.inner.execute(statement).await
    }

    async fn fetch_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>, ExecError> {
        record(&self.log, statement);
        self.inner.fetch_scalar(statement).await
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, ExecError> {
        record(&self.log, statement);
        self.inner.fetch_all(statement).await
    }
}

#[async_trait]
impl<S: TransactionHandle> TransactionHandle for Recorded<S> {
    async fn commit(self) -> Result<(), ExecError> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), ExecError> {
        if self.fail_rollback.load(Ordering::SeqCst) {
            drop(self.inner);
            return Err(ExecError::driver(std::io::Error::other("rollback refused")));
        }
        self.inner.rollback().await
    }
}

#[async_trait]
impl ConnectionProvider for RecordingProvider {
    type Connection = Recorded<<SqliteProvider as ConnectionProvider>::Connection>;
    type Transaction = Recorded<<SqliteProvider as ConnectionProvider>::Transaction>;

    async fn open(&self) -> Result<Self::Connection, ExecError> {
        Ok(Recorded {
            inner: self.inner.open().await?,
            log: Arc::clone(&self.log),
            fail_rollback: Arc::clone(&self.fail_rollback),
        })
    }

    async fn begin(&self) -> Result<Self::Transaction, ExecError> {
        Ok(Recorded {
            inner: self.inner.begin().await?,
            log: Arc::clone(&self.log),
            fail_rollback: Arc::clone(&self.fail_rollback),
        })
    }

    fn stream<'a>(&'a self, statement: &'a Statement) -> BoxStream<'a, Result<Row, ExecError>> {
        self.record(statement);
        self.inner.stream(statement)
    }
}

/// Whether any recorded statement starts with `prefix`.
pub fn ran(statements: &[String], prefix: &str) -> bool {
    statements.iter().any(|s| s.starts_with(prefix))
}

