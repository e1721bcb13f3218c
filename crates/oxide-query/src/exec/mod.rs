//! Execution: the connection-provider seam and the [`Database`] facade.
//!
//! Compilation never touches a connection. Only the calls in this module
//! await, and only around the physical I/O performed by the provider.

mod blocking;
mod database;
mod reader;
mod transaction;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use blocking::{BlockingDatabase, BlockingTransaction};
pub use database::Database;
pub use reader::RowReader;
pub use transaction::Transaction;

use crate::command::Statement;
use crate::error::ExecError;
use crate::row::Row;
use crate::value::SqlValue;

/// One physical connection or transaction able to run statements.
#[async_trait]
pub trait Session: Send {
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ExecError>;

    /// Returns the first column of the first row, if any.
    async fn fetch_scalar(&mut self, statement: &Statement) -> Result<Option<SqlValue>, ExecError>;

    /// Returns every row.
    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, ExecError>;
}

/// An open transaction. Dropping the handle without calling
/// [`commit`](Self::commit) must roll the transaction back.
#[async_trait]
pub trait TransactionHandle: Session {
    async fn commit(self) -> Result<(), ExecError>
    where
        Self: Sized;

    async fn rollback(self) -> Result<(), ExecError>
    where
        Self: Sized;
}

/// Supplies connections for one database.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    type Connection: Session;
    type Transaction: TransactionHandle;

    async fn open(&self) -> Result<Self::Connection, ExecError>;

    async fn begin(&self) -> Result<Self::Transaction, ExecError>;

    /// Streams the rows of `statement` lazily. Only used when the dialect
    /// supports multiple connections.
    fn stream<'a>(&'a self, statement: &'a Statement) -> BoxStream<'a, Result<Row, ExecError>>;
}
