//! Blocking facade over [`Database`].

use std::future::Future;

use tokio::runtime::{Builder, Runtime};

use super::{ConnectionProvider, Database, Transaction};
use crate::command::Statement;
use crate::entity::Entity;
use crate::error::{ExecError, Result};
use crate::migrate::SchemaUpdate;
use crate::query::{Insert, Operation, Select};
use crate::row::Row;
use crate::value::SqlValue;

/// Runs [`Database`] operations to completion on a private current-thread
/// runtime. Must not be used from inside another async runtime.
pub struct BlockingDatabase<P: ConnectionProvider> {
    inner: Database<P>,
    runtime: Runtime,
}

impl<P: ConnectionProvider> BlockingDatabase<P> {
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created.
    pub fn new(inner: Database<P>) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: runtime()?,
        })
    }

    /// Builds the [`Database`] on the private runtime, for providers whose
    /// pools spawn background tasks on the runtime they are opened from.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created or `open` fails.
    pub fn open<F, Fut>(open: F) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Database<P>>>,
    {
        let runtime = runtime()?;
        let inner = runtime.block_on(open())?;
        Ok(Self { inner, runtime })
    }

    #[must_use]
    pub const fn database(&self) -> &Database<P> {
        &self.inner
    }

    /// # Errors
    ///
    /// See [`Database::execute`].
    pub fn execute(&self, op: &impl Operation, args: &[SqlValue]) -> Result<u64> {
        self.runtime.block_on(self.inner.execute(op, args))
    }

    /// # Errors
    ///
    /// See [`Database::execute_statement`].
    pub fn execute_statement(&self, statement: &Statement) -> Result<u64> {
        self.runtime.block_on(self.inner.execute_statement(statement))
    }

    /// # Errors
    ///
    /// See [`Database::fetch_all`].
    pub fn fetch_all<E: Entity>(&self, select: &Select<E>) -> Result<Vec<E>> {
        self.runtime.block_on(self.inner.fetch_all(select))
    }

    /// # Errors
    ///
    /// See [`Database::fetch_rows`].
    pub fn fetch_rows(&self, op: &impl Operation, args: &[SqlValue]) -> Result<Vec<Row>> {
        self.runtime.block_on(self.inner.fetch_rows(op, args))
    }

    /// # Errors
    ///
    /// See [`Database::fetch_scalar`].
    pub fn fetch_scalar(&self, op: &impl Operation, args: &[SqlValue]) -> Result<Option<SqlValue>> {
        self.runtime.block_on(self.inner.fetch_scalar(op, args))
    }

    /// # Errors
    ///
    /// See [`Database::insert_returning_id`].
    pub fn insert_returning_id<E: Entity>(&self, insert: &Insert<E>) -> Result<Option<i64>> {
        self.runtime.block_on(self.inner.insert_returning_id(insert))
    }

    /// # Errors
    ///
    /// See [`Database::update_schema`].
    pub fn update_schema<E: Entity>(&self) -> Result<SchemaUpdate> {
        self.runtime.block_on(self.inner.update_schema::<E>())
    }

    /// Runs `f` inside a transaction, committing if it returns `Ok` and
    /// rolling back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of begin/commit.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BlockingTransaction<'_, '_, P>) -> Result<T>,
    {
        let tx = self.runtime.block_on(self.inner.begin())?;
        let mut scope = BlockingTransaction {
            tx,
            runtime: &self.runtime,
        };
        match f(&mut scope) {
            Ok(value) => {
                self.runtime.block_on(scope.tx.commit())?;
                Ok(value)
            }
            Err(e) => {
                self.runtime.block_on(scope.tx.rollback())?;
                Err(e)
            }
        }
    }
}

fn runtime() -> Result<Runtime> {
    Ok(Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ExecError::driver)?)
}

/// A [`Transaction`] driven by a [`BlockingDatabase`].
pub struct BlockingTransaction<'a, 'r, P: ConnectionProvider> {
    tx: Transaction<'a, P>,
    runtime: &'r Runtime,
}

impl<P: ConnectionProvider> BlockingTransaction<'_, '_, P> {
    /// # Errors
    ///
    /// See [`Transaction::execute`].
    pub fn execute(&mut self, op: &impl Operation, args: &[SqlValue]) -> Result<u64> {
        self.runtime.block_on(self.tx.execute(op, args))
    }

    /// # Errors
    ///
    /// See [`Transaction::fetch_all`].
    pub fn fetch_all<E: Entity>(&mut self, select: &Select<E>) -> Result<Vec<E>> {
        self.runtime.block_on(self.tx.fetch_all(select))
    }

    /// # Errors
    ///
    /// See [`Transaction::fetch_scalar`].
    pub fn fetch_scalar(&mut self, op: &impl Operation, args: &[SqlValue]) -> Result<Option<SqlValue>> {
        self.runtime.block_on(self.tx.fetch_scalar(op, args))
    }

    /// # Errors
    ///
    /// See [`Transaction::insert_returning_id`].
    pub fn insert_returning_id<E: Entity>(&mut self, insert: &Insert<E>) -> Result<Option<i64>> {
        self.runtime.block_on(self.tx.insert_returning_id(insert))
    }
}
