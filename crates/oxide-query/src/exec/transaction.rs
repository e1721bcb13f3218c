//! Transaction scopes.

use tokio::sync::OwnedMutexGuard;
use tracing::warn;

use super::database::{insert_on, materialize_all, run_execute, run_fetch_all, run_fetch_scalar};
use super::{ConnectionProvider, Database, TransactionHandle};
use crate::command::Statement;
use crate::entity::Entity;
use crate::error::Result;
use crate::query::{Insert, Operation, Select};
use crate::row::Row;
use crate::value::SqlValue;

/// A transaction owning one provider transaction for its lifetime.
///
/// It must be finished with [`commit`](Self::commit); dropping it
/// unfinished rolls back and logs a warning.
pub struct Transaction<'a, P: ConnectionProvider> {
    db: &'a Database<P>,
    handle: Option<P::Transaction>,
    /// Held until the transaction ends on single-connection dialects.
    _gate: Option<OwnedMutexGuard<()>>,
}

impl<'a, P: ConnectionProvider> Transaction<'a, P> {
    pub(super) const fn new(
        db: &'a Database<P>,
        handle: P::Transaction,
        gate: Option<OwnedMutexGuard<()>>,
    ) -> Self {
        Self {
            db,
            handle: Some(handle),
            _gate: gate,
        }
    }

    pub(super) fn handle_mut(&mut self) -> &mut P::Transaction {
        self.handle
            .as_mut()
            .unwrap_or_else(|| unreachable!("transaction used after it finished"))
    }

    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn execute(&mut self, op: &impl Operation, args: &[SqlValue]) -> Result<u64> {
        let statement = self.db.statement(op, args)?;
        self.execute_statement(&statement).await
    }

    /// # Errors
    ///
    /// Returns the provider's error unmodified.
    pub async fn execute_statement(&mut self, statement: &Statement) -> Result<u64> {
        Ok(run_execute(self.handle_mut(), statement).await?)
    }

    /// # Errors
    ///
    /// Returns an error if compilation, execution or materialization fails.
    pub async fn fetch_all<E: Entity>(&mut self, select: &Select<E>) -> Result<Vec<E>> {
        let rows = self.fetch_rows(select, &[]).await?;
        materialize_all(rows, &self.db.registry().descriptor::<E>())
    }

    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn fetch_rows(&mut self, op: &impl Operation, args: &[SqlValue]) -> Result<Vec<Row>> {
        let statement = self.db.statement(op, args)?;
        Ok(run_fetch_all(self.handle_mut(), &statement).await?)
    }

    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn fetch_scalar(&mut self, op: &impl Operation, args: &[SqlValue]) -> Result<Option<SqlValue>> {
        let statement = self.db.statement(op, args)?;
        Ok(run_fetch_scalar(self.handle_mut(), &statement).await?)
    }

    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn insert_returning_id<E: Entity>(&mut self, insert: &Insert<E>) -> Result<Option<i64>> {
        let insert = insert.clone().returning_id();
        let statement = self.db.statement(&insert, &[])?;
        let follow_up = insert.follow_up(self.db.dialect(), self.db.registry());
        insert_on(self.handle_mut(), &statement, follow_up.as_ref()).await
    }

    /// # Errors
    ///
    /// Returns the provider's error if the commit fails; the transaction
    /// is then rolled back by the provider.
    pub async fn commit(mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.commit().await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the provider's error if the rollback fails.
    pub async fn rollback(mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.rollback().await?;
        }
        Ok(())
    }
}

impl<P: ConnectionProvider> Drop for Transaction<'_, P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("Transaction dropped without commit, rolling back");
        }
    }
}
