//! The async database facade.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::reader::RowReader;
use super::transaction::Transaction;
use super::{ConnectionProvider, Session};
use crate::command::{PreparedOperation, Statement};
use crate::dialect::Dialect;
use crate::entity::{materialize, Entity, EntityDescriptor, EntityRegistry};
use crate::error::{CompileError, Error, ExecError, MigrationError, Result};
use crate::migrate::{plan_table, render_plan, view_definition, SchemaUpdate, Strategy};
use crate::query::{Insert, Operation, Select};
use crate::row::Row;
use crate::value::{FromSqlValue, SqlValue};

/// Compiles operations for one dialect and runs them through a provider.
///
/// For dialects without concurrent connections, ad hoc calls are
/// serialized behind a connection gate and transactions behind a separate
/// transaction gate. [`Database::begin`] takes the connection gate before
/// the transaction gate, never the reverse.
///
/// Issuing an ad hoc call from the task that holds an open transaction on
/// a single-connection provider waits for that transaction forever; run
/// such calls through the [`Transaction`] instead.
pub struct Database<P: ConnectionProvider> {
    provider: P,
    dialect: Arc<dyn Dialect>,
    registry: Option<Arc<EntityRegistry>>,
    connection_gate: Arc<Mutex<()>>,
    transaction_gate: Arc<Mutex<()>>,
}

impl<P: ConnectionProvider> Database<P> {
    pub fn new(provider: P, dialect: impl Dialect + 'static) -> Self {
        Self {
            provider,
            dialect: Arc::new(dialect),
            registry: None,
            connection_gate: Arc::new(Mutex::new(())),
            transaction_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Resolves entities through `registry` instead of the process-wide one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        self.registry
            .as_deref()
            .unwrap_or_else(|| EntityRegistry::global())
    }

    /// Compiles `op` for this database's dialect.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if the operation does not compile.
    pub fn prepare(&self, op: &impl Operation) -> std::result::Result<PreparedOperation, CompileError> {
        op.prepare_with(self.dialect(), self.registry())
    }

    /// Compiles `op` and binds the execution-time `args`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if the operation does not compile or the
    /// argument count is wrong.
    pub fn statement(
        &self,
        op: &impl Operation,
        args: &[SqlValue],
    ) -> std::result::Result<Statement, CompileError> {
        self.prepare(op)?.bind(args)
    }

    async fn connection_guard(&self) -> Option<OwnedMutexGuard<()>> {
        if self.dialect.supports_multiple_connections() {
            None
        } else {
            Some(Arc::clone(&self.connection_gate).lock_owned().await)
        }
    }

    /// Runs `op` and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn execute(&self, op: &impl Operation, args: &[SqlValue]) -> Result<u64> {
        let statement = self.statement(op, args)?;
        self.execute_statement(&statement).await
    }

    /// Runs a raw statement.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unmodified.
    pub async fn execute_statement(&self, statement: &Statement) -> Result<u64> {
        let _gate = self.connection_guard().await;
        let mut conn = self.provider.open().await?;
        Ok(run_execute(&mut conn, statement).await?)
    }

    /// Runs `select` and materializes every row as `E`.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation, execution or materialization fails.
    pub async fn fetch_all<E: Entity>(&self, select: &Select<E>) -> Result<Vec<E>> {
        let rows = self.fetch_rows(select, &[]).await?;
        materialize_all(rows, &self.registry().descriptor::<E>())
    }

    /// Runs `op` and returns the raw rows.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn fetch_rows(&self, op: &impl Operation, args: &[SqlValue]) -> Result<Vec<Row>> {
        let statement = self.statement(op, args)?;
        let _gate = self.connection_guard().await;
        let mut conn = self.provider.open().await?;
        Ok(run_fetch_all(&mut conn, &statement).await?)
    }

    /// Runs `op` and returns the first column of the first row.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub async fn fetch_scalar(&self, op: &impl Operation, args: &[SqlValue]) -> Result<Option<SqlValue>> {
        let statement = self.statement(op, args)?;
        let _gate = self.connection_guard().await;
        let mut conn = self.provider.open().await?;
        Ok(run_fetch_scalar(&mut conn, &statement).await?)
    }

    /// Inserts and returns the generated key of the last row.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails, or the key is
    /// not an integer.
    pub async fn insert_returning_id<E: Entity>(&self, insert: &Insert<E>) -> Result<Option<i64>> {
        let insert = insert.clone().returning_id();
        let statement = self.statement(&insert, &[])?;
        let follow_up = insert.follow_up(self.dialect(), self.registry());
        let _gate = self.connection_guard().await;
        let mut conn = self.provider.open().await?;
        insert_on(&mut conn, &statement, follow_up.as_ref()).await
    }

    /// Opens a reader over the rows of `statement`.
    ///
    /// Without concurrent-connection support the rows are buffered before
    /// this returns, releasing the connection; otherwise they stream.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffered read fails.
    pub async fn reader<'a, E: Entity>(&'a self, statement: &'a Statement) -> Result<RowReader<'a, E>> {
        let descriptor = self.registry().descriptor::<E>();
        if self.dialect.supports_multiple_connections() {
            debug!(sql = %statement.text, params = statement.params.len(), "Streaming statement");
            return Ok(RowReader::streaming(self.provider.stream(statement), descriptor));
        }
        let _gate = self.connection_guard().await;
        let mut conn = self.provider.open().await?;
        let rows = run_fetch_all(&mut conn, statement).await?;
        Ok(RowReader::buffered(rows, descriptor))
    }

    /// Starts a transaction that owns one provider transaction until it
    /// is committed, rolled back or dropped.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the transaction cannot be started.
    pub async fn begin(&self) -> Result<Transaction<'_, P>> {
        if self.dialect.supports_multiple_connections() {
            let handle = self.provider.begin().await?;
            return Ok(Transaction::new(self, handle, None));
        }
        loop {
            let connection = self.connection_gate.lock().await;
            if let Ok(gate) = Arc::clone(&self.transaction_gate).try_lock_owned() {
                let handle = self.provider.begin().await?;
                drop(connection);
                return Ok(Transaction::new(self, handle, Some(gate)));
            }
            // Another transaction is open: wait for it without holding the
            // connection gate, then retry in gate order.
            drop(connection);
            drop(self.transaction_gate.lock().await);
        }
    }

    /// Brings the live table or view of `E` in line with its descriptor.
    ///
    /// Every statement runs in one transaction; on failure nothing is
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the live schema cannot be read or
    /// parsed, or a statement fails.
    pub async fn update_schema<E: Entity>(&self) -> Result<SchemaUpdate> {
        let descriptor = self.registry().descriptor::<E>();
        self.update_descriptor(&descriptor).await
    }

    async fn update_descriptor(&self, descriptor: &EntityDescriptor) -> Result<SchemaUpdate> {
        let dialect = self.dialect();
        let table = descriptor.table.as_str();
        let unreadable = |source| MigrationError::Unreadable {
            table: table.to_string(),
            source,
        };

        let mut tx = self.begin().await?;
        let count = run_fetch_scalar(tx.handle_mut(), &dialect.table_exists(table))
            .await
            .map_err(unreadable)?;
        let exists = match count {
            Some(value) => i64::from_sql_value(value)? > 0,
            None => false,
        };
        let live = if exists {
            let rows = run_fetch_all(tx.handle_mut(), &dialect.introspect(table))
                .await
                .map_err(unreadable)?;
            dialect.parse_introspection(table, &rows)?
        } else {
            None
        };

        let view_sql = view_definition(descriptor, dialect, self.registry()).map_err(MigrationError::from)?;
        let plan = plan_table(descriptor, live.as_ref(), dialect, view_sql.as_deref())?;
        if plan.is_empty() {
            tx.commit().await?;
            return Ok(SchemaUpdate {
                table: plan.table,
                strategy: plan.strategy,
                statements: Vec::new(),
            });
        }

        let statements = render_plan(&plan, dialect);
        info!(table = %plan.table, statements = statements.len(), "Applying schema changes");
        for statement in &statements {
            if let Err(source) = run_execute(tx.handle_mut(), statement).await {
                if let Err(err) = tx.rollback().await {
                    warn!(table = %plan.table, error = %err, "Rollback after failed schema change failed");
                }
                let table = plan.table.clone();
                return Err(match plan.strategy {
                    Strategy::Recreate => MigrationError::Recreate { table, source },
                    _ => MigrationError::Apply { table, source },
                }
                .into());
            }
        }
        tx.commit().await?;

        Ok(SchemaUpdate {
            table: plan.table,
            strategy: plan.strategy,
            statements: statements.into_iter().map(|s| s.text).collect(),
        })
    }
}

pub(super) fn materialize_all<E: Entity>(rows: Vec<Row>, descriptor: &EntityDescriptor) -> Result<Vec<E>> {
    rows.into_iter()
        .map(|row| materialize(row, descriptor).map_err(Error::from))
        .collect()
}

pub(super) async fn insert_on<S: Session + ?Sized>(
    session: &mut S,
    statement: &Statement,
    follow_up: Option<&Statement>,
) -> Result<Option<i64>> {
    let id = match follow_up {
        Some(follow_up) => {
            run_execute(session, statement).await?;
            run_fetch_scalar(session, follow_up).await?
        }
        None => run_fetch_scalar(session, statement).await?,
    };
    Ok(id.map(Option::<i64>::from_sql_value).transpose()?.flatten())
}

pub(super) async fn run_execute<S: Session + ?Sized>(
    session: &mut S,
    statement: &Statement,
) -> std::result::Result<u64, ExecError> {
    debug!(sql = %statement.text, params = statement.params.len(), "Executing statement");
    session.execute(statement).await
}

pub(super) async fn run_fetch_all<S: Session + ?Sized>(
    session: &mut S,
    statement: &Statement,
) -> std::result::Result<Vec<Row>, ExecError> {
    debug!(sql = %statement.text, params = statement.params.len(), "Executing statement");
    session.fetch_all(statement).await
}

pub(super) async fn run_fetch_scalar<S: Session + ?Sized>(
    session: &mut S,
    statement: &Statement,
) -> std::result::Result<Option<SqlValue>, ExecError> {
    debug!(sql = %statement.text, params = statement.params.len(), "Executing statement");
    session.fetch_scalar(statement).await
}
