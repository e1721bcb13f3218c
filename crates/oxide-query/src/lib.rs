//! # oxide-query
//!
//! Typed query compilation and schema migration for relational databases.
//!
//! This crate provides:
//! - Typed expression trees over entity fields, compiled into
//!   parameterized SQL for SQLite, PostgreSQL or SQL Server
//! - Copy-on-extend builders for SELECT, INSERT, UPDATE and DELETE
//! - Schema migration that diffs a live table against its entity and
//!   applies the difference, rebuilding the table where the database
//!   cannot alter it in place
//! - An async [`Database`] facade over a pluggable connection provider,
//!   plus a blocking one
//!
//! ## Compiling a query
//!
//! ```ignore
//! use oxide_query::{Entity, Operation, Select, SqlServerDialect};
//!
//! #[derive(Debug, Default, Entity)]
//! #[entity(table = "sample")]
//! struct Sample {
//!     #[column(primary_key, autoincrement)]
//!     id: i64,
//!     integer: i64,
//!     string: String,
//! }
//!
//! let query = Select::<Sample>::new().where_clause(
//!     Sample::string().eq("Hello") & Sample::integer().eq(3) | Sample::integer().eq(0),
//! );
//! let prepared = query.prepare(&SqlServerDialect::new())?;
//! // ... WHERE [string] = @1 AND [integer] = @2 OR [integer] = @3
//! ```
//!
//! ## Keeping the schema in sync
//!
//! ```ignore
//! let report = db.update_schema::<Sample>().await?;
//! assert!(db.update_schema::<Sample>().await?.is_empty());
//! ```

pub mod command;
pub mod compile;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod exec;
pub mod expr;
pub mod migrate;
pub mod query;
pub mod row;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod fixtures;

pub use command::{CommandBuilder, PreparedOperation, Statement, Token};
pub use dialect::{
    Dialect, IdRetrieval, PlaceholderStyle, PostgresDialect, SqlFunction, SqlServerDialect,
    SqliteDialect,
};
pub use entity::{
    ColumnDescriptor, ColumnFlags, DefaultValue, Entity, EntityDescriptor, EntityRef,
    EntityRegistry, IndexDescriptor,
};
pub use error::{CompileError, ConversionError, Error, ExecError, MigrationError, Result};
pub use exec::{
    BlockingDatabase, ConnectionProvider, Database, RowReader, Session, Transaction,
    TransactionHandle,
};
pub use expr::{Expr, Field, Ordering, Predicate};
pub use migrate::{SchemaUpdate, Strategy, TableDescriptor};
pub use query::{Delete, Insert, Join, JoinKind, Operation, Select, Update};
pub use row::Row;
pub use types::{SqlType, SqlTyped};
pub use value::{FromSqlValue, SqlValue, ToSqlValue};

#[cfg(feature = "derive")]
pub use oxide_query_derive::Entity;
