//! # oxide-query-sqlite
//!
//! SQLite support for oxide-query, backed by sqlx:
//!
//! - [`SqliteProvider`] supplies pooled connections and transactions to a
//!   [`Database`](oxide_query::Database)
//! - [`SqliteOptions`] configures the pool, from code, serde or the
//!   environment
//! - [`catalog`] lists and introspects tables for the `oxide-query` CLI
//!
//! ```ignore
//! use oxide_query_sqlite::{SqliteOptions, SqliteProvider};
//!
//! let db = SqliteProvider::connect(&SqliteOptions::from_env()?).await?.into_database();
//! db.update_schema::<Sample>().await?;
//! ```

pub mod catalog;
mod options;
mod provider;

pub use options::{OptionsError, SqliteOptions};
pub use provider::{SqliteConnection, SqliteProvider, SqliteTransaction};
