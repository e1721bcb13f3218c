//! Connection options.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

const DEFAULT_POOL_SIZE: u32 = 5;

/// An environment variable that could not be parsed.
#[derive(Debug, Error)]
#[error("invalid value `{value}` for {name}")]
pub struct OptionsError {
    pub name: &'static str,
    pub value: String,
}

/// How to open a SQLite database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Connection URL, e.g. `sqlite:app.db` or `sqlite::memory:`.
    pub url: String,
    /// Pool size. Defaults to 1 for in-memory databases, which exist only
    /// as long as their single connection.
    pub max_connections: Option<u32>,
    pub create_if_missing: bool,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            url: String::from("sqlite::memory:"),
            max_connections: None,
            create_if_missing: true,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteOptions {
    /// Options for `url` with every other setting at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`, keeping the
    /// default for unset variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_MAX_CONNECTIONS` is not a number.
    pub fn from_env() -> Result<Self, OptionsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        if let Some(url) = lookup("DATABASE_URL") {
            options.url = url;
        }
        if let Some(value) = lookup("DATABASE_MAX_CONNECTIONS") {
            let n = value.trim().parse().map_err(|_| OptionsError {
                name: "DATABASE_MAX_CONNECTIONS",
                value,
            })?;
            options.max_connections = Some(n);
        }
        Ok(options)
    }

    #[must_use]
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = Some(n);
        self
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// The effective pool size.
    #[must_use]
    pub fn pool_size(&self) -> u32 {
        match self.max_connections {
            Some(n) => n.max(1),
            None if self.is_memory() => 1,
            None => DEFAULT_POOL_SIZE,
        }
    }

    /// Opens a pool.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the URL is invalid or the database
    /// cannot be opened.
    pub async fn connect(&self) -> Result<SqlitePool, sqlx::Error> {
        let connect = SqliteConnectOptions::from_str(&self.url)?
            .create_if_missing(self.create_if_missing)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .foreign_keys(self.foreign_keys);
        let mut pool = SqlitePoolOptions::new().max_connections(self.pool_size());
        if self.is_memory() {
            // Closing the last connection drops the database.
            pool = pool.min_connections(1).idle_timeout(None).max_lifetime(None);
        }
        pool.connect_with(connect).await
    }
}
