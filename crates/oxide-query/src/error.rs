//! Error types.

use std::fmt;

use thiserror::Error;

use crate::value::SqlValue;

/// Errors raised while compiling an expression or assembling a statement.
///
/// These are programmer errors: the same input always fails the same way.
#[derive(Debug, Error)]
pub enum CompileError {
    /// An operator or call form with no SQL translation.
    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String },

    /// A captured value that was required to be present was absent.
    #[error("null reference: `{member}` has no value")]
    NullReference { member: String },

    /// An unaliased column matched more than one source of the operation.
    #[error("ambiguous column `{column}`, candidates: {}", .candidates.join(", "))]
    AmbiguousColumn {
        column: String,
        candidates: Vec<String>,
    },

    /// A property with no mapped column.
    #[error("unknown column `{property}` on entity `{entity}`")]
    UnknownColumn { entity: String, property: String },

    /// A column referenced an alias that is not in scope.
    #[error("unknown alias `{alias}`")]
    UnknownAlias { alias: String },

    /// A column belongs to an entity that is not a source of the operation.
    #[error("entity `{entity}` is not a source of this operation")]
    UnboundSource { entity: String },

    /// Execution-time arguments did not match the deferred parameter slots.
    #[error("expected {expected} deferred parameter(s), got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    /// Host-side array indexing went past the end of the array.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// An entity-keyed operation on an entity without a primary key.
    #[error("entity `{entity}` has no primary key")]
    MissingPrimaryKey { entity: String },

    /// An insert with no rows.
    #[error("insert into `{entity}` has no rows")]
    EmptyInsert { entity: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl CompileError {
    pub(crate) fn unsupported(construct: impl Into<String>) -> Self {
        Self::Unsupported {
            construct: construct.into(),
        }
    }
}

/// A column value that could not be coerced into the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "cannot convert {found} value into {expected}{}",
    .column.as_ref().map(|c| format!(" for column `{c}`")).unwrap_or_default()
)]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
    pub column: Option<String>,
}

impl ConversionError {
    /// Creates an error for `value` not converting into `expected`.
    #[must_use]
    pub fn new(expected: &'static str, value: &SqlValue) -> Self {
        Self {
            expected,
            found: value.kind(),
            column: None,
        }
    }

    /// Attaches the column the value was read from.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// A driver error, passed through from the connection provider unmodified.
///
/// `Display` and `source()` delegate to the driver error.
#[derive(Debug)]
pub struct ExecError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl ExecError {
    /// Wraps a driver error.
    pub fn driver<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }

    /// Returns the driver error if it is of type `E`.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Unwraps the boxed driver error.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self.0
    }
}

/// Errors raised while reconciling a live table with its entity.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("cannot read schema of `{table}`: {source}")]
    Unreadable {
        table: String,
        #[source]
        source: ExecError,
    },

    #[error("cannot parse schema of `{table}`: {detail}")]
    Unparseable { table: String, detail: String },

    /// The name is taken by an object of another kind (table vs view).
    #[error("`{name}` exists as a {found}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A statement of the table-recreation sequence failed; the
    /// transaction was rolled back.
    #[error("recreating `{table}` failed: {source}")]
    Recreate {
        table: String,
        #[source]
        source: ExecError,
    },

    #[error("applying schema change to `{table}` failed: {source}")]
    Apply {
        table: String,
        #[source]
        source: ExecError,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Top-level error for executing operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Execution(#[from] ExecError),
}

/// Result type alias for operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_message_names_column() {
        let err = ConversionError::new("integer", &SqlValue::Blob(vec![1])).with_column("age");
        assert_eq!(
            err.to_string(),
            "cannot convert blob value into integer for column `age`"
        );
    }

    #[test]
    fn test_exec_error_downcast() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = ExecError::driver(io);
        assert_eq!(err.to_string(), "disk gone");
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_ambiguous_lists_candidates() {
        let err = CompileError::AmbiguousColumn {
            column: String::from("id"),
            candidates: vec![String::from("a"), String::from("b")],
        };
        assert_eq!(err.to_string(), "ambiguous column `id`, candidates: a, b");
    }
}
