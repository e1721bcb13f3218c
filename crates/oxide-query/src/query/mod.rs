//! Statement builders.
//!
//! Each builder assembles one statement over entity descriptors and the
//! expression compiler. Builders are copy-on-extend: a refinement returns a
//! new builder and never changes a value handed out earlier, so a base
//! query can be shared and specialized freely.
//!
//! ```ignore
//! let big = Select::<Sample>::new().where_clause(Sample::integer().gt(50));
//! let first = big.clone().order_by(Sample::id()).limit(1);
//! let prepared = first.prepare(&SqliteDialect::new())?;
//! ```

mod delete;
mod insert;
pub(crate) mod select;
mod update;

pub use delete::Delete;
pub use insert::Insert;
pub use select::{Join, JoinKind, Paging, Projection, Select, SelectSpec};
pub use update::Update;

use crate::command::{CommandBuilder, PreparedOperation};
use crate::compile::{CompileContext, Scope, Source};
use crate::dialect::Dialect;
use crate::entity::{EntityDescriptor, EntityRef, EntityRegistry};
use crate::error::CompileError;
use crate::value::SqlValue;

/// Property values captured from one entity.
pub(crate) type PropertyValues = Vec<(&'static str, SqlValue)>;

/// The captured value of `property`, `NULL` if it was not captured.
pub(crate) fn property_value(values: &PropertyValues, property: &str) -> SqlValue {
    values
        .iter()
        .find(|(p, _)| *p == property)
        .map_or(SqlValue::Null, |(_, v)| v.clone())
}

/// A statement that can be compiled into a [`PreparedOperation`].
pub trait Operation {
    /// Appends the statement's tokens to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if any part of the statement cannot be
    /// translated.
    fn emit(&self, ctx: &CompileContext<'_>, out: &mut CommandBuilder) -> Result<(), CompileError>;

    /// Compiles against the process-wide entity registry.
    ///
    /// # Errors
    ///
    /// See [`Operation::emit`].
    fn prepare(&self, dialect: &dyn Dialect) -> Result<PreparedOperation, CompileError> {
        self.prepare_with(dialect, EntityRegistry::global())
    }

    /// Compiles against an explicit registry.
    ///
    /// # Errors
    ///
    /// See [`Operation::emit`].
    fn prepare_with(
        &self,
        dialect: &dyn Dialect,
        registry: &EntityRegistry,
    ) -> Result<PreparedOperation, CompileError> {
        let ctx = CompileContext::new(dialect, registry);
        let mut out = CommandBuilder::new();
        self.emit(&ctx, &mut out)?;
        Ok(out.finalize(dialect))
    }
}

/// The unqualified scope of a single-table statement.
fn table_scope(entity: EntityRef, descriptor: &std::sync::Arc<EntityDescriptor>) -> Scope<'static> {
    Scope::single(Source {
        alias: descriptor.table.clone(),
        entity,
        descriptor: std::sync::Arc::clone(descriptor),
    })
}
