//! Schema migration: introspect, diff, render.
//!
//! The flow per entity is:
//!
//! 1. The dialect introspects the live object into a [`TableDescriptor`],
//!    or reports that it does not exist.
//! 2. [`plan_table`] diffs it against the [`EntityDescriptor`] and picks a
//!    [`Strategy`].
//! 3. [`render_plan`] turns the plan into statements, which the executor
//!    runs in one transaction and reports as a [`SchemaUpdate`].

mod live;
pub mod parse;
mod plan;

use serde::Serialize;

pub use live::{LiveColumn, LiveIndex, LiveUnique, ObjectKind, TableDescriptor, UniqueSource};
pub use plan::{
    plan_table, CopySource, MigrationPlan, RecreateTable, SchemaChange, Strategy,
};

use crate::command::{CommandBuilder, Statement};
use crate::compile::CompileContext;
use crate::dialect::Dialect;
use crate::entity::{EntityDescriptor, EntityRegistry};
use crate::error::CompileError;

/// Renders a plan into executable statements.
#[must_use]
pub fn render_plan(plan: &MigrationPlan, dialect: &dyn Dialect) -> Vec<Statement> {
    plan.statements(dialect)
        .into_iter()
        .map(Statement::new)
        .collect()
}

/// Renders the defining query of a view entity with constants inlined, or
/// `None` for a table entity.
///
/// # Errors
///
/// Returns [`CompileError`] if the query does not compile or uses deferred
/// parameters.
pub fn view_definition(
    descriptor: &EntityDescriptor,
    dialect: &dyn Dialect,
    registry: &EntityRegistry,
) -> Result<Option<String>, CompileError> {
    let Some(select) = &descriptor.view else {
        return Ok(None);
    };
    let ctx = CompileContext::new(dialect, registry);
    let mut out = CommandBuilder::new();
    select.emit(&ctx, None, &mut out)?;
    out.render_inline(dialect).map(Some)
}

/// What a schema update did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaUpdate {
    pub table: String,
    pub strategy: Strategy,
    /// Statements executed, in order.
    pub statements: Vec<String>,
}

impl SchemaUpdate {
    /// True when the live schema already matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
