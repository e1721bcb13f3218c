//! INSERT statements.

use std::marker::PhantomData;

use crate::command::{CommandBuilder, Statement};
use crate::compile::CompileContext;
use crate::dialect::{Dialect, IdRetrieval};
use crate::entity::{Entity, EntityRef, EntityRegistry};
use crate::error::CompileError;

use super::{property_value, Operation, PropertyValues};

/// Inserts one or more entities.
///
/// Every insertable column (all but autoincrement keys) is written, in
/// declaration order.
pub struct Insert<E> {
    rows: Vec<PropertyValues>,
    returning_id: bool,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for Insert<E> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            returning_id: self.returning_id,
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Default for Insert<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Insert<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            returning_id: false,
            _marker: PhantomData,
        }
    }

    /// Adds one row.
    #[must_use]
    pub fn value(mut self, entity: &E) -> Self {
        self.rows.push(entity.values());
        self
    }

    /// Adds a row per entity.
    #[must_use]
    pub fn values(mut self, entities: &[E]) -> Self {
        self.rows.extend(entities.iter().map(E::values));
        self
    }

    /// Retrieves a generated primary key. For a multi-row insert, which
    /// row's key is read depends on the dialect: Postgres returns one key
    /// per row and the first is read; SQLite and SQL Server report the last.
    #[must_use]
    pub fn returning_id(mut self) -> Self {
        self.returning_id = true;
        self
    }

    #[must_use]
    pub const fn is_returning_id(&self) -> bool {
        self.returning_id
    }

    /// The statement that reads the generated key, for dialects that
    /// retrieve it with a separate query on the same connection.
    #[must_use]
    pub fn follow_up(&self, dialect: &dyn Dialect, registry: &EntityRegistry) -> Option<Statement> {
        if !self.returning_id {
            return None;
        }
        match id_retrieval(dialect, registry, EntityRef::of::<E>()) {
            Some(IdRetrieval::FollowUp(sql)) => Some(Statement::new(sql)),
            _ => None,
        }
    }
}

fn id_retrieval(dialect: &dyn Dialect, registry: &EntityRegistry, entity: EntityRef) -> Option<IdRetrieval> {
    let descriptor = registry.resolve(entity);
    descriptor.primary_key().map(|pk| dialect.insert_id(&pk.name))
}

impl<E: Entity> Operation for Insert<E> {
    fn emit(&self, ctx: &CompileContext<'_>, out: &mut CommandBuilder) -> Result<(), CompileError> {
        let entity = EntityRef::of::<E>();
        let descriptor = ctx.descriptor(entity);
        if self.rows.is_empty() {
            return Err(CompileError::EmptyInsert {
                entity: descriptor.type_name.to_string(),
            });
        }
        let dialect = ctx.dialect;
        let columns: Vec<_> = descriptor.insertable().collect();

        out.text("INSERT INTO")
            .text(dialect.quote_identifier(&descriptor.table))
            .text("(");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                out.separator();
            }
            out.text(dialect.quote_identifier(&column.name));
        }
        out.text(")").text("VALUES");

        for (r, row) in self.rows.iter().enumerate() {
            if r > 0 {
                out.separator();
            }
            out.text("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    out.separator();
                }
                out.param(property_value(row, column.property));
            }
            out.text(")");
        }

        if self.returning_id {
            match id_retrieval(dialect, ctx.registry, entity) {
                Some(IdRetrieval::Suffix(suffix)) => {
                    out.text(suffix);
                }
                Some(IdRetrieval::FollowUp(_)) => {}
                None => {
                    return Err(CompileError::MissingPrimaryKey {
                        entity: descriptor.type_name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
