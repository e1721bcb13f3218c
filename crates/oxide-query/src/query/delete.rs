//! DELETE statements.

use std::marker::PhantomData;

use crate::command::CommandBuilder;
use crate::compile::{compile_expr, CompileContext};
use crate::entity::{Entity, EntityRef};
use crate::error::CompileError;
use crate::expr::{Expr, Predicate};

use super::update::key_column;
use super::{property_value, table_scope, Operation, PropertyValues};

/// Deletes the rows matching a WHERE clause; all rows without one.
pub struct Delete<E> {
    where_: Option<Expr>,
    /// Key value of the entity deleted by [`Delete::for_entity`].
    entity: Option<PropertyValues>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for Delete<E> {
    fn clone(&self) -> Self {
        Self {
            where_: self.where_.clone(),
            entity: self.entity.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Default for Delete<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Delete<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            where_: None,
            entity: None,
            _marker: PhantomData,
        }
    }

    /// Deletes the row with `entity`'s primary key. Compiling fails with
    /// [`CompileError::MissingPrimaryKey`] if `E` declares no primary key.
    #[must_use]
    pub fn for_entity(entity: &E) -> Self {
        Self {
            entity: Some(entity.values()),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn where_clause(mut self, predicate: impl Into<Predicate>) -> Self {
        if let Some(expr) = predicate.into().into_expr() {
            self.where_ = Some(match self.where_.take() {
                Some(existing) => existing.and(expr),
                None => expr,
            });
        }
        self
    }
}

impl<E: Entity> Operation for Delete<E> {
    fn emit(&self, ctx: &CompileContext<'_>, out: &mut CommandBuilder) -> Result<(), CompileError> {
        let entity = EntityRef::of::<E>();
        let descriptor = ctx.descriptor(entity);
        let mut where_ = self.where_.clone();
        if let Some(values) = &self.entity {
            let pk = descriptor
                .primary_key()
                .ok_or_else(|| CompileError::MissingPrimaryKey {
                    entity: descriptor.type_name.to_string(),
                })?;
            let key = key_column::<E>(pk.property)
                .eq(Expr::Constant(property_value(values, pk.property)));
            where_ = Some(match where_ {
                Some(existing) => key.and(existing),
                None => key,
            });
        }

        out.text("DELETE FROM")
            .text(ctx.dialect.quote_identifier(&descriptor.table));
        if let Some(where_) = &where_ {
            let scope = table_scope(entity, &descriptor);
            out.text("WHERE");
            compile_expr(where_, ctx, &scope, out)?;
        }
        Ok(())
    }
}
