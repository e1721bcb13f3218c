//! UPDATE statements.

use std::marker::PhantomData;

use crate::command::CommandBuilder;
use crate::compile::{compile_expr, CompileContext};
use crate::entity::{Entity, EntityRef};
use crate::error::CompileError;
use crate::expr::{ColumnRef, Expr, Field, Predicate};
use crate::value::ToSqlValue;

use super::{property_value, table_scope, Operation, PropertyValues};

/// Assignments plus an optional WHERE clause.
pub struct Update<E> {
    assignments: Vec<(&'static str, Expr)>,
    where_: Option<Expr>,
    /// Values of the entity written by [`Update::for_entity`].
    entity: Option<PropertyValues>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for Update<E> {
    fn clone(&self) -> Self {
        Self {
            assignments: self.assignments.clone(),
            where_: self.where_.clone(),
            entity: self.entity.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Default for Update<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Update<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
            where_: None,
            entity: None,
            _marker: PhantomData,
        }
    }

    /// Writes every column of `entity` except the key, matching on the
    /// key's current value. Compiling fails with
    /// [`CompileError::MissingPrimaryKey`] if `E` declares no primary key.
    #[must_use]
    pub fn for_entity(entity: &E) -> Self {
        Self {
            entity: Some(entity.values()),
            ..Self::new()
        }
    }
}

impl<E> Update<E> {
    #[must_use]
    pub fn set<T: ToSqlValue>(mut self, field: Field<E, T>, value: impl Into<T>) -> Self {
        self.assignments
            .push((field.column().property, Expr::constant(value.into())));
        self
    }

    /// Assigns an arbitrary expression, e.g. `integer = integer + 1`.
    #[must_use]
    pub fn set_expr<T>(mut self, field: Field<E, T>, expr: impl Into<Expr>) -> Self {
        self.assignments.push((field.column().property, expr.into()));
        self
    }

    /// ANDs `predicate` onto the WHERE clause.
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

pub(super) fn key_column<E: Entity>(property: &'static str) -> Expr {
    Expr::Column(ColumnRef {
        entity: EntityRef::of::<E>(),
        property,
        alias: None,
    })
}

impl<E: Entity> Operation for Update<E> {
    fn emit(&self, ctx: &CompileContext<'_>, out: &mut CommandBuilder) -> Result<(), CompileError> {
        let entity = EntityRef::of::<E>();
        let descriptor = ctx.descriptor(entity);
        let mut assignments = Vec::new();
        let mut where_ = self.where_.clone();
        if let Some(values) = &self.entity {
            let pk = descriptor
                .primary_key()
                .ok_or_else(|| CompileError::MissingPrimaryKey {
                    entity: descriptor.type_name.to_string(),
                })?;
            for column in descriptor.columns.iter().filter(|c| !c.flags.primary_key) {
                let value = Expr::Constant(property_value(values, column.property));
                assignments.push((column.property, value));
            }
            let key = key_column::<E>(pk.property).eq(Expr::Constant(property_value(values, pk.property)));
            where_ = Some(match where_ {
                Some(existing) => key.and(existing),
                None => key,
            });
        }
        assignments.extend(self.assignments.iter().cloned());
        if assignments.is_empty() {
            return Err(CompileError::unsupported("update without assignments"));
        }
        let scope = table_scope(entity, &descriptor);

        out.text("UPDATE")
            .text(ctx.dialect.quote_identifier(&descriptor.table))
            .text("SET");
        for (i, (property, expr)) in assignments.iter().enumerate() {
            if i > 0 {
                out.separator();
            }
            let column = descriptor.column_by_property(property).ok_or_else(|| {
                CompileError::UnknownColumn {
                    entity: descriptor.type_name.to_string(),
                    property: (*property).to_string(),
                }
            })?;
            out.text(ctx.dialect.quote_identifier(&column.name)).text("=");
            compile_expr(expr, ctx, &scope, out)?;
        }

        if let Some(where_) = &where_ {
            out.text("WHERE");
            compile_expr(where_, ctx, &scope, out)?;
        }
        Ok(())
    }
}
