//! Typed field accessors and predicate accumulation.

use std::marker::PhantomData;
use std::ops::{BitAndAssign, BitOrAssign};

use super::{Aggregate, BinaryOp, ColumnRef, Expr};
use crate::entity::{Entity, EntityRef};
use crate::query::select::Select;
use crate::value::{SqlValue, ToSqlValue};

/// A typed reference to property `T` of entity `E`.
///
/// `#[derive(Entity)]` generates one associated function per field
/// returning a `Field`, e.g. `User::name()`.
pub struct Field<E, T> {
    column: ColumnRef,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Clone for Field<E, T> {
    fn clone(&self) -> Self {
        Self {
            column: self.column.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, T> std::fmt::Debug for Field<E, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Field").field(&self.column).finish()
    }
}

impl<E: Entity, T> Field<E, T> {
    #[must_use]
    pub fn new(property: &'static str) -> Self {
        Self {
            column: ColumnRef {
                entity: EntityRef::of::<E>(),
                property,
                alias: None,
            },
            _marker: PhantomData,
        }
    }
}

impl<E, T> Field<E, T> {
    /// Pins the field to the source registered under `alias`.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.column.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub const fn column(&self) -> &ColumnRef {
        &self.column
    }

    #[must_use]
    pub fn expr(&self) -> Expr {
        Expr::Column(self.column.clone())
    }

    #[must_use]
    pub fn is_null(self) -> Expr {
        self.expr().eq(Expr::Constant(SqlValue::Null))
    }

    #[must_use]
    pub fn is_not_null(self) -> Expr {
        self.expr().ne(Expr::Constant(SqlValue::Null))
    }

    /// Compares against any expression.
    #[must_use]
    pub fn compare(self, op: BinaryOp, right: impl Into<Expr>) -> Expr {
        self.expr().binary(op, right.into())
    }

    /// Compares against another field of the same type.
    #[must_use]
    pub fn eq_field<U>(self, other: Field<U, T>) -> Expr {
        self.expr().eq(other.expr())
    }

    #[must_use]
    pub fn in_query<U>(self, select: &Select<U>) -> Expr {
        Expr::sub_query(select.spec().clone()).contains(self.expr())
    }

    #[must_use]
    pub fn upper(self) -> Expr {
        self.expr().upper()
    }

    #[must_use]
    pub fn lower(self) -> Expr {
        self.expr().lower()
    }

    #[must_use]
    pub fn length(self) -> Expr {
        self.expr().length()
    }

    #[must_use]
    pub fn count(self) -> Expr {
        Expr::sql_call(crate::dialect::SqlFunction::Count, vec![self.expr()])
    }

    #[must_use]
    pub fn sum(self) -> Expr {
        self.expr().aggregate(Aggregate::Sum)
    }

    #[must_use]
    pub fn avg(self) -> Expr {
        self.expr().aggregate(Aggregate::Avg)
    }

    #[must_use]
    pub fn min(self) -> Expr {
        self.expr().aggregate(Aggregate::Min)
    }

    #[must_use]
    pub fn max(self) -> Expr {
        self.expr().aggregate(Aggregate::Max)
    }

    #[must_use]
    pub fn asc(self) -> Ordering {
        Ordering::asc(self.expr())
    }

    #[must_use]
    pub fn desc(self) -> Ordering {
        Ordering::desc(self.expr())
    }
}

impl<E, T: ToSqlValue> Field<E, T> {
    pub fn eq(self, value: impl Into<T>) -> Expr {
        self.expr().eq(Expr::constant(value.into()))
    }

    pub fn ne(self, value: impl Into<T>) -> Expr {
        self.expr().ne(Expr::constant(value.into()))
    }

    pub fn lt(self, value: impl Into<T>) -> Expr {
        self.expr().lt(Expr::constant(value.into()))
    }

    pub fn le(self, value: impl Into<T>) -> Expr {
        self.expr().le(Expr::constant(value.into()))
    }

    pub fn gt(self, value: impl Into<T>) -> Expr {
        self.expr().gt(Expr::constant(value.into()))
    }

    pub fn ge(self, value: impl Into<T>) -> Expr {
        self.expr().ge(Expr::constant(value.into()))
    }

    /// `field IN (...)` bound as one array parameter.
    pub fn is_in<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        let array = SqlValue::Array(
            values
                .into_iter()
                .map(|v| v.into().to_sql_value())
                .collect(),
        );
        Expr::Constant(array).contains(self.expr())
    }

    /// `field IN (a, b, ...)` with one parameter per element.
    pub fn in_list<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        Expr::array(values.into_iter().map(|v| Expr::constant(v.into()))).contains(self.expr())
    }
}

impl<E> Field<E, String> {
    pub fn like(self, pattern: impl Into<String>) -> Expr {
        self.expr().like(Expr::constant(pattern.into()))
    }
}

impl<E> Field<E, Option<String>> {
    pub fn like(self, pattern: impl Into<String>) -> Expr {
        self.expr().like(Expr::constant(pattern.into()))
    }
}

impl<E, T> From<Field<E, T>> for Expr {
    fn from(field: Field<E, T>) -> Self {
        field.expr()
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone)]
pub struct Ordering {
    pub expr: Expr,
    pub descending: bool,
}

impl Ordering {
    #[must_use]
    pub const fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    #[must_use]
    pub const fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

impl<E, T> From<Field<E, T>> for Ordering {
    fn from(field: Field<E, T>) -> Self {
        field.asc()
    }
}

impl From<Expr> for Ordering {
    fn from(expr: Expr) -> Self {
        Self::asc(expr)
    }
}

/// An accumulating predicate that starts empty.
///
/// `&=` and `|=` combine with what has been accumulated so far; on an
/// empty predicate they simply take the right-hand side.
#[derive(Debug, Clone, Default)]
pub struct Predicate(Option<Expr>);

impl Predicate {
    #[must_use]
    pub const fn new() -> Self {
        Self(None)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    #[must_use]
    pub const fn as_expr(&self) -> Option<&Expr> {
        self.0.as_ref()
    }

    #[must_use]
    pub fn into_expr(self) -> Option<Expr> {
        self.0
    }
}

impl BitAndAssign<Expr> for Predicate {
    fn bitand_assign(&mut self, rhs: Expr) {
        self.0 = Some(match self.0.take() {
            Some(left) => left.and(rhs),
            None => rhs,
        });
    }
}

impl BitOrAssign<Expr> for Predicate {
    fn bitor_assign(&mut self, rhs: Expr) {
        self.0 = Some(match self.0.take() {
            Some(left) => left.or(rhs),
            None => rhs,
        });
    }
}

impl From<Expr> for Predicate {
    fn from(expr: Expr) -> Self {
        Self(Some(expr))
    }
}

impl<E, T> From<Field<E, T>> for Predicate {
    fn from(field: Field<E, T>) -> Self {
        Self(Some(field.expr()))
    }
}
