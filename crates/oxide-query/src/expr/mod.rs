//! Typed expression trees.
//!
//! An [`Expr`] is an immutable tree over constants, column references,
//! deferred parameters, operators, calls, arrays and sub-queries. Trees are
//! usually built through [`Field`] accessors and the `&`, `|` and `!`
//! operators, then handed to the compiler by a query operation.

mod field;

use std::fmt;
use std::ops::{Add, BitAnd, BitAndAssign, BitOr, BitOrAssign, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;

pub use field::{Field, Ordering, Predicate};

use crate::dialect::SqlFunction;
use crate::entity::EntityRef;
use crate::query::select::SelectSpec;
use crate::value::{SqlValue, ToSqlValue};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }

    /// Whether `a op (b op c)` may drop its parentheses.
    #[must_use]
    pub const fn is_associative(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl UnaryOp {
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Not => 3,
            Self::Negate => 7,
        }
    }
}

/// Aggregates rendered the same way by every dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// A call form.
#[derive(Debug, Clone)]
pub enum Function {
    /// `collection.contains(item)`; arguments are `[collection, item]`.
    Contains,
    /// A function whose syntax is supplied by the dialect.
    Sql(SqlFunction),
    Aggregate(Aggregate),
    /// Any other call: evaluated on the host and bound as a constant.
    Host(HostFn),
}

/// A host-side function evaluated at compile time.
#[derive(Clone)]
pub struct HostFn {
    pub name: String,
    eval: Arc<dyn Fn(&[SqlValue]) -> SqlValue + Send + Sync>,
}

impl HostFn {
    pub fn new<F>(name: impl Into<String>, eval: F) -> Self
    where
        F: Fn(&[SqlValue]) -> SqlValue + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            eval: Arc::new(eval),
        }
    }

    #[must_use]
    pub fn call(&self, args: &[SqlValue]) -> SqlValue {
        (self.eval)(args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostFn").field(&self.name).finish()
    }
}

/// A closed-over host value, read when the expression is compiled.
///
/// Reading `None` means the value's owner was absent and compilation
/// fails with a null-reference error naming `name`.
#[derive(Clone)]
pub struct Captured {
    pub name: String,
    read: Arc<dyn Fn() -> Option<SqlValue> + Send + Sync>,
}

impl Captured {
    #[must_use]
    pub fn read(&self) -> Option<SqlValue> {
        (self.read)()
    }
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Captured").field(&self.name).finish()
    }
}

/// A reference to a mapped property, optionally pinned to an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub entity: EntityRef,
    pub property: &'static str,
    pub alias: Option<String>,
}

/// An expression tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant(SqlValue),
    Column(ColumnRef),
    /// Deferred parameter: the value is the n-th execution-time argument.
    Param(usize),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
    /// A new array built from element expressions.
    Array(Vec<Expr>),
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Captured(Captured),
    SubQuery(Arc<SelectSpec>),
}

impl Expr {
    pub fn constant(value: impl ToSqlValue) -> Self {
        Self::Constant(value.to_sql_value())
    }

    #[must_use]
    pub const fn param(slot: usize) -> Self {
        Self::Param(slot)
    }

    /// A closed-over value read at compile time.
    pub fn captured<F>(name: impl Into<String>, read: F) -> Self
    where
        F: Fn() -> Option<SqlValue> + Send + Sync + 'static,
    {
        Self::Captured(Captured {
            name: name.into(),
            read: Arc::new(read),
        })
    }

    /// A host function call evaluated at compile time.
    pub fn host_call<F>(name: impl Into<String>, args: Vec<Self>, eval: F) -> Self
    where
        F: Fn(&[SqlValue]) -> SqlValue + Send + Sync + 'static,
    {
        Self::Call {
            func: Function::Host(HostFn::new(name, eval)),
            args,
        }
    }

    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        Self::Array(items.into_iter().collect())
    }

    #[must_use]
    pub fn index(self, index: Self) -> Self {
        Self::Index {
            array: Box::new(self),
            index: Box::new(index),
        }
    }

    #[must_use]
    pub fn sub_query(spec: SelectSpec) -> Self {
        Self::SubQuery(Arc::new(spec))
    }

    #[must_use]
    pub fn binary(self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn and(self, right: Self) -> Self {
        self.binary(BinaryOp::And, right)
    }

    #[must_use]
    pub fn or(self, right: Self) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    #[must_use]
    pub fn eq(self, right: Self) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    #[must_use]
    pub fn ne(self, right: Self) -> Self {
        self.binary(BinaryOp::NotEq, right)
    }

    #[must_use]
    pub fn lt(self, right: Self) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    #[must_use]
    pub fn le(self, right: Self) -> Self {
        self.binary(BinaryOp::LtEq, right)
    }

    #[must_use]
    pub fn gt(self, right: Self) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    #[must_use]
    pub fn ge(self, right: Self) -> Self {
        self.binary(BinaryOp::GtEq, right)
    }

    /// `self` contains `item`; `self` must be a collection.
    #[must_use]
    pub fn contains(self, item: Self) -> Self {
        Self::Call {
            func: Function::Contains,
            args: vec![self, item],
        }
    }

    #[must_use]
    pub fn sql_call(func: SqlFunction, args: Vec<Self>) -> Self {
        Self::Call {
            func: Function::Sql(func),
            args,
        }
    }

    #[must_use]
    pub fn like(self, pattern: Self) -> Self {
        Self::sql_call(SqlFunction::Like, vec![self, pattern])
    }

    #[must_use]
    pub fn upper(self) -> Self {
        Self::sql_call(SqlFunction::Upper, vec![self])
    }

    #[must_use]
    pub fn lower(self) -> Self {
        Self::sql_call(SqlFunction::Lower, vec![self])
    }

    #[must_use]
    pub fn length(self) -> Self {
        Self::sql_call(SqlFunction::Length, vec![self])
    }

    #[must_use]
    pub fn replace(self, from: Self, to: Self) -> Self {
        Self::sql_call(SqlFunction::Replace, vec![self, from, to])
    }

    /// `COUNT(*)`.
    #[must_use]
    pub fn count_all() -> Self {
        Self::sql_call(SqlFunction::Count, Vec::new())
    }

    #[must_use]
    pub fn random() -> Self {
        Self::sql_call(SqlFunction::Random, Vec::new())
    }

    /// The dialect's physical row identity.
    #[must_use]
    pub fn row_id() -> Self {
        Self::sql_call(SqlFunction::RowId, Vec::new())
    }

    #[must_use]
    pub fn aggregate(self, aggregate: Aggregate) -> Self {
        Self::Call {
            func: Function::Aggregate(aggregate),
            args: vec![self],
        }
    }

    /// Node kind, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::Column(_) => "column",
            Self::Param(_) => "parameter",
            Self::Binary { .. } => "binary operator",
            Self::Unary { .. } => "unary operator",
            Self::Call { .. } => "call",
            Self::Array(_) => "array",
            Self::Index { .. } => "array index",
            Self::Captured(_) => "captured value",
            Self::SubQuery(_) => "sub-query",
        }
    }
}

impl BitAnd for Expr {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Expr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl BitAndAssign for Expr {
    fn bitand_assign(&mut self, rhs: Self) {
        let left = std::mem::replace(self, Self::Constant(SqlValue::Null));
        *self = left.and(rhs);
    }
}

impl BitOrAssign for Expr {
    fn bitor_assign(&mut self, rhs: Self) {
        let left = std::mem::replace(self, Self::Constant(SqlValue::Null));
        *self = left.or(rhs);
    }
}

impl Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self {
        Self::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }
}

macro_rules! impl_arith {
    ($($trait:ident :: $method:ident => $op:ident),*) => {
        $(
            impl $trait for Expr {
                type Output = Self;

                fn $method(self, rhs: Self) -> Self {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

impl_arith!(Add::add => Add, Sub::sub => Sub, Mul::mul => Mul, Div::div => Div, Rem::rem => Rem);
