//! Expression compiler.
//!
//! [`compile_expr`] walks an [`Expr`] tree and appends the equivalent SQL
//! tokens to a [`CommandBuilder`]. Column references are resolved against a
//! [`Scope`]: the sources (root entity, joins) of the statement being built,
//! layered over the scopes of any enclosing statements so correlated
//! sub-queries can reach outer sources.
//!
//! Anything without a SQL translation (host calls, captured values, array
//! construction and indexing) is evaluated on the host and bound as a
//! constant parameter.

use std::sync::Arc;

use crate::command::{CommandBuilder, Fragment};
use crate::dialect::Dialect;
use crate::entity::{EntityDescriptor, EntityRef, EntityRegistry};
use crate::error::CompileError;
use crate::expr::{BinaryOp, ColumnRef, Expr, Function, UnaryOp};
use crate::value::SqlValue;

/// Everything compilation needs besides the expression itself.
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    pub dialect: &'a dyn Dialect,
    pub registry: &'a EntityRegistry,
}

impl<'a> CompileContext<'a> {
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect, registry: &'a EntityRegistry) -> Self {
        Self { dialect, registry }
    }

    #[must_use]
    pub fn descriptor(&self, entity: EntityRef) -> Arc<EntityDescriptor> {
        self.registry.resolve(entity)
    }
}

/// A row source of a statement: the root entity or a join.
#[derive(Debug, Clone)]
pub struct Source {
    pub alias: String,
    pub entity: EntityRef,
    pub descriptor: Arc<EntityDescriptor>,
}

/// The sources visible while compiling one statement.
#[derive(Debug)]
pub struct Scope<'a> {
    sources: Vec<Source>,
    /// Whether columns are written `alias.column`. Single-table statements
    /// use bare column names.
    qualified: bool,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    #[must_use]
    pub fn new(qualified: bool, parent: Option<&'a Scope<'a>>) -> Self {
        Self {
            sources: Vec::new(),
            qualified,
            parent,
        }
    }

    /// A scope over a single unqualified source.
    #[must_use]
    pub fn single(source: Source) -> Self {
        let mut scope = Self::new(false, None);
        scope.push(source);
        scope
    }

    pub fn push(&mut self, source: Source) {
        self.sources.push(source);
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    #[must_use]
    pub const fn is_qualified(&self) -> bool {
        self.qualified
    }

    /// Renders the column prefix for `source` as seen from an inner scope
    /// `depth` levels down.
    fn prefix(&self, source: &Source, depth: usize, dialect: &dyn Dialect) -> Option<String> {
        if self.qualified {
            Some(source.alias.clone())
        } else if depth > 0 {
            Some(dialect.quote_identifier(&source.descriptor.table))
        } else {
            None
        }
    }
}

/// Binding strength of a node; leaves never need parentheses.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { op, .. } => op.precedence(),
        _ => u8::MAX,
    }
}

/// Compiles `expr`, appending its tokens to `out`.
///
/// # Errors
///
/// Returns [`CompileError`] naming the construct, column or alias that
/// could not be translated.
pub fn compile_expr(
    expr: &Expr,
    ctx: &CompileContext<'_>,
    scope: &Scope<'_>,
    out: &mut CommandBuilder,
) -> Result<(), CompileError> {
    match expr {
        Expr::Constant(value) => {
            out.param(value.clone());
        }
        Expr::Param(slot) => {
            out.deferred(*slot);
        }
        Expr::Column(column) => {
            out.text(resolve_column(column, ctx, scope)?);
        }
        Expr::Binary { op, left, right } => compile_binary(*op, left, right, ctx, scope, out)?,
        Expr::Unary { op, operand } => {
            out.text(match op {
                UnaryOp::Not => "NOT",
                UnaryOp::Negate => "-",
            });
            compile_operand(operand, op.precedence(), ctx, scope, out)?;
        }
        Expr::Call { func, args } => compile_call(func, args, ctx, scope, out)?,
        Expr::SubQuery(spec) => {
            out.text("(");
            spec.emit(ctx, Some(scope), out)?;
            out.text(")");
        }
        Expr::Array(_) | Expr::Index { .. } | Expr::Captured(_) => {
            out.param(evaluate(expr)?);
        }
    }
    Ok(())
}

/// Compiles `expr` into its own fragment.
fn fragment(expr: &Expr, ctx: &CompileContext<'_>, scope: &Scope<'_>) -> Result<CommandBuilder, CompileError> {
    let mut out = CommandBuilder::new();
    compile_expr(expr, ctx, scope, &mut out)?;
    Ok(out)
}

/// Compiles a child, parenthesized when it binds looser than `min`.
fn compile_operand(
    expr: &Expr,
    min: u8,
    ctx: &CompileContext<'_>,
    scope: &Scope<'_>,
    out: &mut CommandBuilder,
) -> Result<(), CompileError> {
    if precedence(expr) < min {
        out.text("(");
        compile_expr(expr, ctx, scope, out)?;
        out.text(")");
        Ok(())
    } else {
        compile_expr(expr, ctx, scope, out)
    }
}

fn compile_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &CompileContext<'_>,
    scope: &Scope<'_>,
    out: &mut CommandBuilder,
) -> Result<(), CompileError> {
    let prec = op.precedence();
    // `a - (b - c)` keeps its parentheses, `a AND (b AND c)` does not.
    let right_min = if op.is_associative() { prec } else { prec + 1 };

    let mut lhs = CommandBuilder::new();
    compile_operand(left, prec, ctx, scope, &mut lhs)?;
    let mut rhs = CommandBuilder::new();
    compile_operand(right, right_min, ctx, scope, &mut rhs)?;

    // The operator is only chosen once both sides are known: comparing
    // with a NULL literal becomes IS [NOT] NULL.
    if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
        let null_check = if op == BinaryOp::Eq { "IS NULL" } else { "IS NOT NULL" };
        if rhs.is_null_literal() {
            out.extend(lhs.into_tokens()).text(null_check);
            return Ok(());
        }
        if lhs.is_null_literal() {
            out.extend(rhs.into_tokens()).text(null_check);
            return Ok(());
        }
    }

    out.extend(lhs.into_tokens())
        .text(op.sql())
        .extend(rhs.into_tokens());
    Ok(())
}

fn compile_call(
    func: &Function,
    args: &[Expr],
    ctx: &CompileContext<'_>,
    scope: &Scope<'_>,
    out: &mut CommandBuilder,
) -> Result<(), CompileError> {
    match func {
        Function::Contains => {
            let [collection, item] = args else {
                return Err(CompileError::unsupported("contains without collection and item"));
            };
            compile_contains(collection, item, ctx, scope, out)
        }
        Function::Sql(sql_fn) => {
            let (min, max) = sql_fn.arity();
            if args.len() < min || args.len() > max {
                return Err(CompileError::unsupported(format!(
                    "{} with {} argument(s)",
                    sql_fn.name(),
                    args.len()
                )));
            }
            let fragments = args
                .iter()
                .map(|arg| {
                    let mut out = CommandBuilder::new();
                    // LIKE is infix; keep compound operands grouped.
                    compile_operand(arg, BinaryOp::Add.precedence(), ctx, scope, &mut out)?;
                    Ok(out.into_tokens())
                })
                .collect::<Result<Vec<Fragment>, CompileError>>()?;
            out.extend(ctx.dialect.function(*sql_fn, fragments));
            Ok(())
        }
        Function::Aggregate(aggregate) => {
            let [arg] = args else {
                return Err(CompileError::unsupported(format!(
                    "{} with {} argument(s)",
                    aggregate.sql(),
                    args.len()
                )));
            };
            out.text(format!("{}(", aggregate.sql()));
            compile_expr(arg, ctx, scope, out)?;
            out.text(")");
            Ok(())
        }
        Function::Host(_) => {
            out.param(evaluate_call(func, args)?);
            Ok(())
        }
    }
}

fn compile_contains(
    collection: &Expr,
    item: &Expr,
    ctx: &CompileContext<'_>,
    scope: &Scope<'_>,
    out: &mut CommandBuilder,
) -> Result<(), CompileError> {
    match collection {
        Expr::Array(elements) if elements.is_empty() => {
            out.text("1 = 0");
        }
        Expr::Array(elements) => {
            compile_operand(item, BinaryOp::Eq.precedence() + 1, ctx, scope, out)?;
            out.text("IN (");
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.separator();
                }
                compile_expr(element, ctx, scope, out)?;
            }
            out.text(")");
        }
        Expr::SubQuery(spec) => {
            compile_operand(item, BinaryOp::Eq.precedence() + 1, ctx, scope, out)?;
            out.text("IN (");
            spec.emit(ctx, Some(scope), out)?;
            out.text(")");
        }
        _ => {
            let SqlValue::Array(values) = evaluate(collection)? else {
                return Err(CompileError::unsupported(format!(
                    "contains over a {}",
                    collection.kind()
                )));
            };
            if values.is_empty() {
                out.text("1 = 0");
                return Ok(());
            }
            let mut lhs = CommandBuilder::new();
            compile_operand(item, BinaryOp::Eq.precedence() + 1, ctx, scope, &mut lhs)?;
            if ctx.dialect.supports_array_parameters() {
                out.extend(ctx.dialect.in_array(lhs.into_tokens(), SqlValue::Array(values)));
            } else {
                out.extend(lhs.into_tokens())
                    .text("IN (")
                    .param(SqlValue::Array(values))
                    .text(")");
            }
        }
    }
    Ok(())
}

fn resolve_column(
    column: &ColumnRef,
    ctx: &CompileContext<'_>,
    scope: &Scope<'_>,
) -> Result<String, CompileError> {
    let (level, source, depth) = match &column.alias {
        Some(alias) => find_alias(scope, alias)?,
        None => find_entity(scope, column)?,
    };

    let mapped = source
        .descriptor
        .column_by_property(column.property)
        .ok_or_else(|| CompileError::UnknownColumn {
            entity: source.descriptor.type_name.to_string(),
            property: column.property.to_string(),
        })?;
    let quoted = ctx.dialect.quote_identifier(&mapped.name);
    Ok(match level.prefix(source, depth, ctx.dialect) {
        Some(prefix) => format!("{prefix}.{quoted}"),
        None => quoted,
    })
}

type Resolved<'s, 'a> = (&'s Scope<'a>, &'s Source, usize);

fn find_alias<'s, 'a>(scope: &'s Scope<'a>, alias: &str) -> Result<Resolved<'s, 'a>, CompileError> {
    let mut level = Some(scope);
    let mut depth = 0;
    while let Some(current) = level {
        if let Some(source) = current.sources.iter().find(|s| s.alias == alias) {
            return Ok((current, source, depth));
        }
        level = current.parent;
        depth += 1;
    }
    Err(CompileError::UnknownAlias {
        alias: alias.to_string(),
    })
}

/// Finds the innermost level with a source of the column's entity. More
/// than one such source on that level needs an explicit alias.
fn find_entity<'s, 'a>(scope: &'s Scope<'a>, column: &ColumnRef) -> Result<Resolved<'s, 'a>, CompileError> {
    let mut level = Some(scope);
    let mut depth = 0;
    while let Some(current) = level {
        let mut matches = current.sources.iter().filter(|s| s.entity == column.entity);
        if let Some(first) = matches.next() {
            let rest: Vec<&Source> = matches.collect();
            if rest.is_empty() {
                return Ok((current, first, depth));
            }
            return Err(CompileError::AmbiguousColumn {
                column: column.property.to_string(),
                candidates: std::iter::once(first)
                    .chain(rest)
                    .map(|s| s.alias.clone())
                    .collect(),
            });
        }
        level = current.parent;
        depth += 1;
    }
    Err(CompileError::UnboundSource {
        entity: column.entity.name().to_string(),
    })
}

// ================================================================
// Host-side evaluation
// ================================================================

/// Evaluates a host-only expression to a value.
fn evaluate(expr: &Expr) -> Result<SqlValue, CompileError> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Captured(captured) => captured.read().ok_or_else(|| CompileError::NullReference {
            member: captured.name.clone(),
        }),
        Expr::Array(items) => items
            .iter()
            .map(evaluate)
            .collect::<Result<Vec<_>, _>>()
            .map(SqlValue::Array),
        Expr::Index { array, index } => {
            let SqlValue::Array(items) = evaluate(array)? else {
                return Err(CompileError::unsupported(format!(
                    "indexing a {}",
                    array.kind()
                )));
            };
            let SqlValue::Int(position) = evaluate(index)? else {
                return Err(CompileError::unsupported("non-integer array index"));
            };
            usize::try_from(position)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .ok_or(CompileError::IndexOutOfRange {
                    index: position,
                    len: items.len(),
                })
        }
        Expr::Unary {
            op: UnaryOp::Negate,
            operand,
        } => match evaluate(operand)? {
            SqlValue::Int(n) => Ok(SqlValue::Int(-n)),
            SqlValue::Float(f) => Ok(SqlValue::Float(-f)),
            other => Err(CompileError::unsupported(format!(
                "negating a {} value",
                other.kind()
            ))),
        },
        Expr::Call { func, args } => evaluate_call(func, args),
        other => Err(CompileError::unsupported(format!(
            "{} in a host-evaluated position",
            other.kind()
        ))),
    }
}

fn evaluate_call(func: &Function, args: &[Expr]) -> Result<SqlValue, CompileError> {
    let Function::Host(host) = func else {
        return Err(CompileError::unsupported(
            "SQL function in a host-evaluated position",
        ));
    };
    let values = args.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?;
    Ok(host.call(&values))
}
