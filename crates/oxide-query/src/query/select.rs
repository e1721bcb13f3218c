//! SELECT statements.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::command::CommandBuilder;
use crate::compile::{compile_expr, CompileContext, Scope, Source};
use crate::entity::{Entity, EntityRef};
use crate::error::CompileError;
use crate::expr::{ColumnRef, Expr, Ordering, Predicate};

use super::Operation;

/// Alias of the root source when none is given.
const ROOT_ALIAS: &str = "t0";

/// One output column.
#[derive(Debug, Clone)]
pub struct Projection {
    pub expr: Expr,
    /// Output name; needed when the select feeds another shape.
    pub alias: Option<String>,
}

impl From<Expr> for Projection {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

impl<E, T> From<crate::expr::Field<E, T>> for Projection {
    fn from(field: crate::expr::Field<E, T>) -> Self {
        Self {
            expr: field.expr(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// What a join reads from.
#[derive(Debug, Clone)]
pub(crate) enum JoinTarget {
    Entity(EntityRef),
    /// A sub-query whose rows have the shape of the given entity.
    Query(Arc<SelectSpec>, EntityRef),
}

impl JoinTarget {
    const fn entity(&self) -> EntityRef {
        match self {
            Self::Entity(entity) | Self::Query(_, entity) => *entity,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JoinSpec {
    kind: JoinKind,
    target: JoinTarget,
    alias: Option<String>,
    on: Expr,
    filter: Option<Expr>,
}

/// LIMIT/OFFSET, rendered by the dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Paging {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }
}

/// The untyped body of a select, shared by [`Select`] builders, join
/// targets, sub-queries and view definitions.
#[derive(Debug, Clone)]
pub struct SelectSpec {
    pub(crate) root: EntityRef,
    pub(crate) alias: Option<String>,
    pub(crate) distinct: bool,
    pub(crate) fields: Vec<Projection>,
    pub(crate) joins: Vec<JoinSpec>,
    pub(crate) where_: Option<Expr>,
    pub(crate) group_by: Vec<Expr>,
    pub(crate) having: Option<Expr>,
    pub(crate) order_by: Vec<Ordering>,
    pub(crate) paging: Paging,
    pub(crate) unions: Vec<Arc<SelectSpec>>,
}

impl SelectSpec {
    fn new(root: EntityRef) -> Self {
        Self {
            root,
            alias: None,
            distinct: false,
            fields: Vec::new(),
            joins: Vec::new(),
            where_: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            paging: Paging::default(),
            unions: Vec::new(),
        }
    }

    /// The entity the select reads from.
    #[must_use]
    pub const fn root(&self) -> EntityRef {
        self.root
    }

    /// Emits the full statement. `parent` is the scope of an enclosing
    /// statement when this select is a sub-query.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if any clause fails to compile.
    pub fn emit(
        &self,
        ctx: &CompileContext<'_>,
        parent: Option<&Scope<'_>>,
        out: &mut CommandBuilder,
    ) -> Result<(), CompileError> {
        let scope = self.scope(ctx, parent);
        self.emit_core(ctx, &scope, out)?;

        for (i, union) in self.unions.iter().enumerate() {
            out.text("UNION ALL");
            if union.order_by.is_empty() && union.paging.is_empty() {
                union.emit(ctx, parent, out)?;
            } else {
                // Ordering and paging of a branch bind to the branch only.
                out.text("SELECT * FROM (");
                union.emit(ctx, parent, out)?;
                out.text(")").text(format!("u{}", i + 1));
            }
        }

        let needs_order = !self.paging.is_empty() && ctx.dialect.paging_requires_order();
        if !self.order_by.is_empty() {
            out.text("ORDER BY");
            for (i, ordering) in self.order_by.iter().enumerate() {
                if i > 0 {
                    out.separator();
                }
                compile_expr(&ordering.expr, ctx, &scope, out)?;
                if ordering.descending {
                    out.text("DESC");
                }
            }
        } else if needs_order {
            out.text("ORDER BY").text(ctx.dialect.noop_ordering());
        }

        if let Some(paging) = ctx.dialect.paging(self.paging.limit, self.paging.offset) {
            out.text(paging);
        }
        Ok(())
    }

    /// Builds the source scope: the root, then each join in order.
    fn scope<'p>(&self, ctx: &CompileContext<'_>, parent: Option<&'p Scope<'p>>) -> Scope<'p> {
        let qualified = self.alias.is_some() || !self.joins.is_empty();
        let mut scope = Scope::new(qualified, parent);
        scope.push(Source {
            alias: self.root_alias().to_string(),
            entity: self.root,
            descriptor: ctx.descriptor(self.root),
        });
        for (i, join) in self.joins.iter().enumerate() {
            let entity = join.target.entity();
            scope.push(Source {
                alias: join
                    .alias
                    .clone()
                    .unwrap_or_else(|| format!("t{}", i + 1)),
                entity,
                descriptor: ctx.descriptor(entity),
            });
        }
        scope
    }

    fn root_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(ROOT_ALIAS)
    }

    /// SELECT ... FROM ... JOIN ... WHERE ... GROUP BY ... HAVING ...
    fn emit_core(
        &self,
        ctx: &CompileContext<'_>,
        scope: &Scope<'_>,
        out: &mut CommandBuilder,
    ) -> Result<(), CompileError> {
        let dialect = ctx.dialect;
        out.text(if self.distinct { "SELECT DISTINCT" } else { "SELECT" });

        if self.fields.is_empty() {
            let root = &scope.sources()[0];
            for (i, column) in root.descriptor.columns.iter().enumerate() {
                if i > 0 {
                    out.separator();
                }
                let expr = Expr::Column(ColumnRef {
                    entity: self.root,
                    property: column.property,
                    alias: Some(root.alias.clone()),
                });
                compile_expr(&expr, ctx, scope, out)?;
            }
        } else {
            for (i, field) in self.fields.iter().enumerate() {
                if i > 0 {
                    out.separator();
                }
                compile_expr(&field.expr, ctx, scope, out)?;
                if let Some(alias) = &field.alias {
                    out.text("AS").text(dialect.quote_identifier(alias));
                }
            }
        }

        let root = &scope.sources()[0];
        out.text("FROM").text(dialect.quote_identifier(&root.descriptor.table));
        if scope.is_qualified() {
            out.text(root.alias.as_str());
        }

        for (join, source) in self.joins.iter().zip(&scope.sources()[1..]) {
            out.text(join.kind.sql());
            match &join.target {
                JoinTarget::Entity(_) => {
                    out.text(dialect.quote_identifier(&source.descriptor.table));
                }
                JoinTarget::Query(spec, _) => {
                    out.text("(");
                    spec.emit(ctx, Some(scope), out)?;
                    out.text(")");
                }
            }
            out.text(source.alias.as_str()).text("ON");
            let on = match &join.filter {
                Some(filter) => join.on.clone().and(filter.clone()),
                None => join.on.clone(),
            };
            compile_expr(&on, ctx, scope, out)?;
        }

        if let Some(where_) = &self.where_ {
            out.text("WHERE");
            compile_expr(where_, ctx, scope, out)?;
        }

        if !self.group_by.is_empty() {
            out.text("GROUP BY");
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    out.separator();
                }
                compile_expr(expr, ctx, scope, out)?;
            }
        }

        if let Some(having) = &self.having {
            out.text("HAVING");
            compile_expr(having, ctx, scope, out)?;
        }
        Ok(())
    }
}

/// A typed SELECT whose rows materialize as `E`.
pub struct Select<E> {
    spec: Arc<SelectSpec>,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Clone for Select<E> {
    fn clone(&self) -> Self {
        Self {
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Select<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Select").field(&self.spec).finish()
    }
}

impl<E: Entity> Default for Select<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Select<E> {
    /// All declared columns of `E`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: Arc::new(SelectSpec::new(EntityRef::of::<E>())),
            _marker: PhantomData,
        }
    }
}

impl<E> Select<E> {
    fn edit(mut self, f: impl FnOnce(&mut SelectSpec)) -> Self {
        f(Arc::make_mut(&mut self.spec));
        self
    }

    #[must_use]
    pub fn spec(&self) -> &SelectSpec {
        &self.spec
    }

    #[must_use]
    pub fn into_spec(self) -> SelectSpec {
        Arc::unwrap_or_clone(self.spec)
    }

    /// Names the root source; columns are then written `alias.column`.
    #[must_use]
    pub fn alias(self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.edit(|s| s.alias = Some(alias))
    }

    /// Replaces the projection.
    #[must_use]
    pub fn fields<I, P>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Projection>,
    {
        let fields: Vec<Projection> = fields.into_iter().map(Into::into).collect();
        self.edit(|s| s.fields = fields)
    }

    /// Appends one output column named `alias`.
    #[must_use]
    pub fn field(self, expr: impl Into<Expr>, alias: impl Into<String>) -> Self {
        let projection = Projection {
            expr: expr.into(),
            alias: Some(alias.into()),
        };
        self.edit(|s| s.fields.push(projection))
    }

    #[must_use]
    pub fn distinct(self) -> Self {
        self.edit(|s| s.distinct = true)
    }

    #[must_use]
    pub fn join<J>(self, join: Join<J>) -> Self {
        self.edit(|s| s.joins.push(join.spec))
    }

    /// ANDs `predicate` onto the WHERE clause. An empty [`Predicate`]
    /// leaves the clause unchanged.
    #[must_use]
    pub fn where_clause(self, predicate: impl Into<Predicate>) -> Self {
        let Some(expr) = predicate.into().into_expr() else {
            return self;
        };
        self.edit(|s| {
            s.where_ = Some(match s.where_.take() {
                Some(existing) => existing.and(expr),
                None => expr,
            });
        })
    }

    /// ORs `predicate` onto the WHERE clause.
    #[must_use]
    pub fn or_where(self, predicate: impl Into<Predicate>) -> Self {
        let Some(expr) = predicate.into().into_expr() else {
            return self;
        };
        self.edit(|s| {
            s.where_ = Some(match s.where_.take() {
                Some(existing) => existing.or(expr),
                None => expr,
            });
        })
    }

    #[must_use]
    pub fn group_by(self, expr: impl Into<Expr>) -> Self {
        let expr = expr.into();
        self.edit(|s| s.group_by.push(expr))
    }

    #[must_use]
    pub fn having(self, predicate: impl Into<Expr>) -> Self {
        let expr = predicate.into();
        self.edit(|s| {
            s.having = Some(match s.having.take() {
                Some(existing) => existing.and(expr),
                None => expr,
            });
        })
    }

    #[must_use]
    pub fn order_by(self, ordering: impl Into<Ordering>) -> Self {
        let ordering = ordering.into();
        self.edit(|s| s.order_by.push(ordering))
    }

    #[must_use]
    pub fn limit(self, limit: u64) -> Self {
        self.edit(|s| s.paging.limit = Some(limit))
    }

    #[must_use]
    pub fn offset(self, offset: u64) -> Self {
        self.edit(|s| s.paging.offset = Some(offset))
    }

    /// Appends `other` after `UNION ALL`.
    #[must_use]
    pub fn union_all<U>(self, other: &Select<U>) -> Self {
        let other = Arc::clone(&other.spec);
        self.edit(|s| s.unions.push(other))
    }

    /// Replaces the projection with `COUNT(*)`.
    #[must_use]
    pub fn count(self) -> Self {
        self.edit(|s| s.fields = vec![Projection::from(Expr::count_all())])
    }

    /// The same statement, materialized as `R`. Output columns are matched
    /// to `R`'s columns by name.
    #[must_use]
    pub fn into_shape<R>(self) -> Select<R> {
        Select {
            spec: self.spec,
            _marker: PhantomData,
        }
    }
}

impl<E> Operation for Select<E> {
    fn emit(&self, ctx: &CompileContext<'_>, out: &mut CommandBuilder) -> Result<(), CompileError> {
        self.spec.emit(ctx, None, out)
    }
}

/// A join against entity `J`, added with [`Select::join`].
pub struct Join<J> {
    spec: JoinSpec,
    _marker: PhantomData<fn() -> J>,
}

impl<J: Entity> Join<J> {
    #[must_use]
    pub fn inner(on: impl Into<Expr>) -> Self {
        Self::with(JoinKind::Inner, JoinTarget::Entity(EntityRef::of::<J>()), on.into())
    }

    #[must_use]
    pub fn left(on: impl Into<Expr>) -> Self {
        Self::with(JoinKind::Left, JoinTarget::Entity(EntityRef::of::<J>()), on.into())
    }

    /// Joins the rows of `select`, read with the columns of `J`.
    #[must_use]
    pub fn sub_query<S>(kind: JoinKind, select: &Select<S>, on: impl Into<Expr>) -> Self {
        let target = JoinTarget::Query(Arc::clone(&select.spec), EntityRef::of::<J>());
        Self::with(kind, target, on.into())
    }
}

impl<J> Join<J> {
    fn with(kind: JoinKind, target: JoinTarget, on: Expr) -> Self {
        Self {
            spec: JoinSpec {
                kind,
                target,
                alias: None,
                on,
                filter: None,
            },
            _marker: PhantomData,
        }
    }

    /// Names the joined source; required to tell apart two joins of the
    /// same entity.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.spec.alias = Some(alias.into());
        self
    }

    /// An extra condition ANDed onto the join predicate.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Expr>) -> Self {
        self.spec.filter = Some(filter.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqlServerDialect, SqliteDialect};
    use crate::entity::EntityRegistry;
    use crate::fixtures::{Other, Sample};
    use crate::value::SqlValue;

    fn sql(op: &impl Operation, dialect: &dyn crate::dialect::Dialect) -> String {
        op.prepare_with(dialect, &EntityRegistry::new())
            .unwrap()
            .text()
            .into_owned()
    }

    #[test]
    fn test_default_projection_lists_all_columns() {
        let q = Select::<Sample>::new().where_clause(Sample::integer().gt(50));
        assert_eq!(
            sql(&q, &SqliteDialect::new()),
            "SELECT \"id\", \"integer\", \"single\", \"double\", \"string\", \"note\" \
             FROM \"sample\" WHERE \"integer\" > ?1"
        );
    }

    #[test]
    fn test_extending_does_not_change_the_original() {
        let base = Select::<Sample>::new().where_clause(Sample::integer().gt(1));
        let narrowed = base.clone().where_clause(Sample::integer().lt(9)).limit(5);
        let dialect = SqliteDialect::new();
        assert!(!sql(&base, &dialect).contains("LIMIT"));
        assert!(sql(&narrowed, &dialect).ends_with("WHERE \"integer\" > ?1 AND \"integer\" < ?2 LIMIT 5"));
    }

    #[test]
    fn test_join_qualifies_columns() {
        let q = Select::<Sample>::new()
            .fields([Sample::string()])
            .join(Join::<Other>::inner(Other::sample_id().eq_field(Sample::id())).filter(Other::label().eq("x")))
            .where_clause(Sample::integer().gt(1));
        assert_eq!(
            sql(&q, &SqlServerDialect::new()),
            "SELECT t0.[string] FROM [sample] t0 INNER JOIN [other] t1 \
             ON t1.[sample_id] = t0.[id] AND t1.[label] = @1 WHERE t0.[integer] > @2"
        );
    }

    #[test]
    fn test_self_join_needs_alias() {
        let q = Select::<Sample>::new()
            .join(Join::<Sample>::left(Sample::id().alias("p").eq_field(Sample::integer().alias("t0"))).alias("p"))
            .fields([Sample::string().alias("p")]);
        assert_eq!(
            sql(&q, &SqliteDialect::new()),
            "SELECT p.\"string\" FROM \"sample\" t0 LEFT JOIN \"sample\" p ON p.\"id\" = t0.\"integer\""
        );

        let ambiguous = q.where_clause(Sample::integer().gt(1));
        assert!(matches!(
            ambiguous.prepare_with(&SqliteDialect::new(), &EntityRegistry::new()),
            Err(CompileError::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn test_sub_query_in_predicate() {
        let inner = Select::<Other>::new()
            .fields([Other::sample_id()])
            .where_clause(Other::label().eq("a"));
        let q = Select::<Sample>::new()
            .fields([Sample::id()])
            .where_clause(Sample::integer().eq(3) & Sample::id().in_query(&inner));
        assert_eq!(
            sql(&q, &SqliteDialect::new()),
            "SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?1 AND \"id\" IN ( \
             SELECT \"sample_id\" FROM \"other\" WHERE \"label\" = ?2 )"
        );
    }

    #[test]
    fn test_correlated_sub_query_reaches_outer_alias() {
        let inner = Select::<Other>::new()
            .count()
            .where_clause(Other::sample_id().eq_field(Sample::id()));
        let q = Select::<Sample>::new()
            .alias("s")
            .fields([Sample::id()])
            .where_clause(Expr::sub_query(inner.into_spec()).gt(Expr::constant(0)));
        assert_eq!(
            sql(&q, &PostgresDialect::new()),
            "SELECT s.\"id\" FROM \"sample\" s WHERE ( SELECT COUNT( * ) FROM \"other\" \
             WHERE \"sample_id\" = s.\"id\" ) > $1"
        );
    }

    #[test]
    fn test_paging_per_dialect() {
        let q = Select::<Sample>::new().fields([Sample::id()]).limit(10).offset(20);
        assert_eq!(
            sql(&q, &SqliteDialect::new()),
            "SELECT \"id\" FROM \"sample\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            sql(&q, &SqlServerDialect::new()),
            "SELECT [id] FROM [sample] ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );

        let ordered = q.order_by(Sample::id().desc());
        assert_eq!(
            sql(&ordered, &SqlServerDialect::new()),
            "SELECT [id] FROM [sample] ORDER BY [id] DESC OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_group_by_having_and_distinct() {
        let q = Select::<Sample>::new()
            .distinct()
            .fields([Projection::from(Sample::string()), Projection::from(Sample::integer().sum())])
            .group_by(Sample::string())
            .having(Sample::integer().sum().gt(Expr::constant(10)));
        assert_eq!(
            sql(&q, &SqliteDialect::new()),
            "SELECT DISTINCT \"string\", SUM( \"integer\" ) FROM \"sample\" \
             GROUP BY \"string\" HAVING SUM( \"integer\" ) > ?1"
        );
    }

    #[test]
    fn test_union_all_splices_second_select() {
        let a = Select::<Sample>::new().fields([Sample::id()]).where_clause(Sample::integer().eq(1));
        let b = Select::<Sample>::new().fields([Sample::id()]).where_clause(Sample::integer().eq(2));
        let q = a.union_all(&b);
        let prepared = q.prepare_with(&SqliteDialect::new(), &EntityRegistry::new()).unwrap();
        assert_eq!(
            prepared.text(),
            "SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?1 UNION ALL \
             SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?2"
        );
        assert_eq!(prepared.constants(), &[SqlValue::Int(1), SqlValue::Int(2)]);
    }

    #[test]
    fn test_union_branch_keeps_its_unions_and_paging() {
        let by = |n: i64| {
            Select::<Sample>::new()
                .fields([Sample::id()])
                .where_clause(Sample::integer().eq(n))
        };
        let flat = by(1).union_all(&by(2).union_all(&by(3)));
        assert_eq!(
            sql(&flat, &SqliteDialect::new()),
            "SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?1 UNION ALL \
             SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?2 UNION ALL \
             SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?3"
        );

        let q = by(1).union_all(&by(2).union_all(&by(3)).limit(1));
        let prepared = q.prepare_with(&SqliteDialect::new(), &EntityRegistry::new()).unwrap();
        assert_eq!(
            prepared.text(),
            "SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?1 UNION ALL SELECT * FROM ( \
             SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?2 UNION ALL \
             SELECT \"id\" FROM \"sample\" WHERE \"integer\" = ?3 LIMIT 1 ) u1"
        );
        assert_eq!(
            prepared.constants(),
            &[SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let q = Select::<Sample>::new()
            .where_clause(Sample::string().eq("Hello") & Sample::integer().is_in([1, 2]));
        let dialect = SqlServerDialect::new();
        let registry = EntityRegistry::new();
        let first = q.prepare_with(&dialect, &registry).unwrap();
        let second = q.prepare_with(&dialect, &registry).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text(), second.text());
        assert_eq!(first.constants(), second.constants());
    }

    #[test]
    fn test_into_shape_keeps_statement() {
        let q = Select::<Sample>::new()
            .fields([Sample::id()])
            .where_clause(Sample::integer().gt(50));
        let before = sql(&q, &PostgresDialect::new());
        let shaped: Select<Other> = q.into_shape();
        assert_eq!(sql(&shaped, &PostgresDialect::new()), before);
    }

    #[test]
    fn test_empty_predicate_leaves_where_untouched() {
        let q = Select::<Sample>::new().fields([Sample::id()]).where_clause(Predicate::new());
        assert_eq!(sql(&q, &SqliteDialect::new()), "SELECT \"id\" FROM \"sample\"");
    }
}
