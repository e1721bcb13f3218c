//! Schema diff engine.
//!
//! Compares the declared [`EntityDescriptor`] with the introspected
//! [`TableDescriptor`] and produces the ordered [`SchemaChange`]s that bring
//! the live object in line. Columns are matched by name; unique constraints
//! are compared as whole, ordered column groups; non-unique indices by
//! column list. When the dialect cannot perform a needed change in place
//! the whole table is rebuilt instead.

use serde::Serialize;
use tracing::warn;

use super::live::{ObjectKind, TableDescriptor, UniqueSource};
use crate::dialect::{unique_name, Dialect};
use crate::entity::{ColumnDescriptor, EntityDescriptor, IndexDescriptor};
use crate::error::MigrationError;
use crate::value::SqlValue;

// ================================================================
// Public types
// ================================================================

/// How a table is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Nothing to do.
    Unchanged,
    /// The object does not exist yet.
    Create,
    /// ALTER statements against the existing table.
    InPlace,
    /// Create under a staging name, copy, drop the old table, rename.
    Recreate,
    /// Drop and create a view whose definition changed.
    ReplaceView,
}

/// A single DDL change.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    CreateTable {
        table: String,
        columns: Vec<ColumnDescriptor>,
        uniques: Vec<Vec<String>>,
    },
    AddColumn {
        table: String,
        column: ColumnDescriptor,
    },
    DropColumn {
        table: String,
        column: String,
    },
    /// Bring an existing column to the declared type, nullability and
    /// default.
    AlterColumn {
        table: String,
        column: ColumnDescriptor,
    },
    AddUnique {
        table: String,
        name: String,
        columns: Vec<String>,
    },
    DropUnique {
        table: String,
        name: String,
    },
    CreateIndex {
        table: String,
        index: IndexDescriptor,
    },
    DropIndex {
        table: String,
        name: String,
    },
    CreateView {
        name: String,
        sql: String,
    },
    DropView {
        name: String,
    },
    RecreateTable(RecreateTable),
}

/// Where a column of a rebuilt table takes its values from.
#[derive(Debug, Clone, PartialEq)]
pub enum CopySource {
    /// The same-named column of the old table.
    Column(String),
    /// A constant, for new NOT NULL columns without a default.
    Value(SqlValue),
}

/// Rebuilds a table with its final definition, keeping its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RecreateTable {
    pub table: String,
    /// Name the new table is built under until the old one is dropped.
    pub staging: String,
    pub columns: Vec<ColumnDescriptor>,
    pub uniques: Vec<Vec<String>>,
    /// `(target column, source)` pairs for the copy step.
    pub copy: Vec<(String, CopySource)>,
    pub indices: Vec<IndexDescriptor>,
}

impl RecreateTable {
    /// The statement sequence, meant to run in one transaction: build the
    /// staging table, copy, drop the old table, then take over its name.
    /// Indices of the old table go away with it, so new ones are created
    /// last.
    pub fn statements<D: Dialect + ?Sized>(&self, dialect: &D) -> Vec<String> {
        let mut statements = vec![dialect.create_table(&self.staging, &self.columns, &self.uniques)];
        if !self.copy.is_empty() {
            let targets: Vec<String> = self.copy.iter().map(|(t, _)| t.clone()).collect();
            let sources: Vec<String> = self
                .copy
                .iter()
                .map(|(_, source)| match source {
                    CopySource::Column(name) => dialect.quote_identifier(name),
                    CopySource::Value(value) => dialect.literal(value),
                })
                .collect();
            statements.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                dialect.quote_identifier(&self.staging),
                dialect.quote_list(&targets),
                sources.join(", "),
                dialect.quote_identifier(&self.table)
            ));
        }
        statements.push(dialect.drop_table(&self.table));
        statements.extend(dialect.rename_rebuilt_table(&self.staging, &self.table));
        statements.extend(
            self.indices
                .iter()
                .map(|index| dialect.create_index(&self.table, index)),
        );
        statements
    }
}

/// The changes for one table or view, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    pub table: String,
    pub strategy: Strategy,
    pub changes: Vec<SchemaChange>,
}

impl MigrationPlan {
    fn unchanged(table: &str) -> Self {
        Self {
            table: table.to_string(),
            strategy: Strategy::Unchanged,
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Renders every change with `dialect`.
    pub fn statements(&self, dialect: &dyn Dialect) -> Vec<String> {
        self.changes
            .iter()
            .flat_map(|change| dialect.generate_sql(change))
            .collect()
    }
}

// ================================================================
// Planning
// ================================================================

/// Computes the plan bringing `live` (or its absence) in line with
/// `desired`. `view_sql` is the rendered definition when `desired` maps to
/// a view.
///
/// # Errors
///
/// Returns [`MigrationError::KindMismatch`] if the name is taken by a view
/// where a table is declared, or the other way around.
pub fn plan_table(
    desired: &EntityDescriptor,
    live: Option<&TableDescriptor>,
    dialect: &dyn Dialect,
    view_sql: Option<&str>,
) -> Result<MigrationPlan, MigrationError> {
    let table = desired.table.as_str();
    let expected = if view_sql.is_some() {
        ObjectKind::View
    } else {
        ObjectKind::Table
    };
    if let Some(live) = live {
        if live.kind != expected {
            return Err(MigrationError::KindMismatch {
                name: table.to_string(),
                expected: expected.as_str(),
                found: live.kind.as_str(),
            });
        }
    }

    if let Some(sql) = view_sql {
        return Ok(plan_view(table, live, sql));
    }

    let Some(live) = live else {
        let mut changes = vec![SchemaChange::CreateTable {
            table: table.to_string(),
            columns: desired.columns.clone(),
            uniques: desired.all_unique_groups(),
        }];
        changes.extend(desired.indices.iter().map(|index| SchemaChange::CreateIndex {
            table: table.to_string(),
            index: index.clone(),
        }));
        return Ok(MigrationPlan {
            table: table.to_string(),
            strategy: Strategy::Create,
            changes,
        });
    };

    let diff = TableDiff::compute(desired, live, dialect);
    if diff.is_empty() {
        return Ok(MigrationPlan::unchanged(table));
    }
    if let Some(reason) = diff.recreate_reason(dialect) {
        warn!(table, reason, dialect = dialect.name(), "Rebuilding table");
        return Ok(MigrationPlan {
            table: table.to_string(),
            strategy: Strategy::Recreate,
            changes: vec![SchemaChange::RecreateTable(recreate(desired, live))],
        });
    }
    Ok(MigrationPlan {
        table: table.to_string(),
        strategy: Strategy::InPlace,
        changes: diff.into_changes(table),
    })
}

fn plan_view(name: &str, live: Option<&TableDescriptor>, sql: &str) -> MigrationPlan {
    let create = SchemaChange::CreateView {
        name: name.to_string(),
        sql: sql.to_string(),
    };
    match live {
        None => MigrationPlan {
            table: name.to_string(),
            strategy: Strategy::Create,
            changes: vec![create],
        },
        Some(live)
            if live
                .view_sql
                .as_deref()
                .is_some_and(|current| normalize_sql(current) == normalize_sql(sql)) =>
        {
            MigrationPlan::unchanged(name)
        }
        Some(_) => MigrationPlan {
            table: name.to_string(),
            strategy: Strategy::ReplaceView,
            changes: vec![
                SchemaChange::DropView {
                    name: name.to_string(),
                },
                create,
            ],
        },
    }
}

/// Collapses whitespace and a trailing `;`.
fn normalize_sql(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// How to remove a live unique group.
#[derive(Debug)]
enum UniqueDrop {
    Constraint(String),
    Index(String),
    /// An unnamed constraint; only a rebuild removes it.
    Unnamed,
}

#[derive(Debug, Default)]
struct TableDiff {
    missing: Vec<ColumnDescriptor>,
    obsolete: Vec<String>,
    altered: Vec<ColumnDescriptor>,
    /// Key or identity changes, which no dialect alters in place.
    rekeyed: bool,
    unique_add: Vec<Vec<String>>,
    unique_drop: Vec<UniqueDrop>,
    index_create: Vec<IndexDescriptor>,
    index_drop: Vec<String>,
}

impl TableDiff {
    fn compute(desired: &EntityDescriptor, live: &TableDescriptor, dialect: &dyn Dialect) -> Self {
        let mut diff = Self::default();

        for column in &desired.columns {
            match live.column(&column.name) {
                None => diff.missing.push(column.clone()),
                Some(current) => {
                    if current.primary_key != column.flags.primary_key
                        || current.autoincrement != column.flags.autoincrement
                    {
                        diff.rekeyed = true;
                        diff.altered.push(column.clone());
                        continue;
                    }
                    let live_not_null = current.not_null || current.primary_key;
                    let live_default = current
                        .default
                        .as_deref()
                        .map(|d| dialect.canonical_default(d));
                    let declared_default = column
                        .default
                        .as_ref()
                        .map(|d| dialect.canonical_default(&dialect.default_sql(d)));
                    if !dialect.types_equivalent(column, &current.raw_type)
                        || live_not_null != column.is_not_null()
                        || live_default != declared_default
                    {
                        diff.altered.push(column.clone());
                    }
                }
            }
        }
        diff.obsolete = live
            .columns
            .iter()
            .filter(|c| desired.column_by_name(&c.name).is_none())
            .map(|c| c.name.clone())
            .collect();

        let declared = desired.all_unique_groups();
        let current = live.unique_groups();
        diff.unique_add = declared
            .iter()
            .filter(|group| !current.iter().any(|c| same_columns(c.columns(), group)))
            .cloned()
            .collect();
        diff.unique_drop = current
            .iter()
            .filter(|c| !declared.iter().any(|group| same_columns(c.columns(), group)))
            .map(|c| match c {
                UniqueSource::Constraint(u) => u
                    .name
                    .clone()
                    .map_or(UniqueDrop::Unnamed, UniqueDrop::Constraint),
                UniqueSource::Index(i) => UniqueDrop::Index(i.name.clone()),
            })
            .collect();

        let live_indices: Vec<_> = live.indices.iter().filter(|i| !i.unique).collect();
        diff.index_create = desired
            .indices
            .iter()
            .filter(|index| !live_indices.iter().any(|l| same_columns(&l.columns, &index.columns)))
            .cloned()
            .collect();
        diff.index_drop = live_indices
            .iter()
            .filter(|l| {
                !desired
                    .indices
                    .iter()
                    .any(|index| same_columns(&l.columns, &index.columns))
            })
            .map(|l| l.name.clone())
            .collect();

        diff
    }

    fn is_empty(&self) -> bool {
        self.missing.is_empty()
            && self.obsolete.is_empty()
            && self.altered.is_empty()
            && self.unique_add.is_empty()
            && self.unique_drop.is_empty()
            && self.index_create.is_empty()
            && self.index_drop.is_empty()
    }

    /// Why the table must be rebuilt, or `None` if ALTER suffices.
    fn recreate_reason(&self, dialect: &dyn Dialect) -> Option<&'static str> {
        if self.rekeyed {
            return Some("primary key changed");
        }
        if !self.altered.is_empty() && !dialect.supports_alter_column() {
            return Some("column definition changed");
        }
        if !self.obsolete.is_empty() && !dialect.supports_drop_column() {
            return Some("column dropped");
        }
        if self.missing.iter().any(|c| !dialect.can_add_column(c)) {
            return Some("column cannot be added in place");
        }
        if !self.unique_add.is_empty() && !dialect.supports_alter_unique() {
            return Some("unique constraint added");
        }
        let constraint_dropped = self
            .unique_drop
            .iter()
            .any(|d| !matches!(d, UniqueDrop::Index(_)));
        if constraint_dropped && !dialect.supports_alter_unique() {
            return Some("unique constraint dropped");
        }
        if self.unique_drop.iter().any(|d| matches!(d, UniqueDrop::Unnamed)) {
            return Some("unnamed unique constraint dropped");
        }
        None
    }

    fn into_changes(self, table: &str) -> Vec<SchemaChange> {
        let t = || table.to_string();
        let mut changes = Vec::new();
        for drop in self.unique_drop {
            match drop {
                UniqueDrop::Constraint(name) => {
                    changes.push(SchemaChange::DropUnique { table: t(), name });
                }
                UniqueDrop::Index(name) => changes.push(SchemaChange::DropIndex { table: t(), name }),
                UniqueDrop::Unnamed => {}
            }
        }
        changes.extend(
            self.index_drop
                .into_iter()
                .map(|name| SchemaChange::DropIndex { table: t(), name }),
        );
        changes.extend(
            self.obsolete
                .into_iter()
                .map(|column| SchemaChange::DropColumn { table: t(), column }),
        );
        changes.extend(
            self.missing
                .into_iter()
                .map(|column| SchemaChange::AddColumn { table: t(), column }),
        );
        changes.extend(
            self.altered
                .into_iter()
                .map(|column| SchemaChange::AlterColumn { table: t(), column }),
        );
        changes.extend(self.unique_add.into_iter().map(|columns| SchemaChange::AddUnique {
            table: t(),
            name: unique_name(table, &columns),
            columns,
        }));
        changes.extend(
            self.index_create
                .into_iter()
                .map(|index| SchemaChange::CreateIndex { table: t(), index }),
        );
        changes
    }
}

fn recreate(desired: &EntityDescriptor, live: &TableDescriptor) -> RecreateTable {
    let copy = desired
        .columns
        .iter()
        .filter_map(|column| {
            if let Some(current) = live.column(&column.name) {
                return Some((column.name.clone(), CopySource::Column(current.name.clone())));
            }
            let needs_value = column.flags.not_null
                && column.default.is_none()
                && !column.flags.autoincrement
                && !column.flags.primary_key;
            needs_value.then(|| {
                (
                    column.name.clone(),
                    CopySource::Value(column.sql_type.zero_value()),
                )
            })
        })
        .collect();
    RecreateTable {
        table: desired.table.clone(),
        staging: format!("_{}_new", desired.table),
        columns: desired.columns.clone(),
        uniques: desired.all_unique_groups(),
        copy,
        indices: desired.indices.clone(),
    }
}
