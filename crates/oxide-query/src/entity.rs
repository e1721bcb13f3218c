//! Entity descriptors and the process-wide descriptor registry.
//!
//! An [`EntityDescriptor`] is the declared field table of one entity type:
//! table name, ordered columns with flags, unique groups and indices. It is
//! built once per type by [`Entity::describe`] (usually generated by
//! `#[derive(Entity)]`) and cached in an [`EntityRegistry`]. The compiler
//! reads it to resolve column names; the migration planner reads it as the
//! desired state; row materialization reads it to route columns to setters.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::trace;

use crate::error::ConversionError;
use crate::query::select::SelectSpec;
use crate::row::Row;
use crate::types::SqlType;
use crate::value::SqlValue;

/// A record type mapped to one table or view.
pub trait Entity: Default + Send + Sync + 'static {
    /// Builds the descriptor. Called at most a few times per process; use
    /// [`EntityRegistry::descriptor`] to get the cached copy.
    fn describe() -> EntityDescriptor;

    /// Reads the value of `property`, or `None` if there is no such property.
    fn get(&self, property: &str) -> Option<SqlValue>;

    /// Every property with its value, in declaration order.
    fn values(&self) -> Vec<(&'static str, SqlValue)>;

    /// Writes `value` into `property`. Returns `Ok(false)` if there is no
    /// such property.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the value cannot be coerced into the
    /// property's type.
    fn set(&mut self, property: &str, value: SqlValue) -> Result<bool, ConversionError>;
}

/// Type-erased handle to an entity type.
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_id: TypeId,
    name: &'static str,
    describe: fn() -> EntityDescriptor,
}

impl EntityRef {
    #[must_use]
    pub fn of<E: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: short_type_name(std::any::type_name::<E>()),
            describe: E::describe,
        }
    }

    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Unqualified Rust type name, used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.name).finish()
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EntityRef {}

fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

/// Column-level flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
    pub not_null: bool,
}

/// A declared column default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A literal value, rendered by the dialect.
    Value(SqlValue),
    /// A raw SQL expression such as `CURRENT_TIMESTAMP`.
    Expression(String),
}

/// One mapped column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Rust property the column is read from and written to.
    pub property: &'static str,
    pub name: String,
    pub sql_type: SqlType,
    pub flags: ColumnFlags,
    pub default: Option<DefaultValue>,
}

impl ColumnDescriptor {
    #[must_use]
    pub fn new(property: &'static str, name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            property,
            name: name.into(),
            sql_type,
            flags: ColumnFlags::default(),
            default: None,
        }
    }

    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.flags.primary_key = true;
        self
    }

    #[must_use]
    pub const fn autoincrement(mut self) -> Self {
        self.flags.autoincrement = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.flags.unique = true;
        self
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.flags.not_null = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// NOT NULL either explicitly or through the primary key.
    #[must_use]
    pub const fn is_not_null(&self) -> bool {
        self.flags.not_null || self.flags.primary_key
    }
}

/// A declared non-unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
}

/// Static metadata describing an entity-to-table mapping.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub type_name: &'static str,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Multi-column unique constraints, each an ordered column group.
    pub unique_groups: Vec<Vec<String>>,
    pub indices: Vec<IndexDescriptor>,
    /// Set when the entity maps to a view defined by this select.
    pub view: Option<Arc<SelectSpec>>,
}

impl EntityDescriptor {
    #[must_use]
    pub fn new(type_name: &'static str, table: impl Into<String>) -> Self {
        Self {
            type_name,
            table: table.into(),
            columns: Vec::new(),
            unique_groups: Vec::new(),
            indices: Vec::new(),
            view: None,
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a unique constraint over `columns`, in order.
    #[must_use]
    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_groups
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a non-unique index named `ix_<table>_<columns>`.
    #[must_use]
    pub fn index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = format!("ix_{}_{}", self.table, columns.join("_"));
        self.indices.push(IndexDescriptor { name, columns });
        self
    }

    /// Maps the entity to a view over `select`.
    #[must_use]
    pub fn view(mut self, select: SelectSpec) -> Self {
        self.view = Some(Arc::new(select));
        self
    }

    #[must_use]
    pub const fn is_view(&self) -> bool {
        self.view.is_some()
    }

    #[must_use]
    pub fn column_by_property(&self, property: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Case-insensitive lookup by column name.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.flags.primary_key)
    }

    /// Columns written by an insert: everything except autoincrement keys.
    pub fn insertable(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.flags.autoincrement)
    }

    /// All unique groups: single-column `unique` flags first, then the
    /// declared multi-column groups.
    #[must_use]
    pub fn all_unique_groups(&self) -> Vec<Vec<String>> {
        self.columns
            .iter()
            .filter(|c| c.flags.unique && !c.flags.primary_key)
            .map(|c| vec![c.name.clone()])
            .chain(self.unique_groups.iter().cloned())
            .collect()
    }
}

/// Process-scoped cache of entity descriptors.
///
/// Populated lazily on first access per type and read-mostly afterwards.
/// Concurrent first accesses may each build a descriptor, but only the
/// first one inserted is kept and every caller receives that same `Arc`.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    descriptors: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
}

static GLOBAL_REGISTRY: LazyLock<EntityRegistry> = LazyLock::new(EntityRegistry::new);

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    /// Returns the cached descriptor for `E`, building it on first access.
    #[must_use]
    pub fn descriptor<E: Entity>(&self) -> Arc<EntityDescriptor> {
        self.resolve(EntityRef::of::<E>())
    }

    /// Returns the cached descriptor for a type-erased entity.
    #[must_use]
    pub fn resolve(&self, entity: EntityRef) -> Arc<EntityDescriptor> {
        if let Some(found) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity.type_id)
        {
            return Arc::clone(found);
        }

        // Built outside the lock: describe() may itself resolve other
        // entities (view definitions).
        let built = Arc::new((entity.describe)());
        let mut map = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let stored = map.entry(entity.type_id).or_insert_with(|| {
            trace!(entity = entity.name, table = %built.table, "Caching entity descriptor");
            built
        });
        Arc::clone(stored)
    }

    #[must_use]
    pub fn contains(&self, entity: EntityRef) -> bool {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&entity.type_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds an entity from a row, matching output columns to properties by
/// name. Columns with no matching property are skipped.
///
/// # Errors
///
/// Returns [`ConversionError`] naming the column whose value could not be
/// coerced.
pub fn materialize<E: Entity>(row: Row, descriptor: &EntityDescriptor) -> Result<E, ConversionError> {
    let mut entity = E::default();
    for (column, value) in row.into_pairs() {
        if let Some(mapped) = descriptor.column_by_name(&column) {
            entity
                .set(mapped.property, value)
                .map_err(|e| e.with_column(column))?;
        }
    }
    Ok(entity)
}
