//! Shared entities for the compilation and planning tests.

#![allow(dead_code)]

use oxide_query::migrate::{LiveColumn, LiveIndex, LiveUnique, ObjectKind};
use oxide_query::query::SelectSpec;
use oxide_query::{Dialect, Entity, EntityDescriptor, Select, TableDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Entity)]
pub struct Customer {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    #[column(length = 80)]
    pub name: String,
    #[column(name = "email_address", unique)]
    pub email: String,
    pub score: f64,
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "purchases", unique = "customer_id, reference", index = "placed")]
pub struct Purchase {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub customer_id: i64,
    #[column(length = 20)]
    pub reference: String,
    pub amount: i64,
    #[column(default_value = false)]
    pub refunded: bool,
    #[column(default = "CURRENT_TIMESTAMP")]
    pub placed: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "large_purchases", view = "large_purchases")]
pub struct LargePurchase {
    pub id: i64,
    pub amount: i64,
}

pub fn large_purchases() -> SelectSpec {
    Select::<Purchase>::new()
        .fields([Purchase::id(), Purchase::amount()])
        .where_clause(Purchase::amount().gt(1000))
        .into_spec()
}

/// The live table a database would report right after creating `E`.
pub fn live_table<E: Entity>(dialect: &dyn Dialect) -> TableDescriptor {
    let descriptor: EntityDescriptor = E::describe();
    TableDescriptor {
        name: descriptor.table.clone(),
        kind: ObjectKind::Table,
        columns: descriptor
            .columns
            .iter()
            .map(|c| LiveColumn {
                name: c.name.clone(),
                raw_type: dialect.type_name(c.sql_type),
                not_null: c.is_not_null(),
                primary_key: c.flags.primary_key,
                autoincrement: c.flags.autoincrement,
                default: c.default.as_ref().map(|d| dialect.default_sql(d)),
            })
            .collect(),
        uniques: descriptor
            .all_unique_groups()
            .into_iter()
            .map(|columns| LiveUnique {
                name: Some(oxide_query::dialect::unique_name(&descriptor.table, &columns)),
                columns,
            })
            .collect(),
        indices: descriptor
            .indices
            .iter()
            .map(|i| LiveIndex {
                name: i.name.clone(),
                columns: i.columns.clone(),
                unique: false,
            })
            .collect(),
        view_sql: None,
    }
}
