mod common;

use common::{live_table, Customer, LargePurchase, Purchase};
use oxide_query::migrate::{
    plan_table, render_plan, view_definition, CopySource, LiveColumn, SchemaChange,
};
use oxide_query::{
    Dialect, Entity, EntityRegistry, MigrationError, PostgresDialect, SqlServerDialect, SqlType,
    SqlValue, SqliteDialect, Strategy, TableDescriptor,
};

fn dialects() -> [Box<dyn Dialect>; 3] {
    [
        Box::new(SqliteDialect::new()),
        Box::new(PostgresDialect::new()),
        Box::new(SqlServerDialect::new()),
    ]
}

fn without_column(mut live: TableDescriptor, name: &str) -> TableDescriptor {
    live.columns.retain(|c| c.name != name);
    live
}

#[test]
fn test_fresh_state_is_unchanged_everywhere() {
    for dialect in dialects() {
        let dialect = dialect.as_ref();
        for desired in [Customer::describe(), Purchase::describe()] {
            let live = match desired.table.as_str() {
                "customer" => live_table::<Customer>(dialect),
                _ => live_table::<Purchase>(dialect),
            };
            let plan = plan_table(&desired, Some(&live), dialect, None).unwrap();
            assert_eq!(
                plan.strategy,
                Strategy::Unchanged,
                "{} on {}",
                desired.table,
                dialect.name()
            );
            assert!(plan.is_empty());
        }
    }
}

#[test]
fn test_missing_table_is_created_with_indices() {
    let dialect = PostgresDialect::new();
    let plan = plan_table(&Purchase::describe(), None, &dialect, None).unwrap();
    assert_eq!(plan.strategy, Strategy::Create);

    let statements = render_plan(&plan, &dialect);
    assert_eq!(statements.len(), 2);
    let create = &statements[0].text;
    assert!(create.starts_with("CREATE TABLE \"purchases\" ("));
    assert!(create.contains("\"id\" BIGSERIAL PRIMARY KEY"));
    assert!(create.contains("\"reference\" VARCHAR(20) NOT NULL"));
    assert!(create.contains("\"refunded\" BOOLEAN NOT NULL DEFAULT FALSE"));
    assert!(create.contains("\"placed\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"));
    assert!(create.contains(
        "CONSTRAINT \"uq_purchases_customer_id_reference\" UNIQUE (\"customer_id\", \"reference\")"
    ));
    assert_eq!(
        statements[1].text,
        "CREATE INDEX \"ix_purchases_placed\" ON \"purchases\" (\"placed\")"
    );
}

#[test]
fn test_nullable_column_is_added_in_place_everywhere() {
    for dialect in dialects() {
        let dialect = dialect.as_ref();
        let live = without_column(live_table::<Customer>(dialect), "nickname");
        let plan = plan_table(&Customer::describe(), Some(&live), dialect, None).unwrap();
        assert_eq!(plan.strategy, Strategy::InPlace, "{}", dialect.name());
        assert!(matches!(
            &plan.changes[..],
            [SchemaChange::AddColumn { column, .. }] if column.name == "nickname"
        ));
    }

    let live = without_column(live_table::<Customer>(&SqlServerDialect::new()), "nickname");
    let plan = plan_table(&Customer::describe(), Some(&live), &SqlServerDialect::new(), None).unwrap();
    assert_eq!(
        plan.statements(&SqlServerDialect::new()),
        vec![String::from(
            "ALTER TABLE [customer] ADD [nickname] NVARCHAR(MAX)"
        )]
    );
}

#[test]
fn test_not_null_column_without_default_rebuilds_on_sqlite() {
    let dialect = SqliteDialect::new();
    let live = without_column(live_table::<Customer>(&dialect), "score");
    let plan = plan_table(&Customer::describe(), Some(&live), &dialect, None).unwrap();
    assert_eq!(plan.strategy, Strategy::Recreate);

    let [SchemaChange::RecreateTable(recreate)] = &plan.changes[..] else {
        panic!("expected a single rebuild, got {:?}", plan.changes);
    };
    assert_eq!(recreate.staging, "_customer_new");
    let score = recreate
        .copy
        .iter()
        .find(|(target, _)| target == "score")
        .map(|(_, source)| source);
    assert_eq!(score, Some(&CopySource::Value(SqlValue::Float(0.0))));
    assert!(recreate
        .copy
        .iter()
        .any(|(target, source)| target == "id" && *source == CopySource::Column(String::from("id"))));

    let statements = plan.statements(&dialect);
    assert!(statements[0].starts_with("CREATE TABLE \"_customer_new\""));
    assert!(statements[1].starts_with(
        "INSERT INTO \"_customer_new\" (\"id\", \"name\", \"email_address\", \"score\", \"nickname\") SELECT"
    ));
    assert!(statements[1].ends_with("FROM \"customer\""));
    assert_eq!(statements[2], "DROP TABLE \"customer\"");
    assert_eq!(
        statements[4],
        "ALTER TABLE \"_customer_new\" RENAME TO \"customer\""
    );

    // Postgres can add it directly.
    let postgres = PostgresDialect::new();
    let live = without_column(live_table::<Customer>(&postgres), "score");
    let plan = plan_table(&Customer::describe(), Some(&live), &postgres, None).unwrap();
    assert_eq!(plan.strategy, Strategy::InPlace);
}

#[test]
fn test_changed_column_alters_where_supported() {
    let widen = |live: &mut TableDescriptor, raw: &str| {
        let name = live.columns.iter_mut().find(|c| c.name == "name").unwrap();
        name.raw_type = raw.to_string();
    };

    let postgres = PostgresDialect::new();
    let mut live = live_table::<Customer>(&postgres);
    widen(&mut live, "character varying(40)");
    let plan = plan_table(&Customer::describe(), Some(&live), &postgres, None).unwrap();
    assert_eq!(plan.strategy, Strategy::InPlace);
    assert_eq!(
        plan.statements(&postgres),
        vec![String::from(
            "ALTER TABLE \"customer\" ALTER COLUMN \"name\" TYPE VARCHAR(80), \
             ALTER COLUMN \"name\" SET NOT NULL, ALTER COLUMN \"name\" DROP DEFAULT"
        )]
    );

    let sqlserver = SqlServerDialect::new();
    let mut live = live_table::<Customer>(&sqlserver);
    widen(&mut live, "NVARCHAR(40)");
    let plan = plan_table(&Customer::describe(), Some(&live), &sqlserver, None).unwrap();
    let statements = plan.statements(&sqlserver);
    assert_eq!(statements.len(), 2);
    assert!(statements[0].contains("FROM sys.default_constraints"));
    assert_eq!(
        statements[1],
        "ALTER TABLE [customer] ALTER COLUMN [name] NVARCHAR(80) NOT NULL"
    );

    let sqlite = SqliteDialect::new();
    let mut live = live_table::<Customer>(&sqlite);
    let score = live.columns.iter_mut().find(|c| c.name == "score").unwrap();
    score.not_null = false;
    let plan = plan_table(&Customer::describe(), Some(&live), &sqlite, None).unwrap();
    assert_eq!(plan.strategy, Strategy::Recreate);
}

#[test]
fn test_changed_default_converges_on_sqlserver() {
    let sqlserver = SqlServerDialect::new();
    let mut live = live_table::<Purchase>(&sqlserver);
    for column in &mut live.columns {
        if column.default.is_some() {
            column.default = Some(String::from("((1))"));
        }
    }
    let plan = plan_table(&Purchase::describe(), Some(&live), &sqlserver, None).unwrap();
    assert_eq!(plan.strategy, Strategy::InPlace);
    let statements = plan.statements(&sqlserver);
    assert_eq!(statements.len(), 6);
    assert!(statements[0].contains(
        "OBJECT_ID(N'[purchases]') AND c.name = N'refunded'"
    ));
    assert!(statements[0].contains("N'ALTER TABLE [purchases] DROP CONSTRAINT ' + QUOTENAME(@df)"));
    assert_eq!(
        statements[1],
        "ALTER TABLE [purchases] ALTER COLUMN [refunded] BIT NOT NULL"
    );
    assert_eq!(
        statements[2],
        "ALTER TABLE [purchases] ADD CONSTRAINT [df_purchases_refunded] DEFAULT 0 FOR [refunded]"
    );
    assert_eq!(
        statements[5],
        "ALTER TABLE [purchases] ADD CONSTRAINT [df_purchases_placed] \
         DEFAULT CURRENT_TIMESTAMP FOR [placed]"
    );

    // What SQL Server reports once those constraints exist.
    for column in &mut live.columns {
        column.default = match column.name.as_str() {
            "refunded" => Some(String::from("((0))")),
            "placed" => Some(String::from("(getdate())")),
            _ => None,
        };
    }
    let again = plan_table(&Purchase::describe(), Some(&live), &sqlserver, None).unwrap();
    assert_eq!(again.strategy, Strategy::Unchanged);
    assert!(again.is_empty());
}

#[test]
fn test_synonym_types_compare_equal() {
    let postgres = PostgresDialect::new();
    let mut live = live_table::<Customer>(&postgres);
    for column in &mut live.columns {
        column.raw_type = match column.name.as_str() {
            "id" => String::from("bigint"),
            "name" => String::from("character varying(80)"),
            "score" => String::from("double precision"),
            _ => String::from("text"),
        };
    }
    let plan = plan_table(&Customer::describe(), Some(&live), &postgres, None).unwrap();
    assert_eq!(plan.strategy, Strategy::Unchanged);

    let sqlite = SqliteDialect::new();
    let mut live = live_table::<Customer>(&sqlite);
    let name = live.columns.iter_mut().find(|c| c.name == "name").unwrap();
    name.raw_type = String::from("VARCHAR(80)");
    let plan = plan_table(&Customer::describe(), Some(&live), &sqlite, None).unwrap();
    assert!(plan.is_empty());
}

#[test]
fn test_obsolete_column_is_dropped_or_rebuilt() {
    let extra = LiveColumn {
        name: String::from("legacy"),
        raw_type: String::from("TEXT"),
        not_null: false,
        primary_key: false,
        autoincrement: false,
        default: None,
    };

    let postgres = PostgresDialect::new();
    let mut live = live_table::<Customer>(&postgres);
    live.columns.push(extra.clone());
    let plan = plan_table(&Customer::describe(), Some(&live), &postgres, None).unwrap();
    assert_eq!(
        plan.statements(&postgres),
        vec![String::from("ALTER TABLE \"customer\" DROP COLUMN \"legacy\"")]
    );

    let sqlite = SqliteDialect::new();
    let mut live = live_table::<Customer>(&sqlite);
    live.columns.push(extra);
    let plan = plan_table(&Customer::describe(), Some(&live), &sqlite, None).unwrap();
    let [SchemaChange::RecreateTable(recreate)] = &plan.changes[..] else {
        panic!("expected a rebuild, got {:?}", plan.changes);
    };
    assert!(recreate.copy.iter().all(|(target, _)| target != "legacy"));
}

#[test]
fn test_key_change_always_rebuilds() {
    let postgres = PostgresDialect::new();
    let mut live = live_table::<Customer>(&postgres);
    let id = live.columns.iter_mut().find(|c| c.name == "id").unwrap();
    id.primary_key = false;
    id.autoincrement = false;
    let plan = plan_table(&Customer::describe(), Some(&live), &postgres, None).unwrap();
    assert_eq!(plan.strategy, Strategy::Recreate);
}

#[test]
fn test_index_and_unique_changes() {
    let sqlserver = SqlServerDialect::new();
    let mut live = live_table::<Purchase>(&sqlserver);
    live.indices[0].columns = vec![String::from("amount")];
    live.indices[0].name = String::from("ix_purchases_amount");
    live.uniques.clear();
    let plan = plan_table(&Purchase::describe(), Some(&live), &sqlserver, None).unwrap();
    assert_eq!(plan.strategy, Strategy::InPlace);
    assert_eq!(
        plan.statements(&sqlserver),
        vec![
            String::from("DROP INDEX [ix_purchases_amount] ON [purchases]"),
            String::from(
                "ALTER TABLE [purchases] ADD CONSTRAINT [uq_purchases_customer_id_reference] \
                 UNIQUE ([customer_id], [reference])"
            ),
            String::from("CREATE INDEX [ix_purchases_placed] ON [purchases] ([placed])"),
        ]
    );

    // Column order inside a unique group matters.
    let sqlite = SqliteDialect::new();
    let mut live = live_table::<Purchase>(&sqlite);
    live.uniques[0].columns.reverse();
    let plan = plan_table(&Purchase::describe(), Some(&live), &sqlite, None).unwrap();
    assert_eq!(plan.strategy, Strategy::Recreate);
}

#[test]
fn test_view_plans() {
    let registry = EntityRegistry::new();
    let dialect = SqliteDialect::new();
    let desired = LargePurchase::describe();
    let sql = view_definition(&desired, &dialect, &registry).unwrap().unwrap();

    let created = plan_table(&desired, None, &dialect, Some(&sql)).unwrap();
    assert_eq!(created.strategy, Strategy::Create);

    let stored = TableDescriptor::view("large_purchases", format!("{sql};"));
    let unchanged = plan_table(&desired, Some(&stored), &dialect, Some(&sql)).unwrap();
    assert_eq!(unchanged.strategy, Strategy::Unchanged);

    let stale = TableDescriptor::view(
        "large_purchases",
        "SELECT \"id\", \"amount\" FROM \"purchases\" WHERE \"amount\" > 10",
    );
    let replaced = plan_table(&desired, Some(&stale), &dialect, Some(&sql)).unwrap();
    assert_eq!(replaced.strategy, Strategy::ReplaceView);
    let statements = replaced.statements(&dialect);
    assert_eq!(statements[0], "DROP VIEW \"large_purchases\"");
    assert!(statements[1].starts_with("CREATE VIEW \"large_purchases\" AS SELECT"));
}

#[test]
fn test_kind_mismatch_is_reported() {
    let dialect = SqliteDialect::new();
    let stored_view = TableDescriptor::view("customer", "SELECT 1");
    let err = plan_table(&Customer::describe(), Some(&stored_view), &dialect, None).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::KindMismatch {
            expected: "table",
            found: "view",
            ..
        }
    ));

    let table = live_table::<Purchase>(&dialect);
    let err = plan_table(&LargePurchase::describe(), Some(&table), &dialect, Some("SELECT 1")).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::KindMismatch {
            expected: "view",
            found: "table",
            ..
        }
    ));
}

#[test]
fn test_zero_values_per_type() {
    assert_eq!(SqlType::Boolean.zero_value(), SqlValue::Bool(false));
    assert_eq!(
        SqlType::VarChar(8).zero_value(),
        SqlValue::Text(String::new())
    );
}
