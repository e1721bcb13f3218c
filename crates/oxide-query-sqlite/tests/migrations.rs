mod common;

use common::{
    memory_db, ran, BigSample, PersonUniqueAge, PersonV1, PersonV2, PersonV3, PersonV4,
    RecordingProvider, Sample, SampleWithoutNote,
};
use oxide_query::migrate::ObjectKind;
use oxide_query::{Error, Insert, MigrationError, Select, Strategy};
use oxide_query_sqlite::catalog::inspect;

#[tokio::test]
async fn test_create_then_idempotent() {
    let provider = RecordingProvider::memory().await;
    let db = provider.clone().database();

    let created = db.update_schema::<Sample>().await.unwrap();
    assert_eq!(created.strategy, Strategy::Create);
    assert!(ran(&provider.statements(), "CREATE TABLE \"sample\""));

    provider.clear();
    let again = db.update_schema::<Sample>().await.unwrap();
    assert!(again.is_empty());
    assert_eq!(again.strategy, Strategy::Unchanged);
    let statements = provider.statements();
    assert!(!statements.is_empty());
    assert!(statements.iter().all(|s| s.starts_with("SELECT")));
}

#[tokio::test]
async fn test_add_not_null_column_rebuilds_with_zero_fill() {
    let db = memory_db().await;
    db.update_schema::<PersonV1>().await.unwrap();
    let people = [
        PersonV1 {
            id: 0,
            name: String::from("ada"),
        },
        PersonV1 {
            id: 0,
            name: String::from("alan"),
        },
    ];
    db.execute(&Insert::new().values(&people), &[]).await.unwrap();

    let update = db.update_schema::<PersonV2>().await.unwrap();
    assert_eq!(update.strategy, Strategy::Recreate);
    assert!(update.statements[0].starts_with("CREATE TABLE \"_person_new\""));

    let rows = db
        .fetch_all(&Select::<PersonV2>::new().order_by(PersonV2::id().asc()))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].name, "ada");
    assert_eq!(rows[0].age, 0);
    assert_eq!(rows[1].name, "alan");

    assert!(db.update_schema::<PersonV2>().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drop_column_preserves_rows_and_keys() {
    let db = memory_db().await;
    db.update_schema::<PersonV2>().await.unwrap();
    let people = [
        PersonV2 {
            id: 0,
            name: String::from("ada"),
            age: 36,
        },
        PersonV2 {
            id: 0,
            name: String::from("alan"),
            age: 41,
        },
    ];
    db.execute(&Insert::new().values(&people), &[]).await.unwrap();

    let update = db.update_schema::<PersonV3>().await.unwrap();
    assert_eq!(update.strategy, Strategy::Recreate);

    let rows = db
        .fetch_all(&Select::<PersonV3>::new().order_by(PersonV3::id().asc()))
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![PersonV3 { id: 1, age: 36 }, PersonV3 { id: 2, age: 41 }]
    );

    let provider = db.provider().clone();
    let live = inspect(&provider, "person").await.unwrap().unwrap();
    assert!(live.column("name").is_none());
    assert_eq!(live.indices.len(), 1);
    assert_eq!(live.indices[0].columns, vec![String::from("age")]);
    assert!(inspect(&provider, "_person_new").await.unwrap().is_none());

    assert!(db.update_schema::<PersonV3>().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nullable_column_is_added_in_place() {
    let db = memory_db().await;
    db.update_schema::<PersonV3>().await.unwrap();
    db.execute(&Insert::new().value(&PersonV3 { id: 0, age: 5 }), &[])
        .await
        .unwrap();

    let update = db.update_schema::<PersonV4>().await.unwrap();
    assert_eq!(update.strategy, Strategy::InPlace);
    assert_eq!(update.statements.len(), 1);
    assert!(update.statements[0].contains("ADD COLUMN \"nickname\""));

    let rows = db.fetch_all(&Select::<PersonV4>::new()).await.unwrap();
    assert_eq!(rows[0].age, 5);
    assert_eq!(rows[0].nickname, None);
}

#[tokio::test]
async fn test_failed_rebuild_rolls_back() {
    let db = memory_db().await;
    db.update_schema::<PersonV4>().await.unwrap();
    let twins = [
        PersonV4 {
            age: 30,
            ..PersonV4::default()
        },
        PersonV4 {
            age: 30,
            ..PersonV4::default()
        },
    ];
    db.execute(&Insert::new().values(&twins), &[]).await.unwrap();

    let err = db.update_schema::<PersonUniqueAge>().await.unwrap_err();
    match err {
        Error::Migration(MigrationError::Recreate { table, source }) => {
            assert_eq!(table, "person");
            assert!(source.downcast_ref::<sqlx::Error>().is_some());
        }
        other => panic!("expected a recreate failure, got {other:?}"),
    }

    // The old shape is intact and nothing was lost.
    assert!(db.update_schema::<PersonV4>().await.unwrap().is_empty());
    let rows = db.fetch_all(&Select::<PersonV4>::new()).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_failed_rollback_keeps_migration_error() {
    let provider = RecordingProvider::memory().await;
    let db = provider.clone().database();
    db.update_schema::<PersonV4>().await.unwrap();
    let twins = [
        PersonV4 {
            age: 30,
            ..PersonV4::default()
        },
        PersonV4 {
            age: 30,
            ..PersonV4::default()
        },
    ];
    db.execute(&Insert::new().values(&twins), &[]).await.unwrap();

    provider.fail_rollbacks();
    let err = db.update_schema::<PersonUniqueAge>().await.unwrap_err();
    assert!(
        matches!(
            &err,
            Error::Migration(MigrationError::Recreate { table, source })
                if table == "person" && source.downcast_ref::<sqlx::Error>().is_some()
        ),
        "expected the rebuild failure, got {err:?}"
    );
    assert_eq!(db.fetch_all(&Select::<PersonV4>::new()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unchanged_view_is_not_recreated() {
    let provider = RecordingProvider::memory().await;
    let db = provider.clone().database();
    db.update_schema::<Sample>().await.unwrap();

    let created = db.update_schema::<BigSample>().await.unwrap();
    assert_eq!(created.strategy, Strategy::Create);
    assert!(created.statements[0].starts_with("CREATE VIEW \"big_sample\""));

    provider.clear();
    let again = db.update_schema::<BigSample>().await.unwrap();
    assert!(again.is_empty());
    assert!(!ran(&provider.statements(), "DROP VIEW"));
}

#[tokio::test]
async fn test_rebuild_keeps_dependent_view_readable() {
    let db = memory_db().await;
    db.update_schema::<Sample>().await.unwrap();
    db.update_schema::<BigSample>().await.unwrap();
    let samples = [Sample::with(7, "small"), Sample::with(75, "big")];
    db.execute(&Insert::new().values(&samples), &[]).await.unwrap();

    let update = db.update_schema::<SampleWithoutNote>().await.unwrap();
    assert_eq!(update.strategy, Strategy::Recreate);

    let rows = db.fetch_all(&Select::<BigSample>::new()).await.unwrap();
    assert_eq!(rows, vec![BigSample { id: 2, integer: 75 }]);
    assert!(db.update_schema::<BigSample>().await.unwrap().is_empty());
    assert!(inspect(db.provider(), "_sample_new").await.unwrap().is_none());
}

#[tokio::test]
async fn test_table_declared_over_view_is_rejected() {
    let db = memory_db().await;
    db.execute_statement(&oxide_query::Statement::new(
        "CREATE VIEW \"sample\" AS SELECT 1 AS \"id\"",
    ))
    .await
    .unwrap();

    let err = db.update_schema::<Sample>().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Migration(MigrationError::KindMismatch {
            expected: "table",
            found: "view",
            ..
        })
    ));
    let live = inspect(db.provider(), "sample").await.unwrap().unwrap();
    assert_eq!(live.kind, ObjectKind::View);
}

#[tokio::test]
async fn test_schema_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = common::file_db(&dir).await;
        db.update_schema::<PersonV3>().await.unwrap();
        db.execute(&Insert::new().value(&PersonV3 { id: 0, age: 9 }), &[])
            .await
            .unwrap();
        db.provider().pool().close().await;
    }

    let db = common::file_db(&dir).await;
    assert!(db.update_schema::<PersonV3>().await.unwrap().is_empty());
    let update = db.update_schema::<PersonV4>().await.unwrap();
    assert_eq!(update.strategy, Strategy::InPlace);
    let rows = db.fetch_all(&Select::<PersonV4>::new()).await.unwrap();
    assert_eq!(rows[0].age, 9);
}
