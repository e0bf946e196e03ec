use hive_core::db::migrations::latest_version;
use hive_core::db::{open_db, open_db_in_memory, DbError};
use hive_core::repo::{SqliteBreadcrumbRepository, SqliteZoneRepository};
use hive_core::{RepoError, UnscopedPolicy};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "zones",
        "anchors",
        "anchor_tags",
        "items",
        "captures",
        "breadcrumbs",
        "scan_logs",
        "routesets",
        "routeset_stops",
    ] {
        assert_table_exists(&conn, table);
    }
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "breadcrumbs");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repositories_reject_unmigrated_connections() {
    let conn = Connection::open_in_memory().unwrap();

    let err = SqliteZoneRepository::try_new(&conn, UnscopedPolicy::Creator)
        .err()
        .expect("bare connection must be rejected");
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn repositories_report_missing_tables() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE breadcrumbs;").unwrap();

    let err = SqliteBreadcrumbRepository::try_new(&conn, UnscopedPolicy::Creator)
        .err()
        .expect("missing table must be rejected");
    assert!(matches!(err, RepoError::MissingRequiredTable("breadcrumbs")));
}

#[test]
fn second_active_breadcrumb_for_one_owner_is_unrepresentable() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO anchors (id, anchor_key, name, created_by, created_at, updated_at)
         VALUES ('a1', 'DESK', 'Desk', 'u1', 1, 1);
         INSERT INTO breadcrumbs (id, anchor_id, owner_id, started_at, last_action_at, active)
         VALUES ('b1', 'a1', 'u1', 1, 1, 1);",
    )
    .unwrap();

    let second = conn.execute(
        "INSERT INTO breadcrumbs (id, anchor_id, owner_id, started_at, last_action_at, active)
         VALUES ('b2', 'a1', 'u1', 2, 2, 1);",
        [],
    );
    assert!(second.is_err());

    conn.execute(
        "INSERT INTO breadcrumbs (id, anchor_id, owner_id, started_at, last_action_at, active)
         VALUES ('b3', 'a1', 'u2', 2, 2, 1);",
        [],
    )
    .expect("other owners keep their own active slot");
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
