mod common;

use common::{employees, mirror_into_sqlite, sqlite_rows, table_rows};
use minirel::storage::TableSnapshot;
use minirel::{Column, DataType, Engine, SelectQuery, Table, Value};
use rusqlite::Connection;

fn compare_with_sqlite(condition: &str, sql_where: &str) {
    let table = employees();
    let conn = Connection::open_in_memory().expect("open sqlite");
    mirror_into_sqlite(&conn, &table);

    let ours = Engine::default()
        .select(&table, &SelectQuery::new("id, name").filter(condition))
        .expect("select");
    let theirs = sqlite_rows(
        &conn,
        &format!("SELECT id, name FROM emp WHERE {} ORDER BY rowid", sql_where),
    );
    assert_eq!(table_rows(&ours), theirs, "condition {}", condition);
}

#[test]
fn comparisons_match_sqlite() {
    compare_with_sqlite("salary > 4000", "salary > 4000");
    compare_with_sqlite("4000 >= salary", "4000 >= salary");
    compare_with_sqlite("dept_id = 10", "dept_id = 10");
    compare_with_sqlite("id <= 3", "id <= 3");
    compare_with_sqlite("name < 'D'", "name < 'D'");
}

#[test]
fn compound_operators_match_sqlite() {
    compare_with_sqlite("dept_id IN (20, 40)", "dept_id IN (20, 40)");
    compare_with_sqlite("salary BETWEEN 3000 AND 5000", "salary BETWEEN 3000 AND 5000");
    compare_with_sqlite("name BETWEEN B AND E", "name BETWEEN 'B' AND 'E'");
    compare_with_sqlite("name LIKE '%a%'", "name GLOB '*a*'");
    compare_with_sqlite("name LIKE '_r%'", "name GLOB '?r*'");
}

#[test]
fn like_is_a_full_match() {
    let table = employees();
    let engine = Engine::default();
    let result = engine
        .select(&table, &SelectQuery::new("name").filter("name LIKE 'A%'"))
        .expect("select");
    assert_eq!(table_rows(&result), vec![vec!["Alice".to_string()]]);

    let result = engine
        .select(&table, &SelectQuery::new("name").filter("name LIKE 'lic'"))
        .expect("select");
    assert!(result.rows().is_empty());
}

#[test]
fn projecting_a_null_value_keeps_the_row() {
    let table = employees();
    let conn = Connection::open_in_memory().expect("open sqlite");
    mirror_into_sqlite(&conn, &table);

    let result = Engine::default()
        .select(&table, &SelectQuery::new("salary"))
        .expect("select");
    assert_eq!(result.live_count(), 8);
    assert_eq!(result.rows()[4], vec![Value::Null]);
    assert_eq!(
        table_rows(&result),
        sqlite_rows(&conn, "SELECT salary FROM emp ORDER BY rowid")
    );
}

#[test]
fn tombstones_are_invisible_but_keep_their_slot() {
    let mut table = employees();
    let deleted = table.delete_where(Some("dept_id = 20")).expect("delete");
    assert_eq!(deleted, vec![1, 5]);
    assert_eq!(table.len(), 8);
    assert_eq!(table.live_count(), 6);

    let engine = Engine::default();
    let result = engine
        .select(&table, &SelectQuery::new("*"))
        .expect("select");
    assert_eq!(result.rows(), table.rows());
    assert_eq!(result.len(), 6);

    let id = table
        .insert(vec![
            Value::Integer(9),
            Value::from("Ivan"),
            Value::Integer(20),
            Value::Float(3300.0),
        ])
        .expect("insert");
    assert_eq!(id, 5);
    assert_eq!(table.len(), 8);
}

#[test]
fn system_tables_delete_physically() {
    let mut catalog = Table::new(
        "meta_tables",
        vec![
            Column::new("table_name", DataType::Text),
            Column::new("columns", DataType::Integer),
        ],
        Some("table_name"),
    )
    .expect("create catalog");
    catalog
        .insert(vec![Value::from("emp"), Value::Integer(4)])
        .expect("insert");
    catalog
        .insert(vec![Value::from("dept"), Value::Integer(2)])
        .expect("insert");
    catalog
        .delete_where(Some("table_name = emp"))
        .expect("delete");
    assert_eq!(catalog.len(), 1);
    assert!(catalog.insert_stack().is_empty());
}

#[test]
fn snapshot_round_trips_through_json() {
    let mut table = employees();
    table.delete_where(Some("id = 4")).expect("delete");
    let json = serde_json::to_string(&table.snapshot()).expect("serialize");
    let snapshot: TableSnapshot = serde_json::from_str(&json).expect("deserialize");
    let restored = Table::from_snapshot(snapshot).expect("restore");
    assert_eq!(restored, table);
}

#[test]
fn update_and_cast_follow_constraints() {
    let mut table = employees();
    let updated = table
        .update_where("salary", Value::Float(5000.0), Some("dept_id = 10"))
        .expect("update");
    assert_eq!(updated, 3);

    table.cast_column("salary", DataType::Integer).expect("cast");
    let result = Engine::default()
        .select(&table, &SelectQuery::new("salary").filter("id = 1"))
        .expect("select");
    assert_eq!(result.rows(), vec![vec![Value::Integer(5000)]]);
    assert_eq!(result.column_types(), vec![DataType::Integer]);

    assert!(table.cast_column("name", DataType::Integer).is_err());
    assert_eq!(table.column_types()[1], DataType::Text);
}
