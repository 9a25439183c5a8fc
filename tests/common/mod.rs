#![allow(dead_code)]

use md5::{Digest, Md5};
use minirel::{Column, DataType, Table, Value};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// Loads `table` into a fresh SQLite table of the same name and shape.
pub fn mirror_into_sqlite(conn: &Connection, table: &Table) {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| {
            let ty = match c.data_type {
                DataType::Integer => "INTEGER",
                DataType::Float => "REAL",
                DataType::Text => "TEXT",
            };
            format!("{} {}", c.name, ty)
        })
        .collect();
    conn.execute(
        &format!("CREATE TABLE {}({})", table.name(), columns.join(", ")),
        [],
    )
    .expect("create sqlite table");

    let placeholders = vec!["?"; table.columns().len()].join(", ");
    let sql = format!("INSERT INTO {} VALUES ({})", table.name(), placeholders);
    let mut stmt = conn.prepare(&sql).expect("prepare insert");
    for row in table.rows() {
        let params: Vec<rusqlite::types::Value> = row.iter().map(to_sqlite).collect();
        stmt.execute(rusqlite::params_from_iter(params))
            .expect("insert into sqlite");
    }
}

fn to_sqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(v) => rusqlite::types::Value::Integer(*v),
        Value::Float(v) => rusqlite::types::Value::Real(*v),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

/// Runs `sql` and renders each row as text cells.
pub fn sqlite_rows(conn: &Connection, sql: &str) -> Vec<Vec<String>> {
    let mut stmt = conn.prepare(sql).expect("prepare query");
    let column_count = stmt.column_count();
    let mut rows = stmt.query([]).expect("run query");
    let mut out = Vec::new();
    while let Some(row) = rows.next().expect("next row") {
        let mut cells = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let cell = match row.get_ref(i).expect("cell") {
                ValueRef::Null => "NULL".to_string(),
                ValueRef::Integer(v) => v.to_string(),
                ValueRef::Real(v) => Value::Float(v).to_string(),
                ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
                ValueRef::Blob(_) => "NULL".to_string(),
            };
            cells.push(cell);
        }
        out.push(cells);
    }
    out
}

pub fn table_rows(table: &Table) -> Vec<Vec<String>> {
    table
        .rows()
        .iter()
        .map(|row| row.iter().map(Value::to_string).collect())
        .collect()
}

/// Order-insensitive digest of a result set.
pub fn multiset_digest(rows: &[Vec<String>]) -> String {
    let mut lines: Vec<String> = rows.iter().map(|r| r.join("|")).collect();
    lines.sort();
    let mut hasher = Md5::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub fn employees() -> Table {
    let mut table = Table::new(
        "emp",
        vec![
            Column::new("id", DataType::Integer).not_null(),
            Column::new("name", DataType::Text),
            Column::new("dept_id", DataType::Integer),
            Column::new("salary", DataType::Float),
        ],
        Some("id"),
    )
    .expect("create emp");
    let rows = [
        (1, "Alice", Some(10), Some(5200.0)),
        (2, "Bob", Some(20), Some(3100.0)),
        (3, "Carol", Some(10), Some(4700.0)),
        (4, "Dan", None, Some(2800.0)),
        (5, "Erin", Some(30), None),
        (6, "Frank", Some(20), Some(3900.0)),
        (7, "Grace", Some(10), Some(6100.0)),
        (8, "Heidi", Some(40), Some(4300.0)),
    ];
    for (id, name, dept, salary) in rows {
        table
            .insert(vec![
                Value::Integer(id),
                Value::from(name),
                Value::from(dept.map(i64::from)),
                Value::from(salary),
            ])
            .expect("insert emp");
    }
    table
}

pub fn departments() -> Table {
    let mut table = Table::new(
        "dept",
        vec![
            Column::new("id", DataType::Integer),
            Column::new("title", DataType::Text),
        ],
        Some("id"),
    )
    .expect("create dept");
    for (id, title) in [(10, "Research"), (20, "Sales"), (30, "Support"), (50, "Legal")] {
        table
            .insert(vec![Value::Integer(id), Value::from(title)])
            .expect("insert dept");
    }
    table
}
