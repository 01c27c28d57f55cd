use std::sync::Arc;
use std::time::Duration;

use granite_bin::catalog::TableInfo;
use granite_bin::executor::{
    AggregateExpr, AggregateOp, Executor, HashAggregateExecutor, HashJoinExecutor, InsertExecutor,
    SeqScanExecutor,
};
use granite_bin::types::{Column, DataType, Row, Value};
use granite_bin::Database;
use strata::Config;
use tempfile::tempdir;

fn test_config() -> Config {
    Config {
        buffer_pool_size: 128,
        log_timeout: Duration::from_millis(50),
        enable_logging: true,
        ..Config::default()
    }
}

fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::open(
        &test_config(),
        dir.path().join("test.db"),
        dir.path().join("test.log"),
    )
    .unwrap()
}

fn users_schema() -> Vec<Column> {
    vec![
        Column::new("id", DataType::Int),
        Column::new("name", DataType::Text),
        Column::new("dept", DataType::Int),
    ]
}

fn seed_users(db: &Database) -> Arc<TableInfo> {
    let mut txn = db.tm.begin();
    let table = db
        .catalog
        .lock()
        .unwrap()
        .create_table("users", users_schema(), &mut txn)
        .unwrap();

    let rows: Vec<Row> = vec![
        vec![Value::Int(1), Value::Text("ada".into()), Value::Int(10)],
        vec![Value::Int(2), Value::Text("grace".into()), Value::Int(20)],
        vec![Value::Int(3), Value::Text("edsger".into()), Value::Int(10)],
        vec![Value::Int(4), Value::Text("barbara".into()), Value::Int(20)],
        vec![Value::Int(5), Value::Text("tony".into()), Value::Int(10)],
    ];
    let mut insert = InsertExecutor::new(Arc::clone(&table), rows, &mut txn);
    insert.init().unwrap();
    assert!(insert.next().unwrap().is_none());
    assert_eq!(insert.rows_inserted(), 5);
    drop(insert);
    db.tm.commit(&mut txn);
    table
}

fn drain(mut executor: impl Executor) -> Vec<Row> {
    executor.init().unwrap();
    let mut rows = Vec::new();
    while let Some(row) = executor.next().unwrap() {
        rows.push(row);
    }
    rows
}

#[test]
fn seq_scan_returns_all_rows_in_order() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);
    let table = seed_users(&db);

    let rows = drain(SeqScanExecutor::new(table, None));
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0][1], Value::Text("ada".into()));
    assert_eq!(rows[4][0], Value::Int(5));

    db.shutdown().unwrap();
}

#[test]
fn seq_scan_applies_predicate() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);
    let table = seed_users(&db);

    let rows = drain(SeqScanExecutor::new(
        table,
        Some(Box::new(|row: &Row| row[2] == Value::Int(10))),
    ));
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r[2] == Value::Int(10)));

    db.shutdown().unwrap();
}

#[test]
fn aggregation_groups_and_folds() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);
    let table = seed_users(&db);

    let scan = SeqScanExecutor::new(table, None);
    let agg = HashAggregateExecutor::new(
        Box::new(scan),
        vec![2],
        vec![
            AggregateExpr {
                op: AggregateOp::Count,
                column: 0,
                alias: "cnt".into(),
            },
            AggregateExpr {
                op: AggregateOp::Sum,
                column: 0,
                alias: "id_sum".into(),
            },
            AggregateExpr {
                op: AggregateOp::Max,
                column: 1,
                alias: "last_name".into(),
            },
        ],
    );

    let rows = drain(agg);
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Int(10),
                Value::Int(3),
                Value::Int(9),
                Value::Text("tony".into())
            ],
            vec![
                Value::Int(20),
                Value::Int(2),
                Value::Int(6),
                Value::Text("grace".into())
            ],
        ]
    );

    db.shutdown().unwrap();
}

#[test]
fn hash_join_matches_on_keys() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);
    let users = seed_users(&db);

    let mut txn = db.tm.begin();
    let depts = db
        .catalog
        .lock()
        .unwrap()
        .create_table(
            "depts",
            vec![
                Column::new("dept_id", DataType::Int),
                Column::new("dept_name", DataType::Text),
            ],
            &mut txn,
        )
        .unwrap();
    let dept_rows: Vec<Row> = vec![
        vec![Value::Int(10), Value::Text("storage".into())],
        vec![Value::Int(20), Value::Text("recovery".into())],
        vec![Value::Int(30), Value::Text("empty".into())],
    ];
    let mut insert = InsertExecutor::new(Arc::clone(&depts), dept_rows, &mut txn);
    insert.init().unwrap();
    insert.next().unwrap();
    drop(insert);
    db.tm.commit(&mut txn);

    let left = SeqScanExecutor::new(users, None);
    let right = SeqScanExecutor::new(depts, None);
    let join = HashJoinExecutor::new(
        Box::new(left),
        Box::new(right),
        vec![2],
        vec![0],
        Arc::clone(&db.bpm),
    );

    let mut rows = drain(join);
    rows.sort();
    assert_eq!(rows.len(), 5);
    // Every joined row carries the department name matching its dept id.
    for row in &rows {
        match row[2] {
            Value::Int(10) => assert_eq!(row[4], Value::Text("storage".into())),
            Value::Int(20) => assert_eq!(row[4], Value::Text("recovery".into())),
            _ => panic!("unexpected dept in {row:?}"),
        }
        assert_eq!(row[2], row[3]);
    }

    db.shutdown().unwrap();
}

#[test]
fn inserted_rows_survive_restart_via_recovery() {
    let dir = tempdir().unwrap();
    let first_page_id;
    {
        let db = open_db(&dir);
        let table = seed_users(&db);
        first_page_id = table.heap.first_page_id();
        // Crash: no shutdown, no page flush. The commit already forced
        // the log.
        if let Some(log) = &db.log {
            log.stop_flush_thread();
        }
    }

    let db = open_db(&dir);
    let table = db
        .catalog
        .lock()
        .unwrap()
        .attach_table("users", users_schema(), first_page_id);
    let rows = drain(SeqScanExecutor::new(table, None));
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1][1], Value::Text("grace".into()));

    db.shutdown().unwrap();
}
