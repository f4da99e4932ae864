//! End-to-end tests driving plans through a `Database`.

mod common;

use std::collections::BTreeMap;

use common::{create_users, open_db, open_db_with};
use kerneldb::catalog::Column;
use kerneldb::execution::{AggregateExpr, Expr, JoinKind, SortKey};
use kerneldb::{
    DatabaseConfig, Error, EvictionPolicy, ExecutionResult, PlanNode, ResultSet, SchemaError,
    StatementStatus, TransactionError, Value,
};
use tempfile::tempdir;

fn rows(db: &mut kerneldb::Database, plan: PlanNode) -> ResultSet {
    db.execute(&plan).unwrap().into_rows().unwrap()
}

fn record(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_filter_project_in_insertion_order() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);

    let plan = PlanNode::scan("users")
        .filter(Expr::gt(Expr::column("id"), Expr::literal(1)))
        .project(["name"]);
    let result = rows(&mut db, plan);

    assert_eq!(
        result.records(),
        vec![
            record(&[("name", Value::from("Bob"))]),
            record(&[("name", Value::from("Charlie"))]),
        ]
    );
}

#[test]
fn test_group_count_and_average() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    db.execute(&PlanNode::CreateTable {
        table: "scores".into(),
        columns: vec![Column::integer("age"), Column::integer("score")],
    })
    .unwrap();
    db.execute(&PlanNode::insert_values(
        "scores",
        vec![
            vec![Value::Integer(20), Value::Integer(85)],
            vec![Value::Integer(20), Value::Integer(90)],
            vec![Value::Integer(22), Value::Integer(70)],
        ],
    ))
    .unwrap();

    let plan = PlanNode::scan("scores").aggregate(
        ["age"],
        vec![
            AggregateExpr::count_star().alias("count"),
            AggregateExpr::avg("score").alias("avg"),
        ],
    );
    let result = rows(&mut db, plan);

    assert_eq!(result.columns, vec!["age", "count", "avg"]);
    assert_eq!(
        result.records(),
        vec![
            record(&[
                ("age", Value::Integer(20)),
                ("count", Value::Integer(2)),
                ("avg", Value::Float(87.5)),
            ]),
            record(&[
                ("age", Value::Integer(22)),
                ("count", Value::Integer(1)),
                ("avg", Value::Float(70.0)),
            ]),
        ]
    );
}

#[test]
fn test_rolled_back_insert_leaves_no_rows() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    db.execute(&PlanNode::CreateTable {
        table: "t".into(),
        columns: vec![Column::integer("id"), Column::text("name", 8)],
    })
    .unwrap();

    db.execute(&PlanNode::Begin).unwrap();
    let inserted = db
        .execute(&PlanNode::insert_values("t", vec![vec![Value::Integer(1), Value::from("X")]]))
        .unwrap();
    assert_eq!(inserted, ExecutionResult::Affected(1));
    assert!(matches!(
        db.execute(&PlanNode::Rollback).unwrap(),
        ExecutionResult::Status(StatementStatus::RolledBack(_))
    ));

    assert!(rows(&mut db, PlanNode::scan("t")).is_empty());
    assert_eq!(db.catalog().get_table("t").unwrap().row_count, 0);
}

#[test]
fn test_transaction_state_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let mut db = open_db(&dir);
        create_users(&mut db);

        db.execute(&PlanNode::Begin).unwrap();
        db.execute(&PlanNode::Update {
            table: "users".into(),
            assignments: vec![("name".into(), Expr::literal("Bobby"))],
            predicate: Some(Expr::eq(Expr::column("id"), Expr::literal(2))),
        })
        .unwrap();
        db.execute(&PlanNode::Commit).unwrap();

        db.execute(&PlanNode::Begin).unwrap();
        db.execute(&PlanNode::Delete {
            table: "users".into(),
            predicate: None,
        })
        .unwrap();
        db.execute(&PlanNode::insert_values(
            "users",
            vec![vec![Value::Integer(9), Value::from("Mallory")]],
        ))
        .unwrap();
        db.execute(&PlanNode::Rollback).unwrap();
        db.close().unwrap();
    }

    let mut db = open_db(&dir);
    let result = rows(&mut db, PlanNode::scan("users").sort(vec![SortKey::asc("id")]));
    assert_eq!(
        result.column("name").unwrap(),
        vec![Value::from("Alice"), Value::from("Bobby"), Value::from("Charlie")]
    );
    assert_eq!(db.catalog().get_table("users").unwrap().row_count, 3);
}

#[test]
fn test_close_rolls_back_open_transaction() {
    let dir = tempdir().unwrap();
    {
        let mut db = open_db(&dir);
        create_users(&mut db);
        db.execute(&PlanNode::Begin).unwrap();
        db.execute(&PlanNode::Delete {
            table: "users".into(),
            predicate: Some(Expr::eq(Expr::column("name"), Expr::literal("Alice"))),
        })
        .unwrap();
        // Dropped without commit.
    }

    let mut db = open_db(&dir);
    assert_eq!(rows(&mut db, PlanNode::scan("users")).len(), 3);
}

#[test]
fn test_transaction_statement_errors() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    assert!(matches!(
        db.execute(&PlanNode::Commit),
        Err(Error::Transaction(TransactionError::NoActiveTransaction))
    ));
    assert!(matches!(
        db.execute(&PlanNode::Rollback),
        Err(Error::Transaction(TransactionError::NoActiveTransaction))
    ));

    db.execute(&PlanNode::Begin).unwrap();
    assert!(matches!(
        db.execute(&PlanNode::Begin),
        Err(Error::Transaction(TransactionError::NestedTransaction(_)))
    ));
    assert!(db.in_transaction());
}

#[test]
fn test_dropped_table_comes_back_on_rollback() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);

    db.execute(&PlanNode::Begin).unwrap();
    assert_eq!(
        db.execute(&PlanNode::DropTable {
            table: "users".into(),
            if_exists: false
        })
        .unwrap(),
        ExecutionResult::Status(StatementStatus::TableDropped("users".into()))
    );
    assert!(matches!(
        db.execute(&PlanNode::scan("users")),
        Err(Error::Schema(SchemaError::NoSuchTable(_)))
    ));
    db.execute(&PlanNode::Rollback).unwrap();

    assert_eq!(rows(&mut db, PlanNode::scan("users")).len(), 3);
}

#[test]
fn test_created_table_disappears_on_rollback() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);

    db.execute(&PlanNode::Begin).unwrap();
    create_users(&mut db);
    db.execute(&PlanNode::Rollback).unwrap();

    assert!(!db.catalog().contains("users"));
    create_users(&mut db);
    assert_eq!(rows(&mut db, PlanNode::scan("users")).len(), 3);
}

#[test]
fn test_type_mismatch_is_reported() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);

    let plan = PlanNode::scan("users").filter(Expr::eq(Expr::column("name"), Expr::literal(1)));
    assert!(matches!(db.execute(&plan), Err(Error::IncompatibleTypes { .. })));

    let bad_row = PlanNode::insert_values("users", vec![vec![Value::from("four"), Value::from("Dan")]]);
    assert!(matches!(
        db.execute(&bad_row),
        Err(Error::Schema(SchemaError::TypeMismatch { .. }))
    ));
    assert_eq!(rows(&mut db, PlanNode::scan("users")).len(), 3);
}

#[test]
fn test_multi_row_insert_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);

    let plan = PlanNode::insert_values(
        "users",
        vec![
            vec![Value::Integer(4), Value::from("Dan")],
            vec![Value::Null, Value::from("Eve")],
        ],
    );
    assert!(matches!(
        db.execute(&plan),
        Err(Error::Schema(SchemaError::NullViolation(_)))
    ));
    assert_eq!(rows(&mut db, PlanNode::scan("users")).len(), 3);
}

#[test]
fn test_join_sort_and_outer_padding() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);
    db.execute(&PlanNode::CreateTable {
        table: "orders".into(),
        columns: vec![Column::integer("user_id"), Column::integer("amount")],
    })
    .unwrap();
    db.execute(&PlanNode::insert_values(
        "orders",
        vec![
            vec![Value::Integer(1), Value::Integer(50)],
            vec![Value::Integer(3), Value::Integer(20)],
            vec![Value::Integer(1), Value::Integer(30)],
        ],
    ))
    .unwrap();

    let inner = PlanNode::scan("users")
        .join(PlanNode::scan("orders"), JoinKind::Inner, vec![("id", "user_id")])
        .sort(vec![SortKey::desc("amount")])
        .project(["name", "amount"]);
    let result = rows(&mut db, inner);
    assert_eq!(
        result.column("amount").unwrap(),
        vec![Value::Integer(50), Value::Integer(30), Value::Integer(20)]
    );
    assert_eq!(
        result.column("name").unwrap(),
        vec![Value::from("Alice"), Value::from("Alice"), Value::from("Charlie")]
    );

    let outer = PlanNode::scan("users")
        .join(PlanNode::scan("orders"), JoinKind::LeftOuter, vec![("id", "user_id")])
        .filter(Expr::eq(Expr::column("name"), Expr::literal("Bob")))
        .project(["name", "amount"]);
    let result = rows(&mut db, outer);
    assert_eq!(
        result.records(),
        vec![record(&[("name", Value::from("Bob")), ("amount", Value::Null)])]
    );
}

#[test]
fn test_abandoned_query_releases_pins() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);
    let first_page = db.catalog().get_table("users").unwrap().first_page;

    {
        let mut stream = db.query(&PlanNode::scan("users")).unwrap();
        assert_eq!(stream.columns(), ["id", "name"]);
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first[1], Value::from("Alice"));
        assert_eq!(db.buffer_pool().get_pin_count(first_page), Some(1));
    }
    assert_eq!(db.buffer_pool().get_pin_count(first_page), Some(0));
    db.buffer_pool().check_invariants().unwrap();
}

#[test]
fn test_large_table_with_small_pool() {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig::default()
        .with_pool_size(3)
        .with_eviction_policy(EvictionPolicy::Clock)
        .with_prefetch(true);
    let mut db = open_db_with(&dir, config);
    db.execute(&PlanNode::CreateTable {
        table: "items".into(),
        columns: vec![Column::integer("id").not_null(), Column::text("label", 200)],
    })
    .unwrap();

    let label = "x".repeat(200);
    let batch: Vec<Vec<Value>> = (0..300)
        .map(|i| vec![Value::Integer(i), Value::from(label.as_str())])
        .collect();
    assert_eq!(
        db.execute(&PlanNode::insert_values("items", batch)).unwrap(),
        ExecutionResult::Affected(300)
    );

    let counted = rows(
        &mut db,
        PlanNode::scan("items").aggregate(Vec::<String>::new(), vec![AggregateExpr::count_star()]),
    );
    assert_eq!(counted.rows[0][0], Value::Integer(300));

    let stats = db.stats();
    assert!(stats.evictions > 0);
    assert!(stats.pages_read > 0);
    assert!(db.buffer_pool().resident_page_count() <= 3);
}

#[test]
fn test_unknown_names() {
    let dir = tempdir().unwrap();
    let mut db = open_db(&dir);
    create_users(&mut db);

    assert!(matches!(
        db.execute(&PlanNode::scan("ghosts")),
        Err(Error::Schema(SchemaError::NoSuchTable(_)))
    ));
    assert!(matches!(
        db.execute(&PlanNode::scan("users").project(["age"])),
        Err(Error::Schema(SchemaError::NoSuchColumn { .. }))
    ));
    assert!(matches!(
        db.execute(&PlanNode::CreateTable {
            table: "USERS".into(),
            columns: vec![Column::integer("id")],
        }),
        Err(Error::Schema(SchemaError::DuplicateTable(_)))
    ));
}
