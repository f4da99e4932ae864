//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use kerneldb::buffer::BufferPoolManager;
use kerneldb::catalog::Column;
use kerneldb::storage::DiskManager;
use kerneldb::{Database, DatabaseConfig, EvictionPolicy, PlanNode, Value};
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; it shows up for
/// failing tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub fn create_bpm(pool_size: usize) -> (BufferPoolManager, TempDir) {
    create_bpm_with(pool_size, EvictionPolicy::Lru)
}

pub fn create_bpm_with(pool_size: usize, policy: EvictionPolicy) -> (BufferPoolManager, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
    (BufferPoolManager::with_policy(pool_size, dm, policy), dir)
}

pub fn open_db(dir: &TempDir) -> Database {
    open_db_with(dir, DatabaseConfig::default())
}

pub fn open_db_with(dir: &TempDir, config: DatabaseConfig) -> Database {
    init_tracing();
    Database::open(dir.path().join("kernel.db"), config).unwrap()
}

/// `users(id INTEGER NOT NULL, name TEXT(32))` with Alice, Bob and Charlie.
pub fn create_users(db: &mut Database) {
    db.execute(&PlanNode::CreateTable {
        table: "users".into(),
        columns: vec![Column::integer("id").not_null(), Column::text("name", 32)],
    })
    .unwrap();
    db.execute(&PlanNode::insert_values(
        "users",
        vec![
            vec![Value::Integer(1), Value::from("Alice")],
            vec![Value::Integer(2), Value::from("Bob")],
            vec![Value::Integer(3), Value::from("Charlie")],
        ],
    ))
    .unwrap();
}
