//! kerneldb - the storage and execution core of a small relational database.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Database                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Plan Executor (execution/)                  │   │
//! │  │  SeqScan | Filter | Project | Sort | Join | Aggregate    │   │
//! │  │           Insert | Update | Delete | DDL                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │               ↓                              ↓                  │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐   │
//! │  │  Catalog (catalog/)      │  │  Undo Log (concurrency/) │   │
//! │  │  bootstrap heap, page 0  │  │  reverse replay          │   │
//! │  └──────────────────────────┘  └──────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │       Buffer Pool (buffer/)  [Runtime Swappable]        │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │    Eviction Policies: LRU | FIFO | CLOCK | LFU  │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  │      BufferPoolManager + Frame + Statistics              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │        DiskManager + slotted Page + TableHeap            │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`types`] - Values and the row codec
//! - [`storage`] - Disk I/O, page format and table heaps
//! - [`buffer`] - Buffer pool management and eviction policies
//! - [`catalog`] - Durable table schemas
//! - [`concurrency`] - Transactions and the undo log
//! - [`execution`] - Plan trees and the operators that run them
//!
//! # Quick Start
//! ```no_run
//! use kerneldb::catalog::Column;
//! use kerneldb::execution::{Expr, PlanNode};
//! use kerneldb::{Database, DatabaseConfig, Value};
//!
//! let mut db = Database::open("my_database.db", DatabaseConfig::default())?;
//! db.execute(&PlanNode::CreateTable {
//!     table: "users".into(),
//!     columns: vec![Column::integer("id"), Column::text("name", 32)],
//! })?;
//! db.execute(&PlanNode::insert_values(
//!     "users",
//!     vec![
//!         vec![Value::Integer(1), Value::from("Alice")],
//!         vec![Value::Integer(2), Value::from("Bob")],
//!     ],
//! ))?;
//!
//! let plan = PlanNode::scan("users")
//!     .filter(Expr::gt(Expr::column("id"), Expr::literal(1)))
//!     .project(["name"]);
//! let names = db.execute(&plan)?;
//! println!("{}", names);
//! # Ok::<(), kerneldb::Error>(())
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod storage;
pub mod types;

mod database;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{DatabaseConfig, Error, FrameId, PageId, Result, SchemaError, TransactionError, TxnId};
pub use database::Database;
pub use types::{DataType, Row, Value};

pub use buffer::{BufferPoolManager, BufferPoolStats, EvictionPolicy, StatsSnapshot};
pub use execution::{ExecutionResult, PlanNode, QueryStream, ResultSet, StatementStatus};
