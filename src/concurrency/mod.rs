//! Transaction management.
//!
//! One session, at most one active transaction. Mutations executed inside a
//! transaction append [`LogEntry`] values to its undo log:
//! - commit discards the log
//! - rollback replays it in strict reverse order
//!
//! Outside a transaction every statement commits on its own.

mod transaction;
mod transaction_manager;

pub(crate) use transaction::undo_all;
pub use transaction::{LogEntry, Transaction, TransactionState};
pub use transaction_manager::TransactionManager;
