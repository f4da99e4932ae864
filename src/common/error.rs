//! Error types for kerneldb.

use thiserror::Error;

use crate::common::PageId;
use crate::types::{CodecError, DataType};

pub type Result<T> = std::result::Result<T, Error>;

/// Transaction identifier.
pub type TxnId = u64;

/// All possible errors in kerneldb.
///
/// Storage and cache errors propagate unchanged up to the executor, which
/// aborts the statement. Schema and transaction errors reject a statement
/// without any partial effect.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// A page failed to deserialize or its checksum did not match.
    #[error("{page_id} is corrupted: {reason}")]
    PageCorruption { page_id: PageId, reason: String },

    /// Two live frames for one page id, or similar internal breakage.
    ///
    /// This indicates a bug in the buffer pool and should never surface.
    #[error("cache invariant violated: {0}")]
    CacheInvariant(String),

    /// A record id points at a missing or deleted slot.
    #[error("no live record at slot {slot} of {page_id}")]
    RecordNotFound { page_id: PageId, slot: u16 },

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("every frame in the buffer pool is pinned")]
    NoFreeFrames,

    /// The database file cannot grow by another page.
    #[error("database file is full: {limit} pages allocated")]
    StorageFull { limit: u64 },

    /// Attempted to delete or free a page that is still pinned.
    #[error("{0} is still pinned")]
    PagePinned(PageId),

    /// A serialized row does not fit into an empty page.
    #[error("row of {size} bytes exceeds the maximum of {max} bytes")]
    RowTooLarge { size: usize, max: usize },

    /// A row could not be encoded for storage.
    #[error("row encoding failed: {0}")]
    Codec(#[from] CodecError),

    /// Catalog-level failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Transaction state machine failure.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// A single undo step failed; replay stopped there.
    #[error(
        "rollback of transaction {txn_id} incomplete: {completed} step(s) undone, \
         {remaining} left: {source}"
    )]
    RollbackFailure {
        txn_id: TxnId,
        completed: usize,
        remaining: usize,
        #[source]
        source: Box<Error>,
    },

    /// An operator was applied to operands of incompatible types.
    #[error("cannot apply '{op}' to {left} and {right}")]
    IncompatibleTypes {
        op: String,
        left: DataType,
        right: DataType,
    },

    /// Integer arithmetic left the 64-bit range.
    #[error("integer overflow in {0}")]
    NumericOverflow(String),

    /// The plan tree is malformed (wrong node kind in a given position).
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl Error {
    /// Whether the error originated in the disk or cache layer.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::PageNotFound(_)
                | Error::PageCorruption { .. }
                | Error::CacheInvariant(_)
                | Error::NoFreeFrames
                | Error::StorageFull { .. }
        )
    }

    /// Whether the statement can simply be retried or corrected by the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Schema(_)
                | Error::Transaction(_)
                | Error::IncompatibleTypes { .. }
                | Error::InvalidPlan(_)
                | Error::NumericOverflow(_)
                | Error::RowTooLarge { .. }
                | Error::Codec(_)
        )
    }
}

/// Schema violations detected by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    #[error("table '{0}' does not exist")]
    NoSuchTable(String),

    #[error("column '{column}' does not exist in '{table}'")]
    NoSuchColumn { table: String, column: String },

    #[error("column reference '{0}' is ambiguous")]
    AmbiguousColumn(String),

    #[error("column '{column}' is declared twice in '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{0}' must declare at least one column")]
    NoColumns(String),

    #[error("table '{table}' expects {expected} values, got {found}")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        found: DataType,
    },

    #[error("column '{0}' does not accept NULL")]
    NullViolation(String),

    #[error("value for column '{column}' is {len} bytes, limit is {max_len}")]
    ValueTooLong {
        column: String,
        max_len: usize,
        len: usize,
    },
}

/// Violations of the transaction state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction {0} is already active")]
    NestedTransaction(TxnId),

    #[error("no active transaction")]
    NoActiveTransaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(PageId::new(42));
        assert_eq!(format!("{}", err), "page 42 not found");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "every frame in the buffer pool is pinned");

        let err = Error::StorageFull { limit: 3 };
        assert_eq!(format!("{}", err), "database file is full: 3 pages allocated");
        assert!(err.is_storage());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_storage());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_schema_error_is_recoverable() {
        let err: Error = SchemaError::NoSuchTable("users".into()).into();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "table 'users' does not exist");
    }

    #[test]
    fn test_rollback_failure_keeps_source() {
        use std::error::Error as _;

        let err = Error::RollbackFailure {
            txn_id: 3,
            completed: 1,
            remaining: 2,
            source: Box::new(Error::NoFreeFrames),
        };
        assert!(err.to_string().contains("1 step(s) undone"));
        assert!(err.source().is_some());
    }
}
