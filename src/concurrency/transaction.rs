//! Transactions and their undo log.

use std::fmt;

use crate::buffer::BufferPoolManager;
use crate::catalog::{Catalog, TableSchema};
use crate::common::{Error, Result, TxnId};
use crate::storage::{RecordId, TableHeap};
use crate::types::Row;

/// Lifecycle of a transaction. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One mutating operation with enough before-state to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Insert {
        table: String,
        rid: RecordId,
        row: Row,
    },
    /// `new_rid` differs from `old_rid` when the row had to move pages.
    Update {
        table: String,
        old_rid: RecordId,
        new_rid: RecordId,
        before: Row,
        after: Row,
    },
    Delete {
        table: String,
        rid: RecordId,
        row: Row,
    },
    CreateTable {
        table: String,
    },
    /// The table's pages are kept until commit.
    DropTable {
        schema: TableSchema,
    },
}

impl LogEntry {
    pub fn table(&self) -> &str {
        match self {
            LogEntry::Insert { table, .. }
            | LogEntry::Update { table, .. }
            | LogEntry::Delete { table, .. }
            | LogEntry::CreateTable { table } => table,
            LogEntry::DropTable { schema } => &schema.name,
        }
    }

    /// Apply the inverse operation through the storage path.
    pub fn undo(&self, bpm: &BufferPoolManager, catalog: &mut Catalog) -> Result<()> {
        match self {
            LogEntry::Insert { table, rid, .. } => {
                let heap = heap_of(catalog, table)?;
                heap.delete(bpm, *rid)?;
                catalog.adjust_row_count(table, -1);
            }
            LogEntry::Update {
                table,
                old_rid,
                new_rid,
                before,
                ..
            } => {
                let heap = heap_of(catalog, table)?;
                if new_rid != old_rid {
                    heap.delete(bpm, *new_rid)?;
                }
                heap.restore(bpm, *old_rid, before)?;
            }
            LogEntry::Delete { table, rid, row } => {
                let heap = heap_of(catalog, table)?;
                heap.restore(bpm, *rid, row)?;
                catalog.adjust_row_count(table, 1);
            }
            LogEntry::CreateTable { table } => {
                catalog.drop_table(bpm, table, true)?;
            }
            LogEntry::DropTable { schema } => {
                catalog.restore_table(bpm, schema.clone())?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Insert { table, rid, .. } => write!(f, "INSERT {} at {}", table, rid),
            LogEntry::Update {
                table,
                old_rid,
                new_rid,
                ..
            } => write!(f, "UPDATE {} {} -> {}", table, old_rid, new_rid),
            LogEntry::Delete { table, rid, .. } => write!(f, "DELETE {} at {}", table, rid),
            LogEntry::CreateTable { table } => write!(f, "CREATE TABLE {}", table),
            LogEntry::DropTable { schema } => write!(f, "DROP TABLE {}", schema.name),
        }
    }
}

fn heap_of(catalog: &Catalog, table: &str) -> Result<TableHeap> {
    Ok(TableHeap::open(catalog.get_table(table)?.first_page))
}

/// Undo `entries` newest first, stopping at the first failure.
///
/// On failure returns how many entries were undone along with the error.
pub(crate) fn undo_all(
    entries: &[LogEntry],
    bpm: &BufferPoolManager,
    catalog: &mut Catalog,
) -> std::result::Result<(), (usize, Error)> {
    for (done, entry) in entries.iter().rev().enumerate() {
        entry.undo(bpm, catalog).map_err(|e| (done, e))?;
    }
    Ok(())
}

/// A unit of work bound to the session.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    state: TransactionState,
    log: Vec<LogEntry>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Entries recorded so far, oldest first.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub(crate) fn append(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        debug_assert_eq!(self.state, TransactionState::Active);
        self.log.extend(entries);
    }

    pub(crate) fn take_log(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.log)
    }

    pub(crate) fn finish(&mut self, state: TransactionState) {
        self.state = state;
    }
}
