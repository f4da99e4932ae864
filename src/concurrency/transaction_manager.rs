//! Transaction boundaries for the single session.

use tracing::{info, warn};

use super::transaction::{undo_all, LogEntry, Transaction, TransactionState};
use crate::buffer::BufferPoolManager;
use crate::catalog::Catalog;
use crate::common::{Error, Result, TransactionError, TxnId};
use crate::storage::TableHeap;

/// Tracks the (at most one) active transaction and its undo log.
///
/// Commit discards the log; rollback replays it newest first through the
/// regular storage path. Durability is whatever the buffer pool has flushed.
#[derive(Debug)]
pub struct TransactionManager {
    next_txn_id: TxnId,
    active: Option<Transaction>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: 1,
            active: None,
        }
    }

    /// Start a transaction.
    ///
    /// # Errors
    /// - `TransactionError::NestedTransaction` if one is already active
    pub fn begin(&mut self) -> Result<TxnId> {
        if let Some(txn) = &self.active {
            return Err(TransactionError::NestedTransaction(txn.id()).into());
        }
        let id = self.next_txn_id;
        self.next_txn_id += 1;
        self.active = Some(Transaction::new(id));
        info!(txn_id = id, "transaction started");
        Ok(id)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Transaction> {
        self.active.as_ref()
    }

    /// Append entries to the active transaction's log.
    ///
    /// Returns `false` (and drops the entries) in autocommit mode.
    pub fn record(&mut self, entries: Vec<LogEntry>) -> bool {
        match &mut self.active {
            Some(txn) => {
                txn.append(entries);
                true
            }
            None => false,
        }
    }

    /// Commit the active transaction and discard its log.
    ///
    /// Pages of tables dropped inside the transaction are released here;
    /// failing to zero-fill one is logged and does not undo the commit.
    pub fn commit(&mut self, bpm: &BufferPoolManager) -> Result<Transaction> {
        let mut txn = self
            .active
            .take()
            .ok_or(TransactionError::NoActiveTransaction)?;

        for entry in txn.take_log() {
            if let LogEntry::DropTable { schema } = entry {
                if let Err(e) = TableHeap::open(schema.first_page).free(bpm) {
                    warn!(table = %schema.name, error = %e, "could not release dropped table pages");
                }
            }
        }

        txn.finish(TransactionState::Committed);
        info!(txn_id = txn.id(), "transaction committed");
        Ok(txn)
    }

    /// Roll back the active transaction by replaying its log in reverse.
    ///
    /// The transaction ends aborted either way.
    ///
    /// # Errors
    /// - `TransactionError::NoActiveTransaction` if none is active
    /// - `Error::RollbackFailure` if an undo step failed; the steps after it
    ///   were not attempted
    pub fn rollback(&mut self, bpm: &BufferPoolManager, catalog: &mut Catalog) -> Result<Transaction> {
        let mut txn = self
            .active
            .take()
            .ok_or(TransactionError::NoActiveTransaction)?;

        let log = txn.take_log();
        let outcome = undo_all(&log, bpm, catalog);
        txn.finish(TransactionState::Aborted);

        match outcome {
            Ok(()) => {
                info!(txn_id = txn.id(), undone = log.len(), "transaction rolled back");
                Ok(txn)
            }
            Err((completed, source)) => {
                let remaining = log.len() - completed;
                warn!(
                    txn_id = txn.id(),
                    completed,
                    remaining,
                    error = %source,
                    "rollback incomplete"
                );
                Err(Error::RollbackFailure {
                    txn_id: txn.id(),
                    completed,
                    remaining,
                    source: Box::new(source),
                })
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::storage::{DiskManager, RecordId};
    use crate::types::{Row, Value};
    use tempfile::tempdir;

    fn setup() -> (BufferPoolManager, Catalog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let bpm = BufferPoolManager::new(8, DiskManager::create(dir.path().join("t.db")).unwrap());
        let mut catalog = Catalog::bootstrap(&bpm).unwrap();
        catalog
            .create_table(&bpm, "t", vec![Column::integer("id"), Column::text("name", 16)])
            .unwrap();
        (bpm, catalog, dir)
    }

    fn row(id: i64, name: &str) -> Row {
        Row::new(vec![Value::Integer(id), Value::from(name)])
    }

    fn rows(bpm: &BufferPoolManager, catalog: &Catalog) -> Vec<Row> {
        let heap = TableHeap::open(catalog.get_table("t").unwrap().first_page);
        heap.scan(bpm).unwrap().into_iter().map(|(_, r)| r).collect()
    }

    #[test]
    fn test_state_machine() {
        let (bpm, mut catalog, _dir) = setup();
        let mut tm = TransactionManager::new();

        assert!(matches!(
            tm.commit(&bpm),
            Err(Error::Transaction(TransactionError::NoActiveTransaction))
        ));

        let id = tm.begin().unwrap();
        assert!(matches!(
            tm.begin(),
            Err(Error::Transaction(TransactionError::NestedTransaction(active))) if active == id
        ));

        let txn = tm.commit(&bpm).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.log().is_empty());
        assert!(!tm.is_active());

        let next = tm.begin().unwrap();
        assert!(next > id);
        let txn = tm.rollback(&bpm, &mut catalog).unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_rollback_replays_in_reverse() {
        let (bpm, mut catalog, _dir) = setup();
        let mut heap = TableHeap::open(catalog.get_table("t").unwrap().first_page);
        let kept = heap.insert(&bpm, &row(1, "Alice")).unwrap();

        let mut tm = TransactionManager::new();
        tm.begin().unwrap();

        let inserted = heap.insert(&bpm, &row(2, "Bob")).unwrap();
        let updated = heap.update(&bpm, kept, &row(1, "Alicia")).unwrap();
        let removed = heap.delete(&bpm, inserted).unwrap();
        tm.record(vec![
            LogEntry::Insert {
                table: "t".into(),
                rid: inserted,
                row: row(2, "Bob"),
            },
            LogEntry::Update {
                table: "t".into(),
                old_rid: kept,
                new_rid: updated,
                before: row(1, "Alice"),
                after: row(1, "Alicia"),
            },
            LogEntry::Delete {
                table: "t".into(),
                rid: inserted,
                row: removed,
            },
        ]);

        tm.rollback(&bpm, &mut catalog).unwrap();
        assert_eq!(rows(&bpm, &catalog), vec![row(1, "Alice")]);
    }

    #[test]
    fn test_failed_undo_step_is_reported() {
        let (bpm, mut catalog, _dir) = setup();
        let mut tm = TransactionManager::new();
        let id = tm.begin().unwrap();

        let mut heap = TableHeap::open(catalog.get_table("t").unwrap().first_page);
        let rid = heap.insert(&bpm, &row(1, "x")).unwrap();
        tm.record(vec![
            LogEntry::Insert {
                table: "t".into(),
                rid,
                row: row(1, "x"),
            },
            // Points at a slot that never existed.
            LogEntry::Insert {
                table: "t".into(),
                rid: RecordId::new(rid.page_id, 40),
                row: row(9, "ghost"),
            },
        ]);

        match tm.rollback(&bpm, &mut catalog) {
            Err(Error::RollbackFailure {
                txn_id,
                completed,
                remaining,
                ..
            }) => {
                assert_eq!(txn_id, id);
                assert_eq!(completed, 0);
                assert_eq!(remaining, 2);
            }
            other => panic!("expected rollback failure, got {:?}", other),
        }
        assert!(!tm.is_active());
        // Replay stopped before the first entry.
        assert_eq!(rows(&bpm, &catalog), vec![row(1, "x")]);
    }

    #[test]
    fn test_drop_table_is_undone_on_original_pages() {
        let (bpm, mut catalog, _dir) = setup();
        let mut heap = TableHeap::open(catalog.get_table("t").unwrap().first_page);
        heap.insert(&bpm, &row(1, "Alice")).unwrap();

        let mut tm = TransactionManager::new();
        tm.begin().unwrap();
        let schema = catalog.drop_table(&bpm, "t", false).unwrap();
        tm.record(vec![LogEntry::DropTable { schema }]);
        assert!(!catalog.contains("t"));

        tm.rollback(&bpm, &mut catalog).unwrap();
        assert_eq!(rows(&bpm, &catalog), vec![row(1, "Alice")]);
    }

    #[test]
    fn test_commit_releases_dropped_pages() {
        let (bpm, mut catalog, _dir) = setup();
        let first_page = catalog.get_table("t").unwrap().first_page;

        let mut tm = TransactionManager::new();
        tm.begin().unwrap();
        let schema = catalog.drop_table(&bpm, "t", false).unwrap();
        tm.record(vec![LogEntry::DropTable { schema }]);
        tm.commit(&bpm).unwrap();

        let guard = bpm.fetch_page_read(first_page).unwrap();
        assert_eq!(guard.page_type(), crate::storage::page::PageType::Invalid);
    }

    #[test]
    fn test_record_without_transaction_is_dropped() {
        let mut tm = TransactionManager::new();
        assert!(!tm.record(vec![LogEntry::CreateTable { table: "t".into() }]));
    }
}
