//! Data and schema modification statements.
//!
//! Each statement is all-or-nothing: every affected row is computed and
//! validated before the first write, and the writes made so far are undone
//! if a later one fails. Once a statement succeeds its undo entries are
//! handed to the active transaction, if any.

use tracing::{debug, warn};

use super::executor::{ExecContext, Executor};
use super::expression::{Expr, OutputSchema};
use super::plan::PlanNode;
use crate::buffer::BufferPoolManager;
use crate::catalog::{Catalog, Column, TableSchema};
use crate::common::{Result, SchemaError};
use crate::concurrency::{undo_all, LogEntry, TransactionManager};
use crate::storage::{RecordId, TableHeap};
use crate::types::{Row, Value};

/// Mutable engine state a statement runs against.
pub(crate) struct Session<'a> {
    pub bpm: &'a BufferPoolManager,
    pub catalog: &'a mut Catalog,
    pub txn: &'a mut TransactionManager,
    pub prefetch: bool,
}

impl Session<'_> {
    fn query_context(&self) -> ExecContext<'_> {
        ExecContext {
            bpm: self.bpm,
            catalog: &*self.catalog,
            prefetch: self.prefetch,
        }
    }

    /// Hand a finished statement's entries to the transaction, or revert
    /// them if `outcome` is an error.
    fn settle(&mut self, outcome: Result<()>, entries: Vec<LogEntry>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.txn.record(entries);
                Ok(())
            }
            Err(e) => {
                if let Err((completed, undo_error)) = undo_all(&entries, self.bpm, self.catalog) {
                    warn!(
                        completed,
                        remaining = entries.len() - completed,
                        error = %undo_error,
                        "could not revert failed statement"
                    );
                }
                Err(e)
            }
        }
    }

    pub(crate) fn insert(&mut self, table: &str, columns: Option<&[String]>, input: &PlanNode) -> Result<usize> {
        let schema = self.catalog.get_table(table)?.clone();
        let positions = match columns {
            Some(columns) => Some(target_positions(&schema, columns)?),
            None => None,
        };

        let source = Executor::build(input, self.query_context())?.collect_rows()?;
        let rows = source
            .into_iter()
            .map(|row| shape_row(&schema, positions.as_deref(), row))
            .collect::<Result<Vec<_>>>()?;

        let mut heap = TableHeap::open(schema.first_page);
        let mut entries = Vec::with_capacity(rows.len());
        let outcome: Result<()> = rows.iter().try_for_each(|row| {
            let rid = heap.insert(self.bpm, row)?;
            self.catalog.adjust_row_count(&schema.name, 1);
            entries.push(LogEntry::Insert {
                table: schema.name.clone(),
                rid,
                row: row.clone(),
            });
            Ok(())
        });
        self.settle(outcome, entries)?;
        debug!(table = %schema.name, rows = rows.len(), "inserted");
        Ok(rows.len())
    }

    pub(crate) fn update(
        &mut self,
        table: &str,
        assignments: &[(String, Expr)],
        predicate: Option<&Expr>,
    ) -> Result<usize> {
        let schema = self.catalog.get_table(table)?.clone();
        let output = OutputSchema::for_table(&schema.name, schema.column_names());
        let assignments = assignments
            .iter()
            .map(|(column, expr)| {
                let index = schema.column_index(column).ok_or_else(|| SchemaError::NoSuchColumn {
                    table: schema.name.clone(),
                    column: column.to_lowercase(),
                })?;
                Ok((index, expr.bind(&output)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let predicate = predicate.map(|p| p.bind(&output)).transpose()?;

        let mut heap = TableHeap::open(schema.first_page);
        let mut targets: Vec<(RecordId, Row, Row)> = Vec::new();
        for (rid, row) in heap.scan(self.bpm)? {
            if let Some(predicate) = &predicate {
                if !predicate.matches(&row)? {
                    continue;
                }
            }
            let mut after = row.clone();
            for (index, expr) in &assignments {
                after[*index] = expr.eval(&row)?;
            }
            schema.validate(&after)?;
            targets.push((rid, row, after));
        }

        let mut entries = Vec::with_capacity(targets.len());
        let outcome: Result<()> = targets.iter().try_for_each(|(rid, before, after)| {
            let new_rid = heap.update(self.bpm, *rid, after)?;
            entries.push(LogEntry::Update {
                table: schema.name.clone(),
                old_rid: *rid,
                new_rid,
                before: before.clone(),
                after: after.clone(),
            });
            Ok(())
        });
        self.settle(outcome, entries)?;
        debug!(table = %schema.name, rows = targets.len(), "updated");
        Ok(targets.len())
    }

    pub(crate) fn delete(&mut self, table: &str, predicate: Option<&Expr>) -> Result<usize> {
        let schema = self.catalog.get_table(table)?.clone();
        let output = OutputSchema::for_table(&schema.name, schema.column_names());
        let predicate = predicate.map(|p| p.bind(&output)).transpose()?;

        let heap = TableHeap::open(schema.first_page);
        let mut targets = Vec::new();
        for (rid, row) in heap.scan(self.bpm)? {
            let keep = match &predicate {
                Some(predicate) => !predicate.matches(&row)?,
                None => false,
            };
            if !keep {
                targets.push(rid);
            }
        }

        let mut entries = Vec::with_capacity(targets.len());
        let outcome: Result<()> = targets.iter().try_for_each(|&rid| {
            let row = heap.delete(self.bpm, rid)?;
            self.catalog.adjust_row_count(&schema.name, -1);
            entries.push(LogEntry::Delete {
                table: schema.name.clone(),
                rid,
                row,
            });
            Ok(())
        });
        self.settle(outcome, entries)?;
        debug!(table = %schema.name, rows = targets.len(), "deleted");
        Ok(targets.len())
    }

    pub(crate) fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<TableSchema> {
        let schema = self.catalog.create_table(self.bpm, table, columns.to_vec())?;
        self.txn.record(vec![LogEntry::CreateTable {
            table: schema.name.clone(),
        }]);
        Ok(schema)
    }

    /// Returns `false` if the table did not exist and `if_exists` was set.
    ///
    /// Inside a transaction the table's pages survive until commit.
    pub(crate) fn drop_table(&mut self, table: &str, if_exists: bool) -> Result<bool> {
        if if_exists && !self.catalog.contains(table) {
            return Ok(false);
        }
        let in_txn = self.txn.is_active();
        let schema = self.catalog.drop_table(self.bpm, table, !in_txn)?;
        self.txn.record(vec![LogEntry::DropTable { schema }]);
        Ok(true)
    }
}

/// Table positions for an explicit INSERT column list.
fn target_positions(schema: &TableSchema, columns: &[String]) -> Result<Vec<usize>> {
    let mut positions: Vec<usize> = Vec::with_capacity(columns.len());
    for column in columns {
        let index = schema.column_index(column).ok_or_else(|| SchemaError::NoSuchColumn {
            table: schema.name.clone(),
            column: column.to_lowercase(),
        })?;
        if positions.contains(&index) {
            return Err(SchemaError::DuplicateColumn {
                table: schema.name.clone(),
                column: column.to_lowercase(),
            }
            .into());
        }
        positions.push(index);
    }
    Ok(positions)
}

/// Arrange an input row in table order and validate it.
fn shape_row(schema: &TableSchema, positions: Option<&[usize]>, row: Row) -> Result<Row> {
    let row = match positions {
        None => row,
        Some(positions) => {
            if row.len() != positions.len() {
                return Err(SchemaError::ColumnCountMismatch {
                    table: schema.name.clone(),
                    expected: positions.len(),
                    found: row.len(),
                }
                .into());
            }
            let mut values = vec![Value::Null; schema.arity()];
            for (&position, value) in positions.iter().zip(row.into_values()) {
                values[position] = value;
            }
            Row::new(values)
        }
    };
    schema.validate(&row)?;
    Ok(row)
}
