//! What statements hand back to the caller.

use std::collections::BTreeMap;
use std::fmt;

use super::executor::Executor;
use crate::common::{Result, TxnId};
use crate::types::{Row, Value};

/// Fully materialized query output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Output column names, qualified only where they would clash.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column name -> value maps.
    pub fn records(&self) -> Vec<BTreeMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    /// Values of one column, `None` if there is no such column.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let index = self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))?;
        Some(self.rows.iter().map(|row| row[index].clone()).collect())
    }
}

/// Tab-separated header line followed by one line per row.
impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let values: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(f, "{}", values.join("\t"))?;
        }
        write!(f, "({} rows)", self.rows.len())
    }
}

/// Outcome of a statement that does not produce rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementStatus {
    TableCreated(String),
    TableDropped(String),
    /// `DROP TABLE IF EXISTS` on a missing table.
    NothingToDrop(String),
    Begun(TxnId),
    Committed(TxnId),
    RolledBack(TxnId),
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementStatus::TableCreated(t) => write!(f, "CREATE TABLE {}", t),
            StatementStatus::TableDropped(t) => write!(f, "DROP TABLE {}", t),
            StatementStatus::NothingToDrop(t) => write!(f, "table {} does not exist, skipping", t),
            StatementStatus::Begun(id) => write!(f, "BEGIN {}", id),
            StatementStatus::Committed(id) => write!(f, "COMMIT {}", id),
            StatementStatus::RolledBack(id) => write!(f, "ROLLBACK {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Rows(ResultSet),
    /// Rows inserted, updated or deleted.
    Affected(usize),
    Status(StatementStatus),
}

impl ExecutionResult {
    pub fn into_rows(self) -> Option<ResultSet> {
        match self {
            ExecutionResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<usize> {
        match self {
            ExecutionResult::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Rows(rows) => write!(f, "{}", rows),
            ExecutionResult::Affected(n) => write!(f, "{} row(s) affected", n),
            ExecutionResult::Status(status) => write!(f, "{}", status),
        }
    }
}

/// Lazily evaluated query output.
///
/// Rows are pulled from the operator tree one at a time. Dropping the
/// stream before it is exhausted closes the tree and releases its pins.
pub struct QueryStream<'a> {
    executor: Executor<'a>,
    columns: Vec<String>,
    done: bool,
}

impl<'a> QueryStream<'a> {
    /// Open `executor` and wrap it.
    pub(crate) fn open(mut executor: Executor<'a>) -> Result<Self> {
        executor.open()?;
        let columns = executor.schema().display_names();
        Ok(Self {
            executor,
            columns,
            done: false,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Drain the remaining rows.
    pub fn collect_result(self) -> Result<ResultSet> {
        let columns = self.columns.clone();
        let rows = self.collect::<Result<Vec<_>>>()?;
        Ok(ResultSet { columns, rows })
    }

    fn finish(&mut self) {
        self.done = true;
        self.executor.close();
    }
}

impl Iterator for QueryStream<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.executor.next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl Drop for QueryStream<'_> {
    fn drop(&mut self) {
        self.executor.close();
    }
}
