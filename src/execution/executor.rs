//! Pull-based operators.
//!
//! Every operator follows the same contract:
//! - `open` prepares it (blocking operators consume their input here)
//! - `next` produces one row, or `None` once exhausted
//! - `close` releases everything it holds
//!
//! Page pins are held only by [`SeqScan`] through its table iterator, and the
//! iterator unpins on drop. Abandoning an operator tree at any point, on
//! error or early termination, therefore leaves no page pinned.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::trace;

use super::aggregate::{self, BoundAggregate, GroupTable};
use super::expression::{BoundExpr, OutputColumn, OutputSchema};
use super::plan::{JoinKind, PlanNode};
use crate::buffer::BufferPoolManager;
use crate::catalog::Catalog;
use crate::common::{Error, Result};
use crate::storage::{TableHeap, TableIterator};
use crate::types::{DataType, Row, Value};

/// What operators need from the engine while running.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub bpm: &'a BufferPoolManager,
    pub catalog: &'a Catalog,
    /// Ask the buffer pool to load the next page of a scan ahead of time.
    pub prefetch: bool,
}

/// A node of a running operator tree.
pub enum Executor<'a> {
    SeqScan(SeqScan<'a>),
    Filter(Filter<'a>),
    Project(Project<'a>),
    Sort(Sort<'a>),
    HashJoin(HashJoin<'a>),
    Aggregate(Aggregate<'a>),
    Values(ValuesScan),
}

impl<'a> Executor<'a> {
    /// Build an operator tree for a query plan, binding every column
    /// reference.
    ///
    /// # Errors
    /// - `SchemaError::NoSuchTable` / `NoSuchColumn` / `AmbiguousColumn`
    /// - `Error::InvalidPlan` if `plan` is not a query node
    pub fn build(plan: &PlanNode, ctx: ExecContext<'a>) -> Result<Self> {
        Ok(match plan {
            PlanNode::SeqScan { table } => {
                let schema = ctx.catalog.get_table(table)?;
                Executor::SeqScan(SeqScan {
                    ctx,
                    heap: TableHeap::open(schema.first_page),
                    iter: None,
                    schema: OutputSchema::for_table(&schema.name, schema.column_names()),
                })
            }
            PlanNode::Filter { input, predicate } => {
                let child = Self::build(input, ctx)?;
                let predicate = predicate.bind(child.schema())?;
                Executor::Filter(Filter {
                    child: Box::new(child),
                    predicate,
                })
            }
            PlanNode::Project { input, columns } => {
                let child = Self::build(input, ctx)?;
                let indices = columns
                    .iter()
                    .map(|c| child.schema().resolve(c))
                    .collect::<Result<Vec<_>>>()?;
                let schema = OutputSchema::new(
                    indices
                        .iter()
                        .map(|&i| child.schema().columns[i].clone())
                        .collect(),
                );
                Executor::Project(Project {
                    child: Box::new(child),
                    indices,
                    schema,
                })
            }
            PlanNode::Sort { input, keys } => {
                let child = Self::build(input, ctx)?;
                let keys = keys
                    .iter()
                    .map(|k| Ok((child.schema().resolve(&k.column)?, k.descending)))
                    .collect::<Result<Vec<_>>>()?;
                Executor::Sort(Sort {
                    child: Box::new(child),
                    keys,
                    output: None,
                })
            }
            PlanNode::Join {
                left,
                right,
                kind,
                on,
            } => {
                let left = Self::build(left, ctx)?;
                let right = Self::build(right, ctx)?;
                let mut left_keys = Vec::with_capacity(on.len());
                let mut right_keys = Vec::with_capacity(on.len());
                for (l, r) in on {
                    let (li, ri) = resolve_join_pair(left.schema(), right.schema(), l, r)?;
                    left_keys.push(li);
                    right_keys.push(ri);
                }
                let schema = left.schema().join(right.schema());
                Executor::HashJoin(HashJoin {
                    left: Box::new(left),
                    right: Box::new(right),
                    kind: *kind,
                    left_keys,
                    right_keys,
                    schema,
                    output: None,
                })
            }
            PlanNode::GroupAggregate {
                input,
                group_by,
                aggregates,
            } => {
                let child = Self::build(input, ctx)?;
                let keys = group_by
                    .iter()
                    .map(|c| child.schema().resolve(c))
                    .collect::<Result<Vec<_>>>()?;
                let bound = aggregates
                    .iter()
                    .map(|a| a.bind(child.schema()))
                    .collect::<Result<Vec<_>>>()?;
                let schema = aggregate::output_schema(child.schema(), &keys, aggregates);
                Executor::Aggregate(Aggregate {
                    child: Box::new(child),
                    keys,
                    aggregates: bound,
                    schema,
                    output: None,
                })
            }
            PlanNode::Values { columns, rows } => {
                if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
                    return Err(Error::InvalidPlan(format!(
                        "VALUES row has {} values for {} columns",
                        row.len(),
                        columns.len()
                    )));
                }
                Executor::Values(ValuesScan {
                    schema: OutputSchema::new(
                        columns.iter().map(|c| OutputColumn::new(None, c)).collect(),
                    ),
                    rows: rows.clone(),
                    position: None,
                })
            }
            other => {
                return Err(Error::InvalidPlan(format!(
                    "'{}' does not produce rows",
                    other.to_string().lines().next().unwrap_or_default()
                )))
            }
        })
    }

    pub fn schema(&self) -> &OutputSchema {
        match self {
            Executor::SeqScan(op) => &op.schema,
            Executor::Filter(op) => op.child.schema(),
            Executor::Project(op) => &op.schema,
            Executor::Sort(op) => op.child.schema(),
            Executor::HashJoin(op) => &op.schema,
            Executor::Aggregate(op) => &op.schema,
            Executor::Values(op) => &op.schema,
        }
    }

    pub fn open(&mut self) -> Result<()> {
        match self {
            Executor::SeqScan(op) => {
                op.iter = Some(op.heap.iter(op.ctx.bpm, op.ctx.prefetch));
                Ok(())
            }
            Executor::Filter(op) => op.child.open(),
            Executor::Project(op) => op.child.open(),
            Executor::Sort(op) => op.open(),
            Executor::HashJoin(op) => op.open(),
            Executor::Aggregate(op) => op.open(),
            Executor::Values(op) => {
                op.position = Some(0);
                Ok(())
            }
        }
    }

    pub fn next(&mut self) -> Result<Option<Row>> {
        match self {
            Executor::SeqScan(op) => {
                let iter = op.iter.as_mut().ok_or_else(not_open)?;
                match iter.next() {
                    Some(item) => Ok(Some(item?.1)),
                    None => Ok(None),
                }
            }
            Executor::Filter(op) => {
                while let Some(row) = op.child.next()? {
                    if op.predicate.matches(&row)? {
                        return Ok(Some(row));
                    }
                }
                Ok(None)
            }
            Executor::Project(op) => Ok(op
                .child
                .next()?
                .map(|row| Row::new(op.indices.iter().map(|&i| row[i].clone()).collect()))),
            Executor::Sort(op) => Ok(op.output.as_mut().ok_or_else(not_open)?.next()),
            Executor::HashJoin(op) => Ok(op.output.as_mut().ok_or_else(not_open)?.next()),
            Executor::Aggregate(op) => Ok(op.output.as_mut().ok_or_else(not_open)?.next()),
            Executor::Values(op) => {
                let position = op.position.as_mut().ok_or_else(not_open)?;
                let row = op.rows.get(*position).cloned().map(Row::new);
                *position += usize::from(row.is_some());
                Ok(row)
            }
        }
    }

    /// Release pins and buffered rows. Safe to call more than once.
    pub fn close(&mut self) {
        match self {
            Executor::SeqScan(op) => op.iter = None,
            Executor::Filter(op) => op.child.close(),
            Executor::Project(op) => op.child.close(),
            Executor::Sort(op) => {
                op.output = None;
                op.child.close();
            }
            Executor::HashJoin(op) => {
                op.output = None;
                op.left.close();
                op.right.close();
            }
            Executor::Aggregate(op) => {
                op.output = None;
                op.child.close();
            }
            Executor::Values(op) => op.position = None,
        }
    }

    /// Open, drain and close.
    pub fn collect_rows(&mut self) -> Result<Vec<Row>> {
        self.open()?;
        let mut rows = Vec::new();
        let outcome = loop {
            match self.next() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break Ok(rows),
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome
    }
}

fn not_open() -> Error {
    Error::InvalidPlan("operator used before open".to_string())
}

fn resolve_join_pair(
    left: &OutputSchema,
    right: &OutputSchema,
    l: &str,
    r: &str,
) -> Result<(usize, usize)> {
    let direct = left.resolve(l).and_then(|li| Ok((li, right.resolve(r)?)));
    match direct {
        Ok(pair) => Ok(pair),
        // Accept the pair written the other way round.
        Err(e) => match (left.resolve(r), right.resolve(l)) {
            (Ok(li), Ok(ri)) => Ok((li, ri)),
            _ => Err(e),
        },
    }
}

pub struct SeqScan<'a> {
    ctx: ExecContext<'a>,
    heap: TableHeap,
    iter: Option<TableIterator<'a>>,
    schema: OutputSchema,
}

pub struct Filter<'a> {
    child: Box<Executor<'a>>,
    predicate: BoundExpr,
}

pub struct Project<'a> {
    child: Box<Executor<'a>>,
    indices: Vec<usize>,
    schema: OutputSchema,
}

/// Materializing stable sort. NULL sorts lowest in both directions' base
/// order, so it comes first ascending and last descending.
pub struct Sort<'a> {
    child: Box<Executor<'a>>,
    keys: Vec<(usize, bool)>,
    output: Option<std::vec::IntoIter<Row>>,
}

impl Sort<'_> {
    fn open(&mut self) -> Result<()> {
        let mut rows = self.child.collect_rows()?;
        let mut failure = None;
        rows.sort_by(|a, b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            match compare_keys(a, b, &self.keys) {
                Ok(ordering) => ordering,
                Err(e) => {
                    failure = Some(e);
                    Ordering::Equal
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        trace!(rows = rows.len(), "sorted");
        self.output = Some(rows.into_iter());
        Ok(())
    }
}

fn compare_keys(a: &[Value], b: &[Value], keys: &[(usize, bool)]) -> Result<Ordering> {
    for &(index, descending) in keys {
        let ordering = a[index].sort_cmp(&b[index])?;
        if ordering != Ordering::Equal {
            return Ok(if descending { ordering.reverse() } else { ordering });
        }
    }
    Ok(Ordering::Equal)
}

/// Equi-join through a hash table over the smaller input.
///
/// Output follows the left input's order; the matches for one left row
/// follow the right input's order. Rows with a NULL join key never match.
pub struct HashJoin<'a> {
    left: Box<Executor<'a>>,
    right: Box<Executor<'a>>,
    kind: JoinKind,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    schema: OutputSchema,
    output: Option<std::vec::IntoIter<Row>>,
}

impl HashJoin<'_> {
    fn open(&mut self) -> Result<()> {
        let left = self.left.collect_rows()?;
        let right = self.right.collect_rows()?;
        check_key_types(&left, &self.left_keys, &right, &self.right_keys)?;

        // matches[i] lists the right rows joining left row i.
        let mut matches: Vec<Vec<usize>> = vec![Vec::new(); left.len()];
        if right.len() <= left.len() {
            let table = build_table(&right, &self.right_keys);
            for (i, row) in left.iter().enumerate() {
                if let Some(hits) = join_key(row, &self.left_keys).and_then(|k| table.get(&k)) {
                    matches[i].clone_from(hits);
                }
            }
        } else {
            let table = build_table(&left, &self.left_keys);
            for (j, row) in right.iter().enumerate() {
                if let Some(hits) = join_key(row, &self.right_keys).and_then(|k| table.get(&k)) {
                    for &i in hits {
                        matches[i].push(j);
                    }
                }
            }
        }

        let right_width = self.right.schema().len();
        let mut output = Vec::new();
        for (row, hits) in left.iter().zip(&matches) {
            if hits.is_empty() && self.kind == JoinKind::LeftOuter {
                let mut values = row.to_vec();
                values.resize(values.len() + right_width, Value::Null);
                output.push(Row::new(values));
            }
            for &j in hits {
                let mut values = row.to_vec();
                values.extend(right[j].iter().cloned());
                output.push(Row::new(values));
            }
        }
        trace!(left = left.len(), right = right.len(), output = output.len(), "hash join");
        self.output = Some(output.into_iter());
        Ok(())
    }
}

fn join_key(row: &[Value], keys: &[usize]) -> Option<Vec<Value>> {
    let key: Vec<Value> = keys.iter().map(|&i| numeric_key(&row[i])).collect();
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

/// Integral floats hash as integers so `1 = 1.0` matches like it does in
/// a filter.
fn numeric_key(value: &Value) -> Value {
    match *value {
        Value::Float(x) if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 => {
            Value::Integer(x as i64)
        }
        _ => value.clone(),
    }
}

fn build_table(rows: &[Row], keys: &[usize]) -> HashMap<Vec<Value>, Vec<usize>> {
    let mut table: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if let Some(key) = join_key(row, keys) {
            table.entry(key).or_default().push(i);
        }
    }
    table
}

/// Join keys must compare without coercion.
fn check_key_types(left: &[Row], left_keys: &[usize], right: &[Row], right_keys: &[usize]) -> Result<()> {
    let first_type = |rows: &[Row], index: usize| -> Option<DataType> {
        rows.iter().map(|r| &r[index]).find(|v| !v.is_null()).map(Value::data_type)
    };
    for (&li, &ri) in left_keys.iter().zip(right_keys) {
        if let (Some(l), Some(r)) = (first_type(left, li), first_type(right, ri)) {
            let numeric = |t: DataType| matches!(t, DataType::Integer | DataType::Float);
            if l != r && !(numeric(l) && numeric(r)) {
                return Err(Error::IncompatibleTypes {
                    op: "JOIN".to_string(),
                    left: l,
                    right: r,
                });
            }
        }
    }
    Ok(())
}

pub struct Aggregate<'a> {
    child: Box<Executor<'a>>,
    keys: Vec<usize>,
    aggregates: Vec<BoundAggregate>,
    schema: OutputSchema,
    output: Option<std::vec::IntoIter<Row>>,
}

impl Aggregate<'_> {
    fn open(&mut self) -> Result<()> {
        let mut table = GroupTable::new(self.keys.clone(), self.aggregates.clone());
        self.child.open()?;
        let outcome = loop {
            match self.child.next() {
                Ok(Some(row)) => {
                    if let Err(e) = table.push(&row) {
                        break Err(e);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.child.close();
        outcome?;
        self.output = Some(table.finish().into_iter());
        Ok(())
    }
}

pub struct ValuesScan {
    schema: OutputSchema,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}
