//! Aggregate functions and the hash table behind `GroupAggregate`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::expression::{OutputColumn, OutputSchema};
use crate::common::{Error, Result};
use crate::types::{DataType, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        };
        f.write_str(name)
    }
}

/// One aggregate in a `GroupAggregate` node.
///
/// `column: None` is `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub column: Option<String>,
    pub distinct: bool,
    pub alias: Option<String>,
}

impl AggregateExpr {
    pub fn new(func: AggregateFunction, column: Option<&str>) -> Self {
        Self {
            func,
            column: column.map(str::to_string),
            distinct: false,
            alias: None,
        }
    }

    pub fn count_star() -> Self {
        Self::new(AggregateFunction::Count, None)
    }

    pub fn count(column: &str) -> Self {
        Self::new(AggregateFunction::Count, Some(column))
    }

    pub fn sum(column: &str) -> Self {
        Self::new(AggregateFunction::Sum, Some(column))
    }

    pub fn avg(column: &str) -> Self {
        Self::new(AggregateFunction::Avg, Some(column))
    }

    pub fn min(column: &str) -> Self {
        Self::new(AggregateFunction::Min, Some(column))
    }

    pub fn max(column: &str) -> Self {
        Self::new(AggregateFunction::Max, Some(column))
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_lowercase());
        self
    }

    /// Name of the output column: the alias, or e.g. `avg(score)`.
    pub fn output_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.to_string())
    }

    pub(crate) fn bind(&self, schema: &OutputSchema) -> Result<BoundAggregate> {
        let column = match &self.column {
            Some(name) => Some(schema.resolve(name)?),
            None if self.func == AggregateFunction::Count && !self.distinct => None,
            None => {
                return Err(Error::InvalidPlan(format!("{} requires a column argument", self)));
            }
        };
        Ok(BoundAggregate {
            func: self.func,
            column,
            distinct: self.distinct,
        })
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        if self.distinct {
            f.write_str("distinct ")?;
        }
        match &self.column {
            Some(column) => write!(f, "{})", column.to_lowercase()),
            None => f.write_str("*)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundAggregate {
    func: AggregateFunction,
    column: Option<usize>,
    distinct: bool,
}

#[derive(Debug)]
enum State {
    Count(i64),
    /// Integer sum until a float shows up.
    Sum {
        int: Option<i64>,
        float: Option<f64>,
    },
    Avg {
        sum: f64,
        count: i64,
    },
    Extreme(Option<Value>),
}

/// Running state of one aggregate within one group.
#[derive(Debug)]
struct Accumulator {
    spec: BoundAggregate,
    state: State,
    seen: HashSet<Value>,
}

impl Accumulator {
    fn new(spec: BoundAggregate) -> Self {
        let state = match spec.func {
            AggregateFunction::Count => State::Count(0),
            AggregateFunction::Sum => State::Sum { int: None, float: None },
            AggregateFunction::Avg => State::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Min | AggregateFunction::Max => State::Extreme(None),
        };
        Self {
            spec,
            state,
            seen: HashSet::new(),
        }
    }

    fn update(&mut self, row: &[Value]) -> Result<()> {
        let Some(index) = self.spec.column else {
            if let State::Count(n) = &mut self.state {
                *n += 1;
            }
            return Ok(());
        };
        let value = row.get(index).unwrap_or(&Value::Null);
        if value.is_null() {
            return Ok(());
        }
        if self.spec.distinct && !self.seen.insert(value.clone()) {
            return Ok(());
        }

        let func = self.spec.func;
        match &mut self.state {
            State::Count(n) => *n += 1,
            State::Sum { int, float } => match value {
                Value::Integer(i) => match float {
                    Some(x) => *x += *i as f64,
                    None => {
                        let total = int.unwrap_or(0).checked_add(*i);
                        *int = Some(total.ok_or_else(|| Error::NumericOverflow(func.to_string()))?);
                    }
                },
                Value::Float(x) => {
                    let carried = int.take().map_or(0.0, |i| i as f64);
                    *float = Some(float.unwrap_or(carried) + x);
                }
                other => return Err(not_numeric(func, other)),
            },
            State::Avg { sum, count } => {
                *sum += match value {
                    Value::Integer(i) => *i as f64,
                    Value::Float(x) => *x,
                    other => return Err(not_numeric(func, other)),
                };
                *count += 1;
            }
            State::Extreme(current) => {
                let replace = match current {
                    None => true,
                    Some(best) => {
                        let ordering = value.sort_cmp(best)?;
                        if func == AggregateFunction::Min {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        }
                    }
                };
                if replace {
                    *current = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self.state {
            State::Count(n) => Value::Integer(n),
            State::Sum { float: Some(x), .. } => Value::Float(x),
            State::Sum { int: Some(i), .. } => Value::Integer(i),
            State::Sum { .. } => Value::Null,
            State::Avg { count: 0, .. } => Value::Null,
            State::Avg { sum, count } => Value::Float(sum / count as f64),
            State::Extreme(value) => value.unwrap_or(Value::Null),
        }
    }
}

fn not_numeric(func: AggregateFunction, value: &Value) -> Error {
    Error::IncompatibleTypes {
        op: func.to_string(),
        left: value.data_type(),
        right: DataType::Integer,
    }
}

/// Hash table of groups, kept in the order groups were first seen.
///
/// NULL grouping values form their own group.
pub(crate) struct GroupTable {
    keys: Vec<usize>,
    aggregates: Vec<BoundAggregate>,
    index: HashMap<Vec<Value>, usize>,
    groups: Vec<(Vec<Value>, Vec<Accumulator>)>,
}

impl GroupTable {
    pub(crate) fn new(keys: Vec<usize>, aggregates: Vec<BoundAggregate>) -> Self {
        Self {
            keys,
            aggregates,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, row: &[Value]) -> Result<()> {
        let key: Vec<Value> = self
            .keys
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
            .collect();
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let accumulators = self.aggregates.iter().map(|&a| Accumulator::new(a)).collect();
                self.groups.push((key.clone(), accumulators));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        for accumulator in &mut self.groups[slot].1 {
            accumulator.update(row)?;
        }
        Ok(())
    }

    /// One row per group: grouping values then aggregate results.
    ///
    /// Without grouping keys an empty input still yields one row.
    pub(crate) fn finish(mut self) -> Vec<Row> {
        if self.groups.is_empty() && self.keys.is_empty() {
            let accumulators = self.aggregates.iter().map(|&a| Accumulator::new(a)).collect();
            self.groups.push((Vec::new(), accumulators));
        }
        self.groups
            .into_iter()
            .map(|(mut values, accumulators)| {
                values.extend(accumulators.into_iter().map(Accumulator::finish));
                Row::new(values)
            })
            .collect()
    }
}

/// Output shape of a `GroupAggregate`.
pub(crate) fn output_schema(input: &OutputSchema, keys: &[usize], aggregates: &[AggregateExpr]) -> OutputSchema {
    let mut columns: Vec<OutputColumn> = keys.iter().map(|&i| input.columns[i].clone()).collect();
    columns.extend(
        aggregates
            .iter()
            .map(|a| OutputColumn::new(None, &a.output_name())),
    );
    OutputSchema::new(columns)
}
