//! Scalar and boolean expressions over rows.
//!
//! Expressions refer to columns by name. Before execution they are bound to
//! an operator's [`OutputSchema`], which turns every name into a position and
//! reports unknown or ambiguous references up front.

use std::cmp::Ordering;
use std::fmt;

use crate::common::{Error, Result, SchemaError};
use crate::types::{DataType, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl CompareOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::LtEq => "<=",
            CompareOp::GtEq => ">=",
        }
    }
}

/// An unbound expression tree, as handed over by the planner.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `name` or `table.name`.
    Column(String),
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    /// Resolve column names against `schema`.
    pub fn bind(&self, schema: &OutputSchema) -> Result<BoundExpr> {
        Ok(match self {
            Expr::Column(name) => BoundExpr::Column(schema.resolve(name)?),
            Expr::Literal(value) => BoundExpr::Literal(value.clone()),
            Expr::Compare { op, left, right } => BoundExpr::Compare {
                op: *op,
                left: Box::new(left.bind(schema)?),
                right: Box::new(right.bind(schema)?),
            },
            Expr::And(left, right) => {
                BoundExpr::And(Box::new(left.bind(schema)?), Box::new(right.bind(schema)?))
            }
            Expr::Or(left, right) => {
                BoundExpr::Or(Box::new(left.bind(schema)?), Box::new(right.bind(schema)?))
            }
            Expr::Not(inner) => BoundExpr::Not(Box::new(inner.bind(schema)?)),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => f.write_str(name),
            Expr::Literal(Value::Text(s)) => write!(f, "'{}'", s),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Compare { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::And(left, right) => write!(f, "({} AND {})", left, right),
            Expr::Or(left, right) => write!(f, "({} OR {})", left, right),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

/// An expression whose column references are row positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Column(usize),
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    And(Box<BoundExpr>, Box<BoundExpr>),
    Or(Box<BoundExpr>, Box<BoundExpr>),
    Not(Box<BoundExpr>),
}

impl BoundExpr {
    /// Evaluate to a value. Boolean results are `Integer(1)`/`Integer(0)`,
    /// unknown is `Null`.
    pub fn eval(&self, row: &[Value]) -> Result<Value> {
        match self {
            BoundExpr::Column(index) => Ok(row.get(*index).cloned().unwrap_or(Value::Null)),
            BoundExpr::Literal(value) => Ok(value.clone()),
            _ => Ok(match self.eval_predicate(row)? {
                Some(truth) => Value::Integer(i64::from(truth)),
                None => Value::Null,
            }),
        }
    }

    /// Evaluate as a condition with three-valued logic; `None` is unknown.
    ///
    /// AND and OR stop as soon as the left side decides the result.
    pub fn eval_predicate(&self, row: &[Value]) -> Result<Option<bool>> {
        match self {
            BoundExpr::Compare { op, left, right } => {
                let (l, r) = (left.eval(row)?, right.eval(row)?);
                Ok(l.compare(&r, op.symbol())?.map(|ordering| op.matches(ordering)))
            }
            BoundExpr::And(left, right) => match left.eval_predicate(row)? {
                Some(false) => Ok(Some(false)),
                l => Ok(match (l, right.eval_predicate(row)?) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }),
            },
            BoundExpr::Or(left, right) => match left.eval_predicate(row)? {
                Some(true) => Ok(Some(true)),
                l => Ok(match (l, right.eval_predicate(row)?) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }),
            },
            BoundExpr::Not(inner) => Ok(inner.eval_predicate(row)?.map(|truth| !truth)),
            BoundExpr::Column(_) | BoundExpr::Literal(_) => match self.eval(row)? {
                Value::Null => Ok(None),
                Value::Integer(i) => Ok(Some(i != 0)),
                other => Err(Error::IncompatibleTypes {
                    op: "condition".to_string(),
                    left: other.data_type(),
                    right: DataType::Integer,
                }),
            },
        }
    }

    /// Whether a row passes a filter: unknown counts as false.
    pub fn matches(&self, row: &[Value]) -> Result<bool> {
        Ok(self.eval_predicate(row)? == Some(true))
    }
}

/// One column produced by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    /// Source table, if the column comes straight from one.
    pub table: Option<String>,
    pub name: String,
}

impl OutputColumn {
    pub fn new(table: Option<&str>, name: &str) -> Self {
        Self {
            table: table.map(str::to_lowercase),
            name: name.to_lowercase(),
        }
    }

    fn qualified(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.name),
            None => self.name.clone(),
        }
    }
}

/// The row shape produced by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSchema {
    pub columns: Vec<OutputColumn>,
}

impl OutputSchema {
    pub fn new(columns: Vec<OutputColumn>) -> Self {
        Self { columns }
    }

    /// All columns of a table, qualified by the table name.
    pub fn for_table<'a>(table: &str, names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(names.into_iter().map(|n| OutputColumn::new(Some(table), n)).collect())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Concatenate two schemas, left columns first.
    pub fn join(&self, right: &OutputSchema) -> OutputSchema {
        let mut columns = self.columns.clone();
        columns.extend(right.columns.iter().cloned());
        OutputSchema { columns }
    }

    /// Position of `name` or `table.name`.
    ///
    /// # Errors
    /// - `SchemaError::NoSuchColumn` if nothing matches
    /// - `SchemaError::AmbiguousColumn` if a bare name matches several columns
    pub fn resolve(&self, reference: &str) -> Result<usize> {
        let reference = reference.to_lowercase();
        let (table, name) = match reference.split_once('.') {
            Some((table, name)) => (Some(table), name),
            None => (None, reference.as_str()),
        };

        let mut found = self.columns.iter().enumerate().filter(|(_, column)| {
            column.name == name && table.map_or(true, |t| column.table.as_deref() == Some(t))
        });
        match (found.next(), found.next()) {
            (Some((index, _)), None) => Ok(index),
            (Some(_), Some(_)) => Err(SchemaError::AmbiguousColumn(reference.clone()).into()),
            (None, _) => Err(SchemaError::NoSuchColumn {
                table: table
                    .map(str::to_string)
                    .unwrap_or_else(|| self.describe_tables()),
                column: name.to_string(),
            }
            .into()),
        }
    }

    /// Display names: bare unless the same name appears more than once.
    pub fn display_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                let clashes = self.columns.iter().filter(|c| c.name == column.name).count() > 1;
                if clashes {
                    column.qualified()
                } else {
                    column.name.clone()
                }
            })
            .collect()
    }

    fn describe_tables(&self) -> String {
        let mut tables: Vec<&str> = self.columns.iter().filter_map(|c| c.table.as_deref()).collect();
        tables.dedup();
        if tables.is_empty() {
            "result".to_string()
        } else {
            tables.join(", ")
        }
    }
}
