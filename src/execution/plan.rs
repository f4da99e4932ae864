//! Operator trees accepted by the executor.

use std::fmt;

use super::aggregate::AggregateExpr;
use super::expression::Expr;
use crate::catalog::Column;
use crate::types::Value;

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// A node of a plan tree.
///
/// Query nodes (`SeqScan` through `Values`) produce rows; the remaining
/// nodes are statements that report a count or a status.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    SeqScan {
        table: String,
    },
    Filter {
        input: Box<PlanNode>,
        predicate: Expr,
    },
    Project {
        input: Box<PlanNode>,
        columns: Vec<String>,
    },
    Sort {
        input: Box<PlanNode>,
        keys: Vec<SortKey>,
    },
    /// Equi-join on pairs of `(left column, right column)`.
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        kind: JoinKind,
        on: Vec<(String, String)>,
    },
    GroupAggregate {
        input: Box<PlanNode>,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
    },
    /// Literal rows, mostly as the source of an `Insert`.
    Values {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// `columns` maps input positions onto table columns; `None` means the
    /// input is in table order. Omitted columns are filled with NULL.
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        input: Box<PlanNode>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        predicate: Option<Expr>,
    },
    Delete {
        table: String,
        predicate: Option<Expr>,
    },
    CreateTable {
        table: String,
        columns: Vec<Column>,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
    Begin,
    Commit,
    Rollback,
}

impl PlanNode {
    pub fn scan(table: impl Into<String>) -> Self {
        PlanNode::SeqScan {
            table: table.into(),
        }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        PlanNode::Filter {
            input: Box::new(self),
            predicate,
        }
    }

    pub fn project<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        PlanNode::Project {
            input: Box::new(self),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sort(self, keys: Vec<SortKey>) -> Self {
        PlanNode::Sort {
            input: Box::new(self),
            keys,
        }
    }

    pub fn join(self, right: PlanNode, kind: JoinKind, on: Vec<(&str, &str)>) -> Self {
        PlanNode::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind,
            on: on
                .into_iter()
                .map(|(l, r)| (l.to_string(), r.to_string()))
                .collect(),
        }
    }

    pub fn aggregate<S: Into<String>>(
        self,
        group_by: impl IntoIterator<Item = S>,
        aggregates: Vec<AggregateExpr>,
    ) -> Self {
        PlanNode::GroupAggregate {
            input: Box::new(self),
            group_by: group_by.into_iter().map(Into::into).collect(),
            aggregates,
        }
    }

    /// `INSERT INTO table VALUES ...` in table column order.
    pub fn insert_values(table: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        PlanNode::Insert {
            table: table.into(),
            columns: None,
            input: Box::new(PlanNode::Values {
                columns: (1..=width).map(|i| format!("column{}", i)).collect(),
                rows,
            }),
        }
    }

    /// Whether executing the node may change stored data or the catalog.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            PlanNode::Insert { .. }
                | PlanNode::Update { .. }
                | PlanNode::Delete { .. }
                | PlanNode::CreateTable { .. }
                | PlanNode::DropTable { .. }
        )
    }

    /// Whether the node produces rows.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            PlanNode::SeqScan { .. }
                | PlanNode::Filter { .. }
                | PlanNode::Project { .. }
                | PlanNode::Sort { .. }
                | PlanNode::Join { .. }
                | PlanNode::GroupAggregate { .. }
                | PlanNode::Values { .. }
        )
    }

    fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::GroupAggregate { input, .. }
            | PlanNode::Insert { input, .. } => vec![input],
            PlanNode::Join { left, right, .. } => vec![left, right],
            _ => Vec::new(),
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanNode::SeqScan { table } => write!(f, "SeqScan on {}", table),
            PlanNode::Filter { predicate, .. } => write!(f, "Filter: {}", predicate),
            PlanNode::Project { columns, .. } => write!(f, "Project: {}", columns.join(", ")),
            PlanNode::Sort { keys, .. } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{} {}", k.column, if k.descending { "DESC" } else { "ASC" }))
                    .collect();
                write!(f, "Sort: {}", keys.join(", "))
            }
            PlanNode::Join { kind, on, .. } => {
                let kind = match kind {
                    JoinKind::Inner => "Inner",
                    JoinKind::LeftOuter => "Left Outer",
                };
                let on: Vec<String> = on.iter().map(|(l, r)| format!("{} = {}", l, r)).collect();
                write!(f, "Hash Join ({}) on {}", kind, on.join(" AND "))
            }
            PlanNode::GroupAggregate {
                group_by,
                aggregates,
                ..
            } => {
                let aggs: Vec<String> = aggregates.iter().map(ToString::to_string).collect();
                write!(f, "GroupAggregate: {}", aggs.join(", "))?;
                if !group_by.is_empty() {
                    write!(f, " by {}", group_by.join(", "))?;
                }
                Ok(())
            }
            PlanNode::Values { rows, .. } => write!(f, "Values ({} rows)", rows.len()),
            PlanNode::Insert { table, .. } => write!(f, "Insert into {}", table),
            PlanNode::Update {
                table,
                assignments,
                predicate,
            } => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|(column, expr)| format!("{} = {}", column, expr))
                    .collect();
                write!(f, "Update {} set {}", table, sets.join(", "))?;
                if let Some(predicate) = predicate {
                    write!(f, " where {}", predicate)?;
                }
                Ok(())
            }
            PlanNode::Delete { table, predicate } => {
                write!(f, "Delete from {}", table)?;
                if let Some(predicate) = predicate {
                    write!(f, " where {}", predicate)?;
                }
                Ok(())
            }
            PlanNode::CreateTable { table, columns } => {
                let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
                write!(f, "Create table {} ({})", table, columns.join(", "))
            }
            PlanNode::DropTable { table, if_exists } => {
                write!(f, "Drop table {}{}", if *if_exists { "if exists " } else { "" }, table)
            }
            PlanNode::Begin => f.write_str("Begin"),
            PlanNode::Commit => f.write_str("Commit"),
            PlanNode::Rollback => f.write_str("Rollback"),
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        self.fmt_node(f)?;
        for child in self.children() {
            writeln!(f)?;
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Indented operator tree, one node per line.
///
/// ```text
/// Project: name
///   Filter: id > 1
///     SeqScan on users
/// ```
impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::aggregate::AggregateFunction;

    #[test]
    fn test_explain_tree() {
        let plan = PlanNode::scan("users")
            .filter(Expr::gt(Expr::column("id"), Expr::literal(1)))
            .project(["name"]);
        assert_eq!(
            plan.to_string(),
            "Project: name\n  Filter: id > 1\n    SeqScan on users"
        );
    }

    #[test]
    fn test_explain_join_and_aggregate() {
        let plan = PlanNode::scan("users")
            .join(PlanNode::scan("orders"), JoinKind::LeftOuter, vec![("users.id", "orders.user_id")])
            .aggregate(
                ["users.name"],
                vec![AggregateExpr::new(AggregateFunction::Count, None)],
            );
        assert_eq!(
            plan.to_string(),
            "GroupAggregate: count(*) by users.name\n  \
             Hash Join (Left Outer) on users.id = orders.user_id\n    \
             SeqScan on users\n    \
             SeqScan on orders"
        );
    }

    #[test]
    fn test_classification() {
        assert!(PlanNode::scan("t").is_query());
        assert!(PlanNode::insert_values("t", vec![vec![Value::Integer(1)]]).is_mutation());
        assert!(!PlanNode::Begin.is_query());
        assert!(!PlanNode::Begin.is_mutation());
    }
}
