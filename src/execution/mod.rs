//! Plan executor.
//!
//! Plans arrive as [`PlanNode`] trees. Queries are turned into a tree of
//! pull-based [`Executor`] operators; statements that modify data go
//! through the DML session and report an affected-row count or a status.

mod aggregate;
mod dml;
mod executor;
mod expression;
mod plan;
mod result;

pub(crate) use dml::Session;
pub use aggregate::{AggregateExpr, AggregateFunction};
pub use executor::{ExecContext, Executor};
pub use expression::{BoundExpr, CompareOp, Expr, OutputColumn, OutputSchema};
pub use plan::{JoinKind, PlanNode, SortKey};
pub use result::{ExecutionResult, QueryStream, ResultSet, StatementStatus};
