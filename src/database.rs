//! The engine object tying storage, cache, catalog and transactions together.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::buffer::{BufferPoolManager, EvictionPolicy, StatsSnapshot};
use crate::catalog::Catalog;
use crate::common::{DatabaseConfig, Error, Result, TxnId};
use crate::concurrency::TransactionManager;
use crate::execution::{
    ExecContext, ExecutionResult, Executor, PlanNode, QueryStream, Session, StatementStatus,
};
use crate::storage::DiskManager;

/// Smallest pool that can run every operator: a scan pins one page while an
/// insert may pin the tail page and a freshly allocated one.
const MIN_POOL_SIZE: usize = 2;

/// An open database file with one session.
///
/// Owns the buffer pool (and through it the disk manager), the catalog and
/// the transaction manager. Closing, explicitly or by drop, rolls back an
/// unfinished transaction and flushes every dirty page.
///
/// # Example
/// ```no_run
/// use kerneldb::catalog::Column;
/// use kerneldb::execution::{Expr, PlanNode};
/// use kerneldb::{Database, DatabaseConfig, Value};
///
/// let mut db = Database::open("app.db", DatabaseConfig::default())?;
/// db.execute(&PlanNode::CreateTable {
///     table: "users".into(),
///     columns: vec![Column::integer("id"), Column::text("name", 32)],
/// })?;
/// db.execute(&PlanNode::insert_values(
///     "users",
///     vec![vec![Value::Integer(1), Value::from("Alice")]],
/// ))?;
///
/// let plan = PlanNode::scan("users").filter(Expr::gt(Expr::column("id"), Expr::literal(0)));
/// for row in db.query(&plan)? {
///     println!("{:?}", row?);
/// }
/// db.close()?;
/// # Ok::<(), kerneldb::Error>(())
/// ```
pub struct Database {
    bpm: BufferPoolManager,
    catalog: Catalog,
    txn: TransactionManager,
    config: DatabaseConfig,
    path: PathBuf,
    closed: bool,
}

impl Database {
    /// Open `path`, creating an empty database if the file does not exist.
    ///
    /// # Errors
    /// - `Error::Io` if the file cannot be opened or created
    /// - `Error::PageCorruption` if the catalog cannot be loaded
    pub fn open(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = config;
        if config.pool_size < MIN_POOL_SIZE {
            warn!(requested = config.pool_size, used = MIN_POOL_SIZE, "pool size too small");
            config.pool_size = MIN_POOL_SIZE;
        }

        let disk_manager = DiskManager::open_or_create(&path)?;
        let bpm = BufferPoolManager::with_policy(config.pool_size, disk_manager, config.eviction_policy);
        let catalog = Catalog::bootstrap(&bpm)?;

        info!(
            path = %path.display(),
            pool_size = config.pool_size,
            policy = %config.eviction_policy,
            tables = catalog.table_names().len(),
            "database opened"
        );
        Ok(Self {
            bpm,
            catalog,
            txn: TransactionManager::new(),
            config,
            path,
            closed: false,
        })
    }

    /// Run any plan to completion.
    ///
    /// Queries are fully materialized; use [`Database::query`] to stream.
    pub fn execute(&mut self, plan: &PlanNode) -> Result<ExecutionResult> {
        debug!(plan = %plan, "execute");
        let result: ExecutionResult = match plan {
            PlanNode::Begin => StatementStatus::Begun(self.begin()?).into(),
            PlanNode::Commit => StatementStatus::Committed(self.commit()?).into(),
            PlanNode::Rollback => StatementStatus::RolledBack(self.rollback()?).into(),
            PlanNode::CreateTable { table, columns } => {
                let schema = self.session().create_table(table, columns)?;
                StatementStatus::TableCreated(schema.name).into()
            }
            PlanNode::DropTable { table, if_exists } => {
                let name = table.to_lowercase();
                if self.session().drop_table(table, *if_exists)? {
                    StatementStatus::TableDropped(name).into()
                } else {
                    StatementStatus::NothingToDrop(name).into()
                }
            }
            PlanNode::Insert {
                table,
                columns,
                input,
            } => ExecutionResult::Affected(self.session().insert(table, columns.as_deref(), input)?),
            PlanNode::Update {
                table,
                assignments,
                predicate,
            } => ExecutionResult::Affected(self.session().update(table, assignments, predicate.as_ref())?),
            PlanNode::Delete { table, predicate } => {
                ExecutionResult::Affected(self.session().delete(table, predicate.as_ref())?)
            }
            query => ExecutionResult::Rows(self.query(query)?.collect_result()?),
        };
        Ok(result)
    }

    /// Start a lazily evaluated query.
    ///
    /// The stream borrows the database; dropping it early releases every
    /// page it had pinned.
    pub fn query(&self, plan: &PlanNode) -> Result<QueryStream<'_>> {
        if !plan.is_query() {
            return Err(Error::InvalidPlan(format!(
                "'{}' is not a query",
                plan.to_string().lines().next().unwrap_or_default()
            )));
        }
        let ctx = ExecContext {
            bpm: &self.bpm,
            catalog: &self.catalog,
            prefetch: self.config.prefetch,
        };
        QueryStream::open(Executor::build(plan, ctx)?)
    }

    pub fn begin(&mut self) -> Result<TxnId> {
        self.txn.begin()
    }

    pub fn commit(&mut self) -> Result<TxnId> {
        Ok(self.txn.commit(&self.bpm)?.id())
    }

    /// Undo the active transaction.
    ///
    /// # Errors
    /// - `Error::RollbackFailure` if an undo step failed; the transaction
    ///   is aborted regardless
    pub fn rollback(&mut self) -> Result<TxnId> {
        Ok(self.txn.rollback(&self.bpm, &mut self.catalog)?.id())
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_active()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.bpm
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cache counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.bpm.stats().snapshot()
    }

    /// Switch the eviction policy without dropping cached pages.
    pub fn set_eviction_policy(&mut self, policy: EvictionPolicy) {
        self.bpm.set_policy(policy);
        self.config.eviction_policy = policy;
    }

    /// Write every dirty page to disk.
    pub fn flush(&self) -> Result<()> {
        self.bpm.flush_all_pages()
    }

    /// Roll back any active transaction, flush and release the file.
    ///
    /// A rollback failure is returned after the flush has been attempted.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let rollback = if self.txn.is_active() {
            warn!("closing with an active transaction, rolling back");
            self.rollback().map(drop)
        } else {
            Ok(())
        };
        self.bpm.flush_all_pages()?;
        info!(path = %self.path.display(), stats = %self.stats(), "database closed");
        rollback
    }

    fn session(&mut self) -> Session<'_> {
        Session {
            bpm: &self.bpm,
            catalog: &mut self.catalog,
            txn: &mut self.txn,
            prefetch: self.config.prefetch,
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "error while closing database");
        }
    }
}

impl From<StatementStatus> for ExecutionResult {
    fn from(status: StatementStatus) -> Self {
        ExecutionResult::Status(status)
    }
}
