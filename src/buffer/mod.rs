//! The buffer/cache manager.
//!
//! [`BufferPoolManager`] owns a fixed number of [`Frame`]s and hands out
//! pinned pages through [`PageReadGuard`] and [`PageWriteGuard`]. Victims
//! are chosen by a pluggable [`replacer`]; hit, miss, eviction and I/O
//! counts accumulate in [`BufferPoolStats`].

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::Frame;
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use replacer::EvictionPolicy;
pub use stats::{BufferPoolStats, StatsSnapshot};
