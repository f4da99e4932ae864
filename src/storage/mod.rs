//! Storage layer - disk I/O, page formats and table heaps.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level file I/O
//! - [`page`] - Page types and the slotted row layout
//! - [`TableHeap`] - A table's rows spread over a chain of pages

mod disk_manager;
pub mod page;
mod table_heap;

pub use disk_manager::DiskManager;
pub use table_heap::{RecordId, TableHeap, TableIterator};
