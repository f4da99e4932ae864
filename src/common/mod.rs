//! Common types and utilities shared across kerneldb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`DatabaseConfig`]
//! - Error types
//! - Identifiers (PageId, FrameId)

pub mod config;
pub mod error;
mod ids;

pub use config::DatabaseConfig;
pub use error::{Error, Result, SchemaError, TransactionError, TxnId};
pub use ids::{FrameId, PageId};
