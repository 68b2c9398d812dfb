//! Database access layer.
//!
//! This module provides:
//! - Connection string assembly from configuration
//! - A per-name connection pool
//! - Typed decoding of query cursors
//! - Atomic sequence numbers

pub mod database;
pub mod pool;
pub mod result;
pub mod sequence;
pub mod uri;

pub use database::{Collection, Database};
pub use pool::DatabasePool;
pub use result::{
    Aggregater, Finder, ManyResult, aggregate_many, decode_all, decode_all_boxed, decode_into,
    find_many,
};
pub use sequence::{Counter, SEQUENCE_COLLECTION};
pub use uri::{ConnectionSpec, HostOverrides, ResolvedUri, build_uri, resolve_uri};
