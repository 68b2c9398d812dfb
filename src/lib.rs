//! MongoDB convenience layer.
//!
//! This library adds three things on top of the MongoDB driver: a connection pool
//! whose URIs are assembled from a key/value configuration, typed decoding of whole
//! cursors, and an atomic sequence-number generator.

pub mod config;
pub mod db;
pub mod error;

pub use config::{ClientDefaults, ClientOptionsHook, ConfigSource, MapSource, TomlSource};
pub use db::{Database, DatabasePool};
pub use error::{NosqlError, NosqlResult};
