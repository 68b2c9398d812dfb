//! Configuration handling.
//!
//! Connection strings are looked up through [`ConfigSource`], a `(section, key) -> value`
//! capability supplied by the caller. This module ships an in-memory source, a TOML-backed
//! source, pool-wide driver defaults and the CLI configuration for the `mongo-nosql` binary.

use crate::error::{NosqlError, NosqlResult};
use clap::{Parser, Subcommand};
use mongodb::options::ClientOptions;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Section holding logical database name -> base URI entries.
pub const SECTION_NAME: &str = "mongodb";
/// Section of a TOML source holding [`ClientDefaults`].
pub const CLIENT_SECTION: &str = "client";

/// Caller-supplied adjustment of driver options, run after [`ClientDefaults`].
///
/// Covers everything the `[client]` table cannot express (TLS, compressors, read
/// preference, credential source).
pub type ClientOptionsHook = Arc<dyn Fn(&mut ClientOptions) + Send + Sync>;

pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Key/value lookup used to resolve connection strings.
///
/// An empty string means "not found".
pub trait ConfigSource: Send + Sync {
    fn get(&self, section: &str, key: &str) -> String;
}

impl<F> ConfigSource for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn get(&self, section: &str, key: &str) -> String {
        self(section, key)
    }
}

/// In-memory configuration source.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    sections: HashMap<String, HashMap<String, String>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(
        mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(section, key, value);
        self
    }

    pub fn insert(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(key.into(), value.into());
    }
}

impl ConfigSource for MapSource {
    fn get(&self, section: &str, key: &str) -> String {
        self.sections
            .get(section)
            .and_then(|keys| keys.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

/// Configuration source backed by a TOML document.
///
/// Every top-level table is a section; per-host sections use quoted table names:
///
/// ```toml
/// [mongodb]
/// main = "db1.example.com:27017/shop"
///
/// ["db1.example.com:27017"]
/// user = "app"
/// password = "secret"
/// query = "authSource=admin"
/// ```
#[derive(Debug, Clone)]
pub struct TomlSource {
    map: MapSource,
    client: ClientDefaults,
}

impl TomlSource {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> NosqlResult<Self> {
        let table: toml::Table = s
            .parse()
            .map_err(|e: toml::de::Error| NosqlError::config(format!("Invalid TOML: {}", e)))?;

        let mut map = MapSource::new();
        let mut client = ClientDefaults::default();

        for (section, value) in table {
            let toml::Value::Table(keys) = value else {
                continue;
            };

            if section == CLIENT_SECTION {
                client = toml::Value::Table(keys.clone()).try_into().map_err(
                    |e: toml::de::Error| {
                        NosqlError::config(format!("Invalid [{}] section: {}", CLIENT_SECTION, e))
                    },
                )?;
            }

            for (key, value) in keys {
                if let Some(value) = scalar_to_string(&value) {
                    map.insert(section.clone(), key, value);
                }
            }
        }

        Ok(Self { map, client })
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> NosqlResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            NosqlError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Driver defaults from the `[client]` table (all unset when absent).
    pub fn client_defaults(&self) -> &ClientDefaults {
        &self.client
    }
}

impl ConfigSource for TomlSource {
    fn get(&self, section: &str, key: &str) -> String {
        self.map.get(section, key)
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

/// Pool-wide driver options from the `[client]` table.
///
/// Merged after the connection string is parsed: every field set here replaces what the
/// URI says, fields left unset keep the URI's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientDefaults {
    pub app_name: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub server_selection_timeout_secs: Option<u64>,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    /// Upper bound for shutting down one client in `DatabasePool::close` (default: 10)
    pub shutdown_timeout_secs: Option<u64>,
}

impl ClientDefaults {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(
            self.shutdown_timeout_secs
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        )
    }

    /// Merge into parsed driver options; set fields win over the URI.
    pub fn apply_to(&self, options: &mut ClientOptions) {
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(secs) = self.connect_timeout_secs {
            options.connect_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.server_selection_timeout_secs {
            options.server_selection_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(min) = self.min_pool_size {
            options.min_pool_size = Some(min);
        }
    }

    /// Validate defaults and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_pool_size {
            if max == 0 {
                return Err("max_pool_size must be greater than 0".to_string());
            }
            if let Some(min) = self.min_pool_size {
                if min > max {
                    return Err(format!(
                        "min_pool_size ({}) cannot exceed max_pool_size ({})",
                        min, max
                    ));
                }
            }
        }
        if self.shutdown_timeout_secs == Some(0) {
            return Err("shutdown_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Configuration for the `mongo-nosql` command-line tool.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mongo-nosql",
    about = "Resolve configured MongoDB connections, query collections and manage sequences",
    version,
    author
)]
pub struct Config {
    /// TOML file with the [mongodb] section and per-host overrides
    #[arg(short, long, value_name = "FILE", env = "NOSQL_CONFIG")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "NOSQL_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "NOSQL_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the resolved connection string (password masked) and database name
    Uri {
        /// Logical database name from the [mongodb] section
        name: String,
    },
    /// Reserve the next value (or a block of values) of a counter
    Next {
        name: String,
        counter: String,
        /// Reserve a contiguous block and print its first value
        #[arg(long, default_value_t = 1)]
        count: i64,
    },
    /// Force-set a counter (migrations only)
    Init {
        name: String,
        counter: String,
        value: i64,
    },
    /// Print documents matching a filter as JSON lines
    Find {
        name: String,
        collection: String,
        /// Filter document as JSON
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long)]
        limit: Option<i64>,
    },
}
