//! Error types for the MongoDB convenience layer.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every error is returned to the immediate caller; nothing in this crate retries.

use mongodb::error::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NosqlError {
    #[error("Missing configuration: [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("Invalid connection URI: {message}")]
    UriParse { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// `index` is the zero-based position of the offending document in the cursor.
    #[error("Failed to decode document {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("Cursor error: {message}")]
    Cursor { message: String },

    #[error("Failed to disconnect '{name}': {message}")]
    Disconnect { name: String, message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl NosqlError {
    /// Create a missing configuration error.
    pub fn config_missing(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConfigMissing {
            section: section.into(),
            key: key.into(),
        }
    }

    /// Create a URI parse error.
    pub fn uri_parse(message: impl Into<String>) -> Self {
        Self::UriParse {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a decode error for the document at `index`.
    pub fn decode(index: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            index,
            message: message.into(),
        }
    }

    /// Create a cursor error.
    pub fn cursor(message: impl Into<String>) -> Self {
        Self::Cursor {
            message: message.into(),
        }
    }

    /// Create a disconnect error.
    pub fn disconnect(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Disconnect {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a generic database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration file error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::ConfigMissing { .. } => {
                Some("Add the database name to the [mongodb] section of the configuration")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Disconnect { .. })
    }
}

/// Convert driver errors to NosqlError.
impl From<mongodb::error::Error> for NosqlError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Authentication { message, .. } => NosqlError::connection(
                format!("Authentication failed: {}", message),
                "Verify the user and password configured for this host",
            ),
            ErrorKind::ServerSelection { message, .. } => NosqlError::connection(
                format!("Server selection failed: {}", message),
                "Check that the MongoDB server is running and reachable",
            ),
            ErrorKind::Io(io_err) => NosqlError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            ErrorKind::DnsResolve { message, .. } => NosqlError::connection(
                format!("DNS resolution failed: {}", message),
                "Check the host name or the host override in the configuration",
            ),
            // single-document replies carry no cursor index
            ErrorKind::BsonDeserialization(e) => {
                NosqlError::database(format!("Failed to decode server reply: {}", e))
            }
            ErrorKind::InvalidArgument { message, .. } => NosqlError::invalid_input(message),
            _ => NosqlError::database(err.to_string()),
        }
    }
}

/// Result type alias for this crate.
pub type NosqlResult<T> = Result<T, NosqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NosqlError::config_missing("mongodb", "main");
        assert_eq!(err.to_string(), "Missing configuration: [mongodb] main");
    }

    #[test]
    fn test_decode_error_carries_index() {
        let err = NosqlError::decode(3, "missing field `name`");
        assert!(err.to_string().contains("document 3"));
        assert!(matches!(err, NosqlError::Decode { index: 3, .. }));
    }

    #[test]
    fn test_error_suggestion() {
        let err = NosqlError::connection("refused", "Check the server");
        assert_eq!(err.suggestion(), Some("Check the server"));
        assert!(NosqlError::cursor("killed").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(NosqlError::connection("err", "sugg").is_retryable());
        assert!(NosqlError::disconnect("main", "timed out").is_retryable());
        assert!(!NosqlError::decode(0, "bad").is_retryable());
        assert!(!NosqlError::uri_parse("bad port").is_retryable());
    }

    #[test]
    fn test_driver_deserialization_error_maps_to_database() {
        let de_err = bson::from_document::<String>(bson::doc! { "seq": 5.5 }).unwrap_err();
        let err: NosqlError = mongodb::error::Error::from(de_err).into();
        assert!(matches!(err, NosqlError::Database { .. }));
        assert!(err.to_string().contains("decode server reply"));
    }

    #[test]
    fn test_unclassified_driver_error_maps_to_database() {
        let driver_err = mongodb::error::Error::custom("opaque");
        let err: NosqlError = driver_err.into();
        assert!(matches!(err, NosqlError::Database { .. }));
    }
}
