//! Error types for QuantumDbLog
//!
//! This module defines the error taxonomy used by every adapter and by the
//! configuration layer. Connection failures are never rewritten: they travel
//! inside the variant that names the operation which triggered them.

use crate::sinks::database::connection::ConnectionError;
use std::fmt;
use thiserror::Error;

/// Transaction operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionOp::Begin => "begin",
            TransactionOp::Commit => "commit",
            TransactionOp::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Main error type for QuantumDbLog operations
#[derive(Error, Debug)]
pub enum DbLogError {
    /// The insert statement for a log item was rejected
    #[error("Write error on table '{table}': {source}")]
    WriteError {
        table: String,
        #[source]
        source: ConnectionError,
    },

    /// begin/commit/rollback was refused in the current state
    #[error("Transaction error during {operation}: {source}")]
    TransactionError {
        operation: TransactionOp,
        #[source]
        source: ConnectionError,
    },

    /// The flush-then-close sequence failed
    #[error("Close error: {source}")]
    CloseError {
        #[source]
        source: ConnectionError,
    },

    /// Opening a database connection failed
    #[error("Database connection error: {source}")]
    DatabaseConnection {
        #[source]
        source: ConnectionError,
    },

    /// The formatter could not render an item
    #[error("Format error: {0}")]
    FormatError(String),

    /// Adapter was used after close
    #[error("Sink is closed")]
    SinkClosed,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigFileMissing(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Adapter name is not registered with the logger
    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    /// Blocking task failed to complete
    #[error("Background task error: {0}")]
    BackgroundTaskError(String),

    /// Tracing subscriber errors
    #[error("Tracing error: {0}")]
    TracingError(String),

    /// I/O errors (stream sinks, config files)
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML parsing error: {source}")]
    TomlError {
        #[from]
        source: toml::de::Error,
    },
}

/// Result type alias for QuantumDbLog operations
pub type Result<T> = std::result::Result<T, DbLogError>;

impl DbLogError {
    /// Create a new write error
    pub fn write<S: Into<String>>(table: S, source: ConnectionError) -> Self {
        Self::WriteError {
            table: table.into(),
            source,
        }
    }

    /// Create a new transaction error
    pub fn transaction(operation: TransactionOp, source: ConnectionError) -> Self {
        Self::TransactionError { operation, source }
    }

    /// Create a new close error
    pub fn close(source: ConnectionError) -> Self {
        Self::CloseError { source }
    }

    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::FormatError(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new tracing error
    pub fn tracing<S: Into<String>>(msg: S) -> Self {
        Self::TracingError(msg.into())
    }

    /// The connection error carried by this error, if any
    pub fn connection_error(&self) -> Option<&ConnectionError> {
        match self {
            Self::WriteError { source, .. }
            | Self::TransactionError { source, .. }
            | Self::CloseError { source }
            | Self::DatabaseConnection { source } => Some(source),
            _ => None,
        }
    }

    /// Get the error category for logging purposes
    pub fn category(&self) -> &'static str {
        match self {
            Self::WriteError { .. } => "write",
            Self::TransactionError { .. } => "transaction",
            Self::CloseError { .. } | Self::SinkClosed => "close",
            Self::FormatError(_) => "format",
            Self::DatabaseConnection { .. } => "database",
            Self::ConfigError(_) | Self::ConfigFileMissing(_) | Self::InvalidLogLevel(_) => {
                "config"
            }
            Self::AdapterNotFound(_) => "adapter",
            Self::BackgroundTaskError(_) => "background_task",
            Self::TracingError(_) => "tracing",
            Self::IoError { .. } => "io",
            Self::SerializationError { .. } => "serialization",
            Self::TomlError { .. } => "toml",
        }
    }
}
