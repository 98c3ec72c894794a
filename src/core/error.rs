/// sqldash Error Module
///
/// This module defines the error taxonomy for sqldash. Driver failures are
/// classified by the layer that issued the statement (connection, schema or
/// data) and keep the original `rusqlite::Error` as their source, so callers
/// can inspect exactly what the engine reported.
use thiserror::Error;

/// Comprehensive error type for the sqldash application.
///
/// This enum covers all error scenarios that can occur within sqldash:
/// - Opening or creating the database
/// - DDL statements (bad names, malformed types, missing tables or columns)
/// - DML statements (constraint violations, type mismatches)
/// - Identifier validation before any SQL text is built
/// - Configuration loading, JSON input and REPL command parsing
#[derive(Error, Debug)]
pub enum DashError {
    /// The database could not be reached, opened or created
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A schema-definition statement or a catalog lookup failed
    #[error("Schema error: {message}")]
    Schema {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A data-manipulation statement failed
    #[error("Data error: {message}")]
    Data {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A table, column or type name was rejected before reaching SQL text
    #[error("Identifier error: {0}")]
    Identifier(String),

    /// Database errors from paths that are not classified above
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing and validation errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Command validation and execution errors
    #[error("Command error: {0}")]
    Command(String),
}

impl DashError {
    /// Builds a connection error without an underlying driver error.
    pub fn connection(message: impl Into<String>) -> Self {
        DashError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a schema error without an underlying driver error.
    pub fn schema(message: impl Into<String>) -> Self {
        DashError::Schema {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a data error without an underlying driver error.
    pub fn data(message: impl Into<String>) -> Self {
        DashError::Data {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a driver error raised while opening the database.
    pub fn from_connect(err: rusqlite::Error) -> Self {
        DashError::Connection {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Wraps a driver error raised by a DDL or catalog statement.
    pub fn from_ddl(err: rusqlite::Error) -> Self {
        DashError::Schema {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Wraps a driver error raised by a DML statement.
    pub fn from_dml(err: rusqlite::Error) -> Self {
        DashError::Data {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Returns the driver error exactly as the engine reported it, if any.
    pub fn driver_error(&self) -> Option<&rusqlite::Error> {
        match self {
            DashError::Connection { source, .. }
            | DashError::Schema { source, .. }
            | DashError::Data { source, .. } => source.as_ref(),
            DashError::Database(err) => Some(err),
            _ => None,
        }
    }
}

/// Type alias for Result to use DashError as the error type.
pub type Result<T> = std::result::Result<T, DashError>;

/// Type alias for REPL command results: an optional message to print on success.
pub type CommandResult = Result<Option<String>>;
