/// Core Module for sqldash
///
/// This module contains the fundamental components that form the backbone
/// of the dashboard: the database layer (connection, schema, records, values)
/// and the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{CommandResult, DashError, Result};
