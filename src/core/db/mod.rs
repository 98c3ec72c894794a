/// Database Module
///
/// This module provides the core database functionality for sqldash,
/// organized into focused submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): opens, creates and lazily re-opens the database
/// - **Definition Text** (`definition.rs`): splits and rewrites stored `CREATE TABLE` text
/// - **Identifier Guard** (`identifier.rs`): validates and quotes table, column and type names
/// - **Schema Inspection and Mutation** (`schema.rs`): catalog metadata and DDL
/// - **Record Access** (`records.rs`): generic insert/select/update/delete on one table
/// - **Query Execution** (`query.rs`): ad hoc read queries such as the analytics catalog
/// - **Values** (`value.rs`): the scalar values bound into and read out of statements
///
/// ## Error Handling
///
/// DDL failures surface as `DashError::Schema`, DML failures as `DashError::Data`,
/// both carrying the driver error unchanged.
pub mod connection;
pub mod definition;
pub mod identifier;
pub mod query;
pub mod records;
pub mod schema;
pub mod value;

pub use connection::*;
pub use query::*;
pub use records::*;
pub use schema::*;
pub use value::*;
