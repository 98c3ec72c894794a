/// Query Execution Module
///
/// This module runs read-only SQL such as the analytics catalog and returns
/// the column names together with typed values.

use crate::core::db::Value;
use crate::core::{DashError, Result};
use rusqlite::Connection;
use tracing::{debug, error};

/// Represents the result of a SQL query execution
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows of typed values
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned
    pub row_count: usize,
}

impl QueryResult {
    /// Creates a new QueryResult from column names and row data
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        QueryResult {
            columns,
            rows,
            row_count,
        }
    }

    /// Position of a column by name, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// All values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> Vec<&Value> {
        self.rows.iter().filter_map(|row| row.get(index)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Query execution service that operates on a database connection
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        QueryExecutor { connection }
    }

    /// Executes a read-only SQL query and collects every row.
    ///
    /// # Errors
    ///
    /// Returns `DashError::Data` if the statement cannot be prepared, is not
    /// read-only, or fails while stepping. The driver error is attached.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        debug!("Executing query: {}", sql);
        let mut stmt = self.connection.prepare(sql).map_err(|e| {
            error!("Failed to prepare query: {}", e);
            DashError::from_dml(e)
        })?;
        let statement_type = StatementType::from_sql(sql);
        if statement_type.changes_session() || !stmt.readonly() {
            return Err(DashError::data(format!(
                "{:?} statements are not allowed here, only read-only queries",
                statement_type
            )));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = stmt.column_count();
        let was_autocommit = self.connection.is_autocommit();

        let rows = stmt
            .query_map([], |row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(Value::from_value_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(DashError::from_dml)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| {
                error!("Query execution failed: {}", e);
                DashError::from_dml(e)
            })?;

        if was_autocommit && !self.connection.is_autocommit() {
            error!("Query left a transaction open, rolling back");
            self.connection
                .execute_batch("ROLLBACK")
                .map_err(DashError::from_dml)?;
            return Err(DashError::data(
                "transaction control is not allowed here, only read-only queries",
            ));
        }
        Ok(QueryResult::new(columns, rows))
    }
}

/// Convenience function to execute a query on a connection
pub fn execute_query_on_connection(conn: &Connection, sql: &str) -> Result<QueryResult> {
    QueryExecutor::new(conn).execute(sql)
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT statement, including ones led by a WITH clause
    Select,
    /// INSERT or REPLACE statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE statement
    Create,
    /// DROP statement
    Drop,
    /// ALTER statement
    Alter,
    /// BEGIN/COMMIT/END/ROLLBACK and SAVEPOINT/RELEASE
    Transaction,
    /// ATTACH or DETACH of another database
    Attach,
    /// PRAGMA that reads a value
    Pragma,
    /// PRAGMA that assigns a value
    Setting,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from its leading keyword, skipping
    /// leading comments.
    pub fn from_sql(sql: &str) -> Self {
        let body = skip_leading_comments(sql);
        let keyword: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementType::Select,
            "INSERT" | "REPLACE" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" => StatementType::Create,
            "DROP" => StatementType::Drop,
            "ALTER" => StatementType::Alter,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementType::Transaction
            }
            "ATTACH" | "DETACH" => StatementType::Attach,
            "PRAGMA" if body.contains('=') => StatementType::Setting,
            "PRAGMA" => StatementType::Pragma,
            _ => StatementType::Other,
        }
    }

    /// Statements that SQLite reports as read-only but that change the
    /// connection: transaction control, attached databases and settings.
    pub fn changes_session(self) -> bool {
        matches!(
            self,
            StatementType::Transaction | StatementType::Attach | StatementType::Setting
        )
    }
}

fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |n| &comment[n..]).trim_start();
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |n| &comment[n + 2..]).trim_start();
        } else {
            return rest;
        }
    }
}
