/// Schema Navigator Module
///
/// Overview of the tables in the connected database as a tree: row counts,
/// primary keys, outgoing foreign keys and index names. Backs `:tables`.
use crate::core::db::identifier::quote;
use crate::core::db::{RecordAccessor, SchemaManager};
use crate::core::{DashError, Result};
use rusqlite::Connection;
use tracing::debug;

/// Represents a table in the schema navigator.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub row_count: usize,
    pub primary_key: Vec<String>,
    /// `column -> table(column)` descriptions
    pub foreign_keys: Vec<String>,
    pub indexes: Vec<String>,
}

/// Represents the schema navigator structure.
#[derive(Debug, Clone, Default)]
pub struct SchemaNavigator {
    tables: Vec<Table>,
}

impl SchemaNavigator {
    pub fn new() -> Self {
        SchemaNavigator::default()
    }

    /// Reads every user table of the database.
    pub fn from_connection(conn: &Connection) -> Result<Self> {
        let schema = SchemaManager::new(conn);
        let mut navigator = SchemaNavigator::new();
        for name in schema.list_tables()? {
            let row_count = RecordAccessor::open(conn, &name)?.count()?;
            let primary_key = schema.get_primary_keys(&name)?;
            let foreign_keys = foreign_keys(conn, &name)?;
            let indexes = indexes(conn, &name)?;
            navigator.add_table(Table {
                name,
                row_count,
                primary_key,
                foreign_keys,
                indexes,
            });
        }
        debug!("Schema navigator loaded {} tables", navigator.tables.len());
        Ok(navigator)
    }

    /// Adds a table, keeping the list sorted by name.
    pub fn add_table(&mut self, table: Table) {
        let position = self
            .tables
            .partition_point(|t| t.name.to_lowercase() < table.name.to_lowercase());
        self.tables.insert(position, table);
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Renders the schema navigator as a tree-like string.
    pub fn render(&self) -> String {
        let mut output = String::new();
        for table in &self.tables {
            output.push_str(&format!("Table: {}\n", table.name));
            output.push_str(&format!("  Row Count: {}\n", table.row_count));
            if !table.primary_key.is_empty() {
                output.push_str(&format!("  Primary Key: {}\n", table.primary_key.join(", ")));
            }
            if !table.foreign_keys.is_empty() {
                output.push_str("  Foreign Keys:\n");
                for fk in &table.foreign_keys {
                    output.push_str(&format!("    -> {}\n", fk));
                }
            }
            if !table.indexes.is_empty() {
                output.push_str("  Indexes:\n");
                for index in &table.indexes {
                    output.push_str(&format!("    - {}\n", index));
                }
            }
        }
        output
    }
}

fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq")
        .map_err(DashError::from_ddl)?;
    let rows = stmt
        .query_map([table], |row| {
            let from: String = row.get(0)?;
            let target: String = row.get(1)?;
            let to: Option<String> = row.get(2)?;
            Ok(match to {
                Some(to) => format!("{} -> {}({})", from, target, to),
                None => format!("{} -> {}", from, target),
            })
        })
        .map_err(DashError::from_ddl)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DashError::from_ddl)
}

fn indexes(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA index_list({})", quote(table));
    let mut stmt = conn.prepare(&sql).map_err(DashError::from_ddl)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(DashError::from_ddl)?;
    let mut names = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DashError::from_ddl)?;
    names.sort();
    Ok(names)
}
