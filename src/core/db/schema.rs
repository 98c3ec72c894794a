/// Schema Inspection and Mutation Module
///
/// This module lists tables, describes their columns straight from the live
/// catalog, and issues the DDL behind the dashboard's table operations:
/// create, add/modify/drop column, rename, truncate and drop. Nothing is
/// cached; every call re-reads the catalog.
///
/// Every identifier is checked by `identifier` before it is interpolated.
/// Column types and raw definition fragments are validated too, but values
/// never appear in DDL except as `DEFAULT` literals rendered by `Value`.

use crate::core::db::definition::{
    declares_autoincrement, promote_auto_increment_keys, TableDefinition,
};
use crate::core::db::identifier::{
    quote, resolve, sanitize_fragment, validate_new_identifier, validate_type_name,
};
use crate::core::db::Value;
use crate::core::{DashError, Result};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error, info};

/// Value of `ColumnDescriptor::extra` for AUTOINCREMENT keys.
pub const AUTO_INCREMENT: &str = "auto_increment";

const REBUILD_PREFIX: &str = "_sqldash_rebuild_";

/// Role a column plays in the table's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    Primary,
}

/// A column as reported by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Declared type exactly as written in the table definition
    pub declared_type: String,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Primary key membership
    pub key: KeyRole,
    /// Default expression text, if any
    pub default: Option<String>,
    /// Extra attribute, `"auto_increment"` for AUTOINCREMENT keys
    pub extra: Option<String>,
}

impl ColumnDescriptor {
    pub fn is_primary(&self) -> bool {
        self.key == KeyRole::Primary
    }

    pub fn is_auto_increment(&self) -> bool {
        self.extra
            .as_deref()
            .map_or(false, |extra| extra.eq_ignore_ascii_case(AUTO_INCREMENT))
    }

    fn from_table_info(row: &Row, single_pk: bool, autoincrement: bool) -> rusqlite::Result<Self> {
        let declared_type: String = row.get(1)?;
        let notnull: bool = row.get(2)?;
        let pk: i64 = row.get(4)?;
        let rowid_alias = pk > 0 && single_pk && declared_type.eq_ignore_ascii_case("INTEGER");

        Ok(ColumnDescriptor {
            name: row.get(0)?,
            declared_type,
            nullable: !notnull && !rowid_alias,
            key: if pk > 0 { KeyRole::Primary } else { KeyRole::None },
            default: row.get(3)?,
            extra: (rowid_alias && autoincrement).then(|| AUTO_INCREMENT.to_string()),
        })
    }
}

/// A table and its columns in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary())
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// A column to create, in the structured input shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, alias = "isPrimary")]
    pub is_primary: bool,
    #[serde(default, alias = "autoIncrement")]
    pub auto_increment: bool,
    #[serde(default, alias = "notNull")]
    pub not_null: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        ColumnDef {
            name: name.into(),
            type_name: type_name.into(),
            is_primary: false,
            auto_increment: false,
            not_null: false,
            default: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Renders `"name" TYPE [AUTOINCREMENT] [NOT NULL] [DEFAULT lit]`.
    fn render(&self) -> Result<String> {
        let mut definition = format!(
            "{} {}",
            quote(validate_new_identifier(&self.name)?),
            validate_type_name(&self.type_name)?
        );
        if self.auto_increment {
            definition.push_str(" AUTOINCREMENT");
        }
        self.push_constraints(&mut definition)?;
        Ok(definition)
    }

    /// Renders the inline `INTEGER PRIMARY KEY AUTOINCREMENT` form.
    fn render_rowid_key(&self) -> Result<String> {
        validate_type_name(&self.type_name)?;
        let mut definition = format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote(validate_new_identifier(&self.name)?)
        );
        self.push_constraints(&mut definition)?;
        Ok(definition)
    }

    fn push_constraints(&self, definition: &mut String) -> Result<()> {
        if self.not_null {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(&default.to_sql_literal()?);
        }
        Ok(())
    }
}

/// Column definitions in either supported input shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSpec {
    /// Structured column definitions
    Columns(Vec<ColumnDef>),
    /// A raw SQL fragment such as `id INTEGER PRIMARY KEY, name TEXT`
    Raw(String),
}

impl ColumnSpec {
    /// Interprets user input: a JSON array or object is parsed as structured
    /// definitions, anything else is kept as a raw fragment.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with('[') {
            Ok(ColumnSpec::Columns(serde_json::from_str(trimmed)?))
        } else if trimmed.starts_with('{') {
            Ok(ColumnSpec::Columns(vec![serde_json::from_str(trimmed)?]))
        } else {
            Ok(ColumnSpec::Raw(trimmed.to_string()))
        }
    }
}

impl From<Vec<ColumnDef>> for ColumnSpec {
    fn from(columns: Vec<ColumnDef>) -> Self {
        ColumnSpec::Columns(columns)
    }
}

impl From<&str> for ColumnSpec {
    fn from(fragment: &str) -> Self {
        ColumnSpec::Raw(fragment.to_string())
    }
}

/// A rename/retype/re-nullability request for one existing column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnChange {
    #[serde(alias = "oldName")]
    pub old_name: String,
    #[serde(alias = "newName")]
    pub new_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, alias = "notNull")]
    pub not_null: bool,
}

impl ColumnChange {
    pub fn new(
        old_name: impl Into<String>,
        new_name: impl Into<String>,
        type_name: impl Into<String>,
        not_null: bool,
    ) -> Self {
        ColumnChange {
            old_name: old_name.into(),
            new_name: new_name.into(),
            type_name: type_name.into(),
            not_null,
        }
    }

    /// Parses a JSON array of changes, or a single change object.
    pub fn parse_list(input: &str) -> Result<Vec<ColumnChange>> {
        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            Ok(vec![serde_json::from_str(trimmed)?])
        } else {
            Ok(serde_json::from_str(trimmed)?)
        }
    }
}

/// Reconstructs an editable definition string from introspected metadata.
///
/// `name TYPE`, then `PRIMARY KEY` for key columns, `AUTOINCREMENT` when the
/// extra attribute says so, and `DEFAULT NULL` only for nullable columns that
/// report no default of their own.
pub fn format_column_definition(column: &ColumnDescriptor) -> String {
    let mut definition = format!("{} {}", column.name, column.declared_type.to_uppercase());
    if column.is_primary() {
        definition.push_str(" PRIMARY KEY");
    }
    if column.is_auto_increment() {
        definition.push_str(" AUTOINCREMENT");
    }
    let has_default = column.default.as_deref().map_or(false, |d| !d.is_empty());
    if column.nullable && !has_default {
        definition.push_str(" DEFAULT NULL");
    }
    definition
}

/// Builds the `CREATE TABLE` statement for structured column definitions.
///
/// Primary keys are gathered into one trailing clause, duplicates removed.
/// An auto-increment column has to be the table's only primary key and is
/// written inline as `INTEGER PRIMARY KEY AUTOINCREMENT`, the one form
/// SQLite accepts.
pub fn build_create_table_sql(table: &str, columns: &[ColumnDef]) -> Result<String> {
    let table = validate_new_identifier(table)?;
    if columns.is_empty() {
        return Err(DashError::schema(format!(
            "table '{}' needs at least one column",
            table
        )));
    }

    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(DashError::schema(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
    }

    let mut primary_keys: Vec<&str> = Vec::new();
    for column in columns.iter().filter(|c| c.is_primary) {
        if !primary_keys.iter().any(|k| k.eq_ignore_ascii_case(&column.name)) {
            primary_keys.push(&column.name);
        }
    }

    let auto: Vec<&ColumnDef> = columns.iter().filter(|c| c.auto_increment).collect();
    let rowid_key = match auto.as_slice() {
        [] => None,
        [column] => {
            if !column.is_primary || primary_keys.len() != 1 {
                return Err(DashError::schema(format!(
                    "auto-increment column '{}' must be the only primary key",
                    column.name
                )));
            }
            if !column.type_name.to_ascii_uppercase().contains("INT") {
                return Err(DashError::schema(format!(
                    "auto-increment column '{}' must have an integer type, not '{}'",
                    column.name, column.type_name
                )));
            }
            Some(*column)
        }
        _ => {
            return Err(DashError::schema(
                "only one auto-increment column is allowed per table",
            ))
        }
    };

    let mut definitions = Vec::with_capacity(columns.len() + 1);
    for column in columns {
        if rowid_key.map_or(false, |key| std::ptr::eq(key, column)) {
            definitions.push(column.render_rowid_key()?);
        } else {
            definitions.push(column.render()?);
        }
    }
    if rowid_key.is_none() && !primary_keys.is_empty() {
        let keys: Vec<String> = primary_keys.iter().map(|k| quote(k)).collect();
        definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} ({})",
        quote(table),
        definitions.join(", ")
    ))
}

/// Schema operations bound to one connection.
pub struct SchemaManager<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SchemaManager { conn }
    }

    /// Lists user tables in the order the catalog reports them.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
            )
            .map_err(DashError::from_ddl)?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(DashError::from_ddl)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DashError::from_ddl)?;
        debug!("Retrieved tables: {:?}", tables);
        Ok(tables)
    }

    /// Returns the canonical name of an existing table.
    pub fn resolve_table(&self, table: &str) -> Result<String> {
        let tables = self.list_tables()?;
        resolve(table, tables.iter().map(String::as_str))
            .ok_or_else(|| DashError::schema(format!("table '{}' does not exist", table)))
    }

    /// Returns the canonical name of an existing column of `table`.
    pub fn resolve_column(&self, table: &str, column: &str) -> Result<String> {
        let columns = self.get_columns(table)?;
        resolve(column, columns.iter().map(|c| c.name.as_str())).ok_or_else(|| {
            DashError::schema(format!(
                "column '{}' does not exist in table '{}'",
                column, table
            ))
        })
    }

    /// Describes the columns of one table, in declaration order.
    pub fn get_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let table = self.resolve_table(table)?;

        let create_sql: Option<String> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [&table],
                |row| row.get(0),
            )
            .optional()
            .map_err(DashError::from_ddl)?
            .flatten();
        let autoincrement = create_sql.map_or(false, |sql| declares_autoincrement(&sql));

        let pk_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE pk > 0",
                [&table],
                |row| row.get(0),
            )
            .map_err(DashError::from_ddl)?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, type, \"notnull\", dflt_value, pk
                 FROM pragma_table_info(?1) ORDER BY cid",
            )
            .map_err(DashError::from_ddl)?;
        let columns = stmt
            .query_map([&table], |row| {
                ColumnDescriptor::from_table_info(row, pk_count == 1, autoincrement)
            })
            .map_err(DashError::from_ddl)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| {
                error!("Error retrieving columns for table '{}': {}", table, e);
                DashError::from_ddl(e)
            })?;
        Ok(columns)
    }

    /// Names of the primary key columns, empty when the table has none.
    pub fn get_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let primary_keys: Vec<String> = self
            .get_columns(table)?
            .into_iter()
            .filter(ColumnDescriptor::is_primary)
            .map(|c| c.name)
            .collect();
        debug!("Primary keys for table '{}': {:?}", table, primary_keys);
        Ok(primary_keys)
    }

    pub fn describe_table(&self, table: &str) -> Result<TableDescriptor> {
        let name = self.resolve_table(table)?;
        let columns = self.get_columns(&name)?;
        Ok(TableDescriptor { name, columns })
    }

    /// Creates a table from structured definitions or a raw fragment.
    ///
    /// Plain `CREATE TABLE`: an existing table of the same name is an error.
    pub fn create_table(&self, table: &str, columns: impl Into<ColumnSpec>) -> Result<()> {
        let sql = match columns.into() {
            ColumnSpec::Columns(columns) => build_create_table_sql(table, &columns)?,
            ColumnSpec::Raw(fragment) => format!(
                "CREATE TABLE {} ({})",
                quote(validate_new_identifier(table)?),
                promote_auto_increment_keys(&sanitize_fragment(&fragment)?)
            ),
        };
        self.execute_ddl(&sql, &format!("creating table '{}'", table))?;
        info!("Table '{}' created successfully.", table);
        Ok(())
    }

    /// Adds columns to an existing table.
    ///
    /// SQLite has no multi-clause ALTER, so each column gets its own
    /// `ADD COLUMN` statement; they run in one transaction.
    pub fn add_column(&self, table: &str, columns: impl Into<ColumnSpec>) -> Result<()> {
        let table = self.resolve_table(table)?;
        let statements = match columns.into() {
            ColumnSpec::Columns(columns) => columns
                .iter()
                .map(|column| {
                    Ok(format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        quote(&table),
                        column.render()?
                    ))
                })
                .collect::<Result<Vec<_>>>()?,
            ColumnSpec::Raw(fragment) => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote(&table),
                sanitize_fragment(&fragment)?
            )],
        };
        if statements.is_empty() {
            return Ok(());
        }

        self.in_transaction(&format!("adding columns to '{}'", table), |conn| {
            for sql in &statements {
                debug!("Executing SQL: {}", sql);
                conn.execute(sql, [])?;
            }
            Ok(())
        })?;
        info!("Added {} column(s) to table '{}'.", statements.len(), table);
        Ok(())
    }

    /// Renames, retypes and changes the nullability of existing columns.
    ///
    /// Renames map to `RENAME COLUMN`. Type or nullability changes rebuild the
    /// table through a shadow copy of its stored definition, so foreign keys,
    /// checks and collations carry over. Foreign-key enforcement is suspended
    /// while the old table is dropped. Everything runs in one transaction.
    pub fn modify_column(&self, table: &str, changes: &[ColumnChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let table = self.resolve_table(table)?;
        let columns = self.get_columns(&table)?;
        let planned = plan_changes(&columns, changes)?;
        let rebuild = planned.iter().any(|p| p.retype);

        let foreign_keys = rebuild && self.foreign_keys_enabled()?;
        if foreign_keys {
            self.set_foreign_keys(false)?;
        }
        let result = self.in_transaction(&format!("modifying columns in '{}'", table), |conn| {
            for change in planned.iter().filter(|p| p.old_name != p.new_name) {
                let sql = format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    quote(&table),
                    quote(&change.old_name),
                    quote(&change.new_name)
                );
                debug!("Executing SQL: {}", sql);
                conn.execute(&sql, [])?;
            }
            if rebuild {
                rebuild_table(conn, &table, &planned)?;
            }
            Ok(())
        });
        if foreign_keys {
            self.set_foreign_keys(true)?;
        }
        result?;
        info!("Modified {} column(s) in table '{}'.", planned.len(), table);
        Ok(())
    }

    pub fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        let table = self.resolve_table(table)?;
        let column = self.resolve_column(&table, column)?;
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote(&table),
            quote(&column)
        );
        self.execute_ddl(&sql, &format!("dropping column '{}' from '{}'", column, table))?;
        info!("Dropped column '{}' from table '{}'.", column, table);
        Ok(())
    }

    pub fn rename_table(&self, old_table: &str, new_table: &str) -> Result<()> {
        let old_table = self.resolve_table(old_table)?;
        let new_table = validate_new_identifier(new_table)?;
        let sql = format!(
            "ALTER TABLE {} RENAME TO {}",
            quote(&old_table),
            quote(new_table)
        );
        self.execute_ddl(
            &sql,
            &format!("renaming table '{}' to '{}'", old_table, new_table),
        )?;
        info!("Renamed table from '{}' to '{}'.", old_table, new_table);
        Ok(())
    }

    /// Empties a table and resets its AUTOINCREMENT counter.
    pub fn truncate_table(&self, table: &str) -> Result<()> {
        let table = self.resolve_table(table)?;
        let has_sequence = self.table_exists_raw("sqlite_sequence")?;
        self.in_transaction(&format!("truncating '{}'", table), |conn| {
            let sql = format!("DELETE FROM {}", quote(&table));
            debug!("Executing SQL: {}", sql);
            conn.execute(&sql, [])?;
            if has_sequence {
                conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1", [&table])?;
            }
            Ok(())
        })?;
        info!("Table '{}' truncated successfully.", table);
        Ok(())
    }

    /// Drops a table; a table that does not exist is left alone.
    pub fn drop_table(&self, table: &str) -> Result<()> {
        let tables = self.list_tables()?;
        let Some(table) = resolve(table, tables.iter().map(String::as_str)) else {
            debug!("Table '{}' does not exist, nothing to drop", table);
            return Ok(());
        };
        let sql = format!("DROP TABLE IF EXISTS {}", quote(&table));
        self.execute_ddl(&sql, &format!("dropping table '{}'", table))?;
        info!("Table '{}' dropped successfully.", table);
        Ok(())
    }

    fn execute_ddl(&self, sql: &str, action: &str) -> Result<()> {
        debug!("Executing SQL: {}", sql);
        self.conn.execute(sql, []).map(|_| ()).map_err(|e| {
            error!("Error {}: {}", action, e);
            DashError::from_ddl(e)
        })
    }

    fn in_transaction<F>(&self, action: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> std::result::Result<(), RebuildError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(DashError::from_ddl)?;
        match f(&*tx) {
            Ok(()) => tx.commit().map_err(|e| {
                error!("Error {}: {}", action, e);
                DashError::from_ddl(e)
            }),
            Err(e) => {
                error!("Error {}: {}", action, e);
                // Dropping `tx` rolls the statements back.
                Err(e.into())
            }
        }
    }

    fn table_exists_raw(&self, name: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .map_err(DashError::from_ddl)
    }

    fn foreign_keys_enabled(&self) -> Result<bool> {
        self.conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .map_err(DashError::from_ddl)
    }

    fn set_foreign_keys(&self, enabled: bool) -> Result<()> {
        self.conn
            .pragma_update(None, "foreign_keys", enabled)
            .map_err(DashError::from_ddl)
    }
}

/// Failure inside a multi-statement schema change: either the engine refused
/// a statement or a check between statements failed.
#[derive(Debug, Error)]
enum RebuildError {
    #[error(transparent)]
    Driver(#[from] rusqlite::Error),
    #[error(transparent)]
    Check(#[from] DashError),
}

impl From<RebuildError> for DashError {
    fn from(err: RebuildError) -> Self {
        match err {
            RebuildError::Driver(e) => DashError::from_ddl(e),
            RebuildError::Check(e) => e,
        }
    }
}

#[derive(Debug)]
struct PlannedChange {
    old_name: String,
    new_name: String,
    type_name: String,
    not_null: bool,
    retype: bool,
}

fn normalize_type(type_name: &str) -> String {
    type_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn plan_changes(columns: &[ColumnDescriptor], changes: &[ColumnChange]) -> Result<Vec<PlannedChange>> {
    let mut planned = Vec::with_capacity(changes.len());
    for change in changes {
        let Some(column) = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&change.old_name))
        else {
            return Err(DashError::schema(format!(
                "column '{}' does not exist",
                change.old_name
            )));
        };
        if planned
            .iter()
            .any(|p: &PlannedChange| p.old_name == column.name)
        {
            return Err(DashError::schema(format!(
                "column '{}' is modified more than once",
                column.name
            )));
        }
        let new_name = validate_new_identifier(&change.new_name)?.to_string();
        let type_name = validate_type_name(&change.type_name)?.to_string();
        let retype = normalize_type(&type_name) != normalize_type(&column.declared_type)
            || change.not_null == column.nullable;
        planned.push(PlannedChange {
            old_name: column.name.clone(),
            new_name,
            type_name,
            not_null: change.not_null,
            retype,
        });
    }

    // Final names must stay unique across the table.
    let mut final_names = HashSet::new();
    for column in columns {
        let name = planned
            .iter()
            .find(|p| p.old_name == column.name)
            .map_or(column.name.as_str(), |p| p.new_name.as_str());
        if !final_names.insert(name.to_ascii_lowercase()) {
            return Err(DashError::schema(format!(
                "column name '{}' would appear twice",
                name
            )));
        }
    }
    Ok(planned)
}

/// Copies `table` into a shadow table built from its stored definition with
/// the changed columns retyped, then swaps it in place and restores indexes
/// and triggers. Columns have already been renamed when this runs.
fn rebuild_table(
    conn: &Connection,
    table: &str,
    planned: &[PlannedChange],
) -> std::result::Result<(), RebuildError> {
    let create_sql: String = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    let mut definition = TableDefinition::parse(&create_sql)?;
    for change in planned.iter().filter(|p| p.retype) {
        definition.retype_column(&change.new_name, &change.type_name, change.not_null)?;
    }
    // Generated columns are not listed here and are recomputed by the copy.
    let columns = SchemaManager::new(conn).get_columns(table)?;
    let shadow = format!("{}{}", REBUILD_PREFIX, table);

    let dependents: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT sql FROM sqlite_master
             WHERE tbl_name = ?1 AND type IN ('index', 'trigger') AND sql IS NOT NULL",
        )?;
        let rows = stmt.query_map([table], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    let sequence: Option<i64> = if declares_autoincrement(&create_sql) {
        conn.query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?
    } else {
        None
    };

    let column_list: Vec<String> = columns.iter().map(|c| quote(&c.name)).collect();
    let column_list = column_list.join(", ");
    let statements = [
        definition.render(&shadow),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote(&shadow),
            column_list,
            column_list,
            quote(table)
        ),
        format!("DROP TABLE {}", quote(table)),
    ];
    for sql in &statements {
        debug!("Executing SQL: {}", sql);
        conn.execute(sql, [])?;
    }
    rename_into_place(conn, &shadow, table)?;
    for sql in &dependents {
        debug!("Executing SQL: {}", sql);
        conn.execute(sql, [])?;
    }
    if let Some(seq) = sequence {
        conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1", [table])?;
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            rusqlite::params![table, seq],
        )?;
    }

    let violations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_foreign_key_check(?1)",
        [table],
        |row| row.get(0),
    )?;
    if violations > 0 {
        return Err(DashError::schema(format!(
            "rebuilding '{}' would leave {} foreign key violation(s)",
            table, violations
        ))
        .into());
    }
    Ok(())
}

/// Renames the shadow table onto the name of the table it replaces.
///
/// Views and triggers elsewhere that name the table cannot be parsed while it
/// is absent, so the rename runs with legacy semantics, which leave them
/// untouched.
fn rename_into_place(conn: &Connection, shadow: &str, table: &str) -> rusqlite::Result<()> {
    let legacy: bool = conn.query_row("PRAGMA legacy_alter_table", [], |row| row.get(0))?;
    conn.pragma_update(None, "legacy_alter_table", true)?;
    let sql = format!("ALTER TABLE {} RENAME TO {}", quote(shadow), quote(table));
    debug!("Executing SQL: {}", sql);
    let renamed = conn.execute(&sql, []);
    conn.pragma_update(None, "legacy_alter_table", legacy)?;
    renamed.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_test_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT UNIQUE,
                age INTEGER DEFAULT 18
            );
            CREATE INDEX idx_users_age ON users(age);
            CREATE TABLE tags (
                post_id INTEGER,
                label TEXT,
                PRIMARY KEY (post_id, label)
            );
        ",
        )
    }

    fn column(name: &str, declared_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            nullable: true,
            key: KeyRole::None,
            default: None,
            extra: None,
        }
    }

    #[test]
    fn test_list_tables_skips_internal_tables() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        conn.execute("INSERT INTO users (name) VALUES ('a')", []).unwrap();

        let tables = SchemaManager::new(&conn).list_tables().unwrap();
        assert_eq!(tables, vec!["users", "tags"]);
    }

    #[test]
    fn test_column_metadata() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        let columns = SchemaManager::new(&conn).get_columns("users").unwrap();

        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].key, KeyRole::Primary);
        assert!(!columns[0].nullable);
        assert!(columns[0].is_auto_increment());

        assert_eq!(columns[1].name, "name");
        assert!(!columns[1].nullable);
        assert_eq!(columns[1].key, KeyRole::None);

        assert!(columns[2].nullable);
        assert_eq!(columns[3].default.as_deref(), Some("18"));
        assert!(columns[3].extra.is_none());
    }

    #[test]
    fn test_missing_table_is_a_schema_error() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SchemaManager::new(&conn).get_columns("ghost");
        match result {
            Err(DashError::Schema { message, .. }) => assert!(message.contains("ghost")),
            other => panic!("Expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_primary_keys() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        conn.execute_batch("CREATE TABLE notes (body TEXT)").unwrap();
        let schema = SchemaManager::new(&conn);

        assert_eq!(schema.get_primary_keys("users").unwrap(), vec!["id"]);
        assert_eq!(schema.get_primary_keys("tags").unwrap(), vec!["post_id", "label"]);
        assert!(schema.get_primary_keys("notes").unwrap().is_empty());
    }

    #[test]
    fn test_format_column_definition() {
        let mut id = column("id", "integer");
        id.key = KeyRole::Primary;
        id.nullable = false;
        id.extra = Some(AUTO_INCREMENT.to_string());
        assert_eq!(format_column_definition(&id), "id INTEGER PRIMARY KEY AUTOINCREMENT");

        let email = column("email", "varchar(255)");
        assert_eq!(format_column_definition(&email), "email VARCHAR(255) DEFAULT NULL");

        let mut age = column("age", "INT");
        age.default = Some("18".to_string());
        assert_eq!(format_column_definition(&age), "age INT");

        let mut blank_default = column("note", "TEXT");
        blank_default.default = Some(String::new());
        assert_eq!(format_column_definition(&blank_default), "note TEXT DEFAULT NULL");

        let mut required = column("name", "TEXT");
        required.nullable = false;
        assert_eq!(format_column_definition(&required), "name TEXT");
    }

    #[test]
    fn test_build_create_table_sql_collects_primary_keys() {
        let sql = build_create_table_sql(
            "tags",
            &[
                ColumnDef::new("post_id", "INT").primary().not_null(),
                ColumnDef::new("label", "VARCHAR(20)").primary(),
                ColumnDef::new("weight", "REAL").default_value(1.5),
            ],
        )
        .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"tags\" (\"post_id\" INT NOT NULL, \"label\" VARCHAR(20), \
             \"weight\" REAL DEFAULT 1.5, PRIMARY KEY (\"post_id\", \"label\"))"
        );
    }

    #[test]
    fn test_build_create_table_sql_rejects_bad_input() {
        assert!(build_create_table_sql("t", &[]).is_err());
        assert!(build_create_table_sql("t;drop", &[ColumnDef::new("a", "INT")]).is_err());
        assert!(build_create_table_sql("t", &[ColumnDef::new("a", "INT); DROP TABLE x")]).is_err());
        assert!(build_create_table_sql(
            "t",
            &[ColumnDef::new("a", "INT"), ColumnDef::new("A", "TEXT")]
        )
        .is_err());
        // Auto-increment needs a sole integer primary key.
        assert!(build_create_table_sql("t", &[ColumnDef::new("a", "INT").auto_increment()]).is_err());
        assert!(build_create_table_sql(
            "t",
            &[
                ColumnDef::new("a", "INT").primary().auto_increment(),
                ColumnDef::new("b", "INT").primary()
            ]
        )
        .is_err());
        assert!(build_create_table_sql("t", &[ColumnDef::new("a", "TEXT").primary().auto_increment()]).is_err());
    }

    #[test]
    fn test_create_table_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = SchemaManager::new(&conn);
        schema
            .create_table(
                "people",
                vec![
                    ColumnDef::new("person_id", "INT").primary().auto_increment().not_null(),
                    ColumnDef::new("name", "VARCHAR(255)").not_null(),
                    ColumnDef::new("born", "DATE"),
                ],
            )
            .unwrap();

        let columns = schema.get_columns("people").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["person_id", "name", "born"]);
        assert_eq!(columns[0].declared_type, "INTEGER");
        assert!(columns[0].is_primary());
        assert!(columns[0].is_auto_increment());
        assert_eq!(columns[1].declared_type, "VARCHAR(255)");
        assert!(!columns[1].nullable);
        assert_eq!(columns[2].declared_type, "DATE");
        assert_eq!(columns[2].key, KeyRole::None);
    }

    #[test]
    fn test_create_table_conflict_and_raw_fragment() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = SchemaManager::new(&conn);
        schema
            .create_table("items", "id INT PRIMARY KEY AUTO_INCREMENT, label VARCHAR(50)")
            .unwrap();
        let columns = schema.get_columns("items").unwrap();
        assert!(columns[0].is_auto_increment());
        assert_eq!(columns[0].declared_type, "INTEGER");
        assert_eq!(columns[1].declared_type, "VARCHAR(50)");

        schema
            .create_table("legacy", "id INT NOT NULL AUTO_INCREMENT, note TEXT, PRIMARY KEY (id)")
            .unwrap();
        assert!(schema.get_columns("legacy").unwrap()[0].is_auto_increment());

        match schema.create_table("items", "id INTEGER") {
            Err(DashError::Schema { source, .. }) => assert!(source.is_some()),
            other => panic!("Expected Schema error, got {:?}", other),
        }
        assert!(schema
            .create_table("evil", "id INTEGER); DROP TABLE items; --")
            .is_err());
        assert!(schema.list_tables().unwrap().contains(&"items".to_string()));
    }

    #[test]
    fn test_add_columns_in_one_call() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        let schema = SchemaManager::new(&conn);

        schema
            .add_column(
                "users",
                vec![
                    ColumnDef::new("city", "TEXT"),
                    ColumnDef::new("score", "REAL").not_null().default_value(0.0),
                ],
            )
            .unwrap();
        schema.add_column("USERS", "nickname VARCHAR(30)").unwrap();

        let names: Vec<String> = schema
            .get_columns("users")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id", "name", "email", "age", "city", "score", "nickname"]);
    }

    #[test]
    fn test_add_column_failure_rolls_back_the_batch() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        let schema = SchemaManager::new(&conn);

        let result = schema.add_column(
            "users",
            vec![
                ColumnDef::new("city", "TEXT"),
                // NOT NULL without a default is refused by SQLite.
                ColumnDef::new("zip", "TEXT").not_null(),
            ],
        );
        assert!(matches!(result, Err(DashError::Schema { .. })));
        assert_eq!(schema.get_columns("users").unwrap().len(), 4);
    }

    #[test]
    fn test_modify_column_rename_only() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        conn.execute("INSERT INTO users (name, age) VALUES ('a', 30)", []).unwrap();
        let schema = SchemaManager::new(&conn);

        schema
            .modify_column("users", &[ColumnChange::new("age", "years", "INTEGER", false)])
            .unwrap();

        let years = schema.resolve_column("users", "years").unwrap();
        assert_eq!(years, "years");
        let value: i64 = conn
            .query_row("SELECT years FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn test_modify_column_retype_rebuilds_table() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (name, email, age) VALUES ('a', 'a@x.io', 30);
             INSERT INTO users (name, email, age) VALUES ('b', 'b@x.io', 40);",
        )
        .unwrap();
        let schema = SchemaManager::new(&conn);

        schema
            .modify_column(
                "users",
                &[
                    ColumnChange::new("email", "mail", "VARCHAR(320)", true),
                    ColumnChange::new("age", "age", "REAL", false),
                ],
            )
            .unwrap();

        let columns = schema.get_columns("users").unwrap();
        let mail = columns.iter().find(|c| c.name == "mail").unwrap();
        assert_eq!(mail.declared_type, "VARCHAR(320)");
        assert!(!mail.nullable);
        let age = columns.iter().find(|c| c.name == "age").unwrap();
        assert_eq!(age.declared_type, "REAL");
        assert_eq!(age.default.as_deref(), Some("18"));
        assert!(columns[0].is_auto_increment());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        assert!(conn
            .execute("INSERT INTO users (name, mail) VALUES ('dup', 'a@x.io')", [])
            .is_err());
        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_users_age'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 1);

        // The AUTOINCREMENT counter survives the rebuild.
        conn.execute("INSERT INTO users (name, mail) VALUES ('c', 'c@x.io')", []).unwrap();
        let id: i64 = conn
            .query_row("SELECT id FROM users WHERE name = 'c'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, 3);
        assert!(schema.list_tables().unwrap().iter().all(|t| !t.starts_with(REBUILD_PREFIX)));
    }

    #[test]
    fn test_modify_column_keeps_foreign_keys_and_checks() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        conn.execute_batch(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER REFERENCES parent(id),
                 qty INTEGER CHECK (qty > 0),
                 note TEXT COLLATE NOCASE
             );
             INSERT INTO parent (id) VALUES (1);
             INSERT INTO child (parent_id, qty, note) VALUES (1, 2, 'x');",
        )
        .unwrap();
        let schema = SchemaManager::new(&conn);

        schema
            .modify_column("child", &[ColumnChange::new("note", "note", "VARCHAR(10)", false)])
            .unwrap();

        let note = schema.get_columns("child").unwrap().pop().unwrap();
        assert_eq!(note.declared_type, "VARCHAR(10)");
        let fk_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pragma_foreign_key_list('child')", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(fk_count, 1);
        assert!(conn
            .execute("INSERT INTO child (parent_id, qty) VALUES (99, 1)", [])
            .is_err());
        assert!(conn
            .execute("INSERT INTO child (parent_id, qty) VALUES (1, -5)", [])
            .is_err());
        let matched: i64 = conn
            .query_row("SELECT COUNT(*) FROM child WHERE note = 'X'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(matched, 1, "collation survives the rebuild");
    }

    #[test]
    fn test_modify_column_with_dependent_view() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
             CREATE VIEW tv AS SELECT v FROM t;
             INSERT INTO t (v) VALUES ('12');",
        )
        .unwrap();
        let schema = SchemaManager::new(&conn);

        schema
            .modify_column("t", &[ColumnChange::new("v", "v", "INTEGER", false)])
            .unwrap();

        assert_eq!(schema.get_columns("t").unwrap()[1].declared_type, "INTEGER");
        let v: i64 = conn
            .query_row("SELECT v FROM tv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, 12);
        let legacy: bool = conn
            .query_row("PRAGMA legacy_alter_table", [], |row| row.get(0))
            .unwrap();
        assert!(!legacy);
    }

    #[test]
    fn test_autoincrement_detection_ignores_names_and_defaults() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE flags (
                 id INTEGER PRIMARY KEY,
                 autoincrement_flag INTEGER,
                 note TEXT DEFAULT 'AUTOINCREMENT'
             );",
        )
        .unwrap();
        let columns = SchemaManager::new(&conn).get_columns("flags").unwrap();
        assert!(columns.iter().all(|c| !c.is_auto_increment()));
    }

    #[test]
    fn test_modify_column_failure_leaves_table_intact() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        setup_test_schema(&conn).unwrap();
        conn.execute("INSERT INTO users (name) VALUES ('no email')", []).unwrap();
        let schema = SchemaManager::new(&conn);

        // Existing NULL emails violate the new NOT NULL constraint.
        let result = schema.modify_column(
            "users",
            &[ColumnChange::new("email", "contact", "TEXT", true)],
        );
        assert!(matches!(result, Err(DashError::Schema { .. })));
        assert!(schema.resolve_column("users", "email").is_ok());
        assert!(schema.resolve_column("users", "contact").is_err());

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1, "foreign key enforcement is restored");
    }

    #[test]
    fn test_modify_column_rejects_unknown_and_colliding_names() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        let schema = SchemaManager::new(&conn);

        assert!(schema
            .modify_column("users", &[ColumnChange::new("ghost", "g", "TEXT", false)])
            .is_err());
        assert!(schema
            .modify_column("users", &[ColumnChange::new("email", "name", "TEXT", false)])
            .is_err());
        assert!(schema
            .modify_column("users", &[ColumnChange::new("email", "e mail", "TEXT", false)])
            .is_err());
    }

    #[test]
    fn test_drop_rename_truncate_drop() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (name) VALUES ('a');
             INSERT INTO users (name) VALUES ('b');",
        )
        .unwrap();
        let schema = SchemaManager::new(&conn);

        schema.add_column("users", "nickname TEXT").unwrap();
        schema.drop_column("users", "NICKNAME").unwrap();
        assert!(schema.resolve_column("users", "nickname").is_err());
        assert!(schema.drop_column("users", "nickname").is_err());
        // SQLite refuses to drop UNIQUE columns.
        assert!(matches!(
            schema.drop_column("users", "email"),
            Err(DashError::Schema { source: Some(_), .. })
        ));

        schema.rename_table("users", "members").unwrap();
        assert!(schema.resolve_table("users").is_err());
        assert_eq!(schema.resolve_table("members").unwrap(), "members");
        assert!(schema.rename_table("members", "bad name").is_err());

        schema.truncate_table("members").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        conn.execute("INSERT INTO members (name) VALUES ('c')", []).unwrap();
        let id: i64 = conn
            .query_row("SELECT id FROM members", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, 1, "truncate resets the AUTOINCREMENT counter");

        schema.drop_table("members").unwrap();
        schema.drop_table("members").unwrap();
        assert_eq!(schema.list_tables().unwrap(), vec!["tags"]);
    }

    #[test]
    fn test_column_spec_parsing() {
        let spec = ColumnSpec::parse(
            r#"[{"name": "id", "type": "INT", "isPrimary": true, "autoIncrement": true},
                {"name": "name", "type": "TEXT", "not_null": true, "default": "n/a"}]"#,
        )
        .unwrap();
        match spec {
            ColumnSpec::Columns(columns) => {
                assert_eq!(columns.len(), 2);
                assert!(columns[0].is_primary && columns[0].auto_increment);
                assert!(columns[1].not_null);
                assert_eq!(columns[1].default, Some(Value::Text("n/a".to_string())));
            }
            other => panic!("Expected structured columns, got {:?}", other),
        }

        assert_eq!(
            ColumnSpec::parse(" age INT ").unwrap(),
            ColumnSpec::Raw("age INT".to_string())
        );
        assert!(matches!(
            ColumnSpec::parse(r#"{"name": "x", "type": "TEXT"}"#).unwrap(),
            ColumnSpec::Columns(ref c) if c.len() == 1
        ));

        let changes = ColumnChange::parse_list(
            r#"{"old_name": "a", "newName": "b", "type": "TEXT", "notNull": true}"#,
        )
        .unwrap();
        assert_eq!(changes, vec![ColumnChange::new("a", "b", "TEXT", true)]);
    }
}
