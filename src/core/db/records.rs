/// Record Access Module
///
/// Generic insert/select/update/delete against one named table. The caller
/// names the identifier column for single-row operations; it does not have to
/// be the primary key. Values are always bound as parameters, while table and
/// column names are checked against the live catalog before they are written
/// into statement text.

use crate::core::db::identifier::{quote, resolve};
use crate::core::db::schema::SchemaManager;
use crate::core::db::{Record, Value};
use crate::core::{DashError, Result};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, error, info};

/// One page of rows from `RecordAccessor::read_many`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RecordPage {
    /// Zips every row with the column names.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// CRUD operations on one table.
pub struct RecordAccessor<'a> {
    conn: &'a Connection,
    table: String,
}

impl<'a> RecordAccessor<'a> {
    /// Binds to `table`, which must exist.
    pub fn open(conn: &'a Connection, table: &str) -> Result<Self> {
        let table = SchemaManager::new(conn).resolve_table(table)?;
        Ok(RecordAccessor { conn, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn column_names(&self) -> Result<Vec<String>> {
        Ok(SchemaManager::new(self.conn)
            .get_columns(&self.table)?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    fn resolve_column(&self, known: &[String], column: &str) -> Result<String> {
        resolve(column, known.iter().map(String::as_str)).ok_or_else(|| {
            DashError::data(format!(
                "column '{}' does not exist in table '{}'",
                column, self.table
            ))
        })
    }

    /// Inserts one row and returns the number of affected rows.
    ///
    /// An empty record inserts a row of defaults.
    pub fn create(&self, data: &Record) -> Result<usize> {
        let sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(&self.table))
        } else {
            let known = self.column_names()?;
            let columns = data
                .keys()
                .map(|key| self.resolve_column(&known, key).map(|c| quote(&c)))
                .collect::<Result<Vec<_>>>()?;
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&self.table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        let affected = self.execute(&sql, data.values())?;
        info!("Record inserted into table '{}'.", self.table);
        Ok(affected)
    }

    /// Row id generated by the most recent successful insert on this connection.
    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Fetches the row whose `id_column` equals `id`.
    pub fn read(&self, id: &Value, id_column: &str) -> Result<Option<Record>> {
        let known = self.column_names()?;
        let id_column = self.resolve_column(&known, id_column)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1",
            quote(&self.table),
            quote(&id_column)
        );
        debug!("Executing SQL: {}", sql);

        let mut stmt = self.conn.prepare(&sql).map_err(DashError::from_dml)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let record = stmt
            .query_row([id], |row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| Ok((name.clone(), Value::from_value_ref(row.get_ref(i)?))))
                    .collect::<rusqlite::Result<Record>>()
            })
            .optional()
            .map_err(|e| {
                error!("Error reading from table '{}': {}", self.table, e);
                DashError::from_dml(e)
            })?;
        Ok(record)
    }

    /// Fetches one page of rows in primary-key order, or rowid order for
    /// tables without a primary key.
    pub fn read_many(&self, limit: usize, offset: usize) -> Result<RecordPage> {
        let primary_keys = SchemaManager::new(self.conn).get_primary_keys(&self.table)?;
        let order_by = if primary_keys.is_empty() {
            "rowid".to_string()
        } else {
            primary_keys.iter().map(|k| quote(k)).collect::<Vec<_>>().join(", ")
        };
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} LIMIT ?1 OFFSET ?2",
            quote(&self.table),
            order_by
        );
        debug!("Executing SQL: {}", sql);

        let (Ok(limit), Ok(offset)) = (i64::try_from(limit), i64::try_from(offset)) else {
            return Err(DashError::data(format!(
                "page window {}+{} is out of range",
                offset, limit
            )));
        };
        let mut stmt = self.conn.prepare(&sql).map_err(DashError::from_dml)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();
        let rows = stmt
            .query_map([limit, offset], |row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(Value::from_value_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(DashError::from_dml)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| {
                error!("Error reading from table '{}': {}", self.table, e);
                DashError::from_dml(e)
            })?;
        Ok(RecordPage { columns, rows })
    }

    /// Updates the row whose `id_column` equals `id`.
    ///
    /// Returns the number of affected rows; an empty `data` touches nothing
    /// and returns 0.
    pub fn update(&self, id: &Value, data: &Record, id_column: &str) -> Result<usize> {
        if data.is_empty() {
            debug!("Nothing to update in table '{}'", self.table);
            return Ok(0);
        }
        let known = self.column_names()?;
        let id_column = self.resolve_column(&known, id_column)?;
        let assignments = data
            .keys()
            .enumerate()
            .map(|(i, key)| {
                self.resolve_column(&known, key)
                    .map(|c| format!("{} = ?{}", quote(&c), i + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote(&self.table),
            assignments.join(", "),
            quote(&id_column),
            data.len() + 1
        );

        let affected = self.execute(&sql, data.values().chain(std::iter::once(id)))?;
        info!("Updated {} record(s) in table '{}'.", affected, self.table);
        Ok(affected)
    }

    /// Deletes the row whose `id_column` equals `id`. An unknown id deletes
    /// nothing and returns 0.
    pub fn delete(&self, id: &Value, id_column: &str) -> Result<usize> {
        let known = self.column_names()?;
        let id_column = self.resolve_column(&known, id_column)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote(&self.table),
            quote(&id_column)
        );

        let affected = self.execute(&sql, std::iter::once(id))?;
        info!("Deleted {} record(s) from table '{}'.", affected, self.table);
        Ok(affected)
    }

    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(&self.table));
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(DashError::from_dml)?;
        Ok(count as usize)
    }

    fn execute<'v, I>(&self, sql: &str, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        debug!("Executing SQL: {}", sql);
        self.conn
            .execute(sql, params_from_iter(values))
            .map_err(|e| {
                error!("Error executing statement on table '{}': {}", self.table, e);
                DashError::from_dml(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_connection;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn setup(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE people (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT UNIQUE,
                age INTEGER
            );",
        )
        .unwrap();
    }

    #[test]
    fn test_open_requires_existing_table() {
        let conn = memory_connection();
        assert!(matches!(
            RecordAccessor::open(&conn, "ghost"),
            Err(DashError::Schema { .. })
        ));
        setup(&conn);
        assert_eq!(RecordAccessor::open(&conn, "PEOPLE").unwrap().table(), "people");
    }

    #[test]
    fn test_create_and_read() {
        let conn = memory_connection();
        setup(&conn);
        let people = RecordAccessor::open(&conn, "people").unwrap();

        let affected = people
            .create(&record(&[
                ("name", Value::from("Alice")),
                ("email", Value::from("alice@example.com")),
                ("age", Value::Integer(30)),
            ]))
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(people.last_insert_id(), 1);

        let alice = people.read(&Value::Integer(1), "id").unwrap().unwrap();
        let keys: Vec<&str> = alice.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "email", "age"]);
        assert_eq!(alice["name"], Value::from("Alice"));

        // Text ids are compared with the column's integer affinity.
        assert!(people.read(&Value::from("1"), "id").unwrap().is_some());
        assert!(people.read(&Value::Integer(99), "id").unwrap().is_none());
        assert!(people
            .read(&Value::from("alice@example.com"), "EMAIL")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_create_empty_record_uses_defaults() {
        let conn = memory_connection();
        conn.execute_batch("CREATE TABLE log (id INTEGER PRIMARY KEY, note TEXT DEFAULT 'n/a')")
            .unwrap();
        let log = RecordAccessor::open(&conn, "log").unwrap();

        assert_eq!(log.create(&Record::new()).unwrap(), 1);
        let row = log.read(&Value::Integer(1), "id").unwrap().unwrap();
        assert_eq!(row["note"], Value::from("n/a"));
    }

    #[test]
    fn test_create_failures_are_data_errors() {
        let conn = memory_connection();
        setup(&conn);
        let people = RecordAccessor::open(&conn, "people").unwrap();

        // NOT NULL violation
        match people.create(&record(&[("age", Value::Integer(3))])) {
            Err(err @ DashError::Data { .. }) => assert!(err.driver_error().is_some()),
            other => panic!("Expected Data error, got {:?}", other),
        }
        // Unknown column never reaches SQL text
        match people.create(&record(&[("name\"; DROP TABLE people; --", Value::Null)])) {
            Err(DashError::Data { source, .. }) => assert!(source.is_none()),
            other => panic!("Expected Data error, got {:?}", other),
        }
        assert_eq!(people.count().unwrap(), 0);
    }

    #[test]
    fn test_read_many_pages_in_key_order() {
        let conn = memory_connection();
        setup(&conn);
        let people = RecordAccessor::open(&conn, "people").unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            people.create(&record(&[("name", Value::from(name))])).unwrap();
        }

        let page = people.read_many(2, 2).unwrap();
        assert_eq!(page.columns, vec!["id", "name", "email", "age"]);
        assert_eq!(page.len(), 2);
        assert_eq!(page.rows[0][0], Value::Integer(3));
        assert_eq!(page.records()[1]["name"], Value::from("d"));

        assert!(people.read_many(10, 5).unwrap().is_empty());
        assert_eq!(people.read_many(10, 0).unwrap().len(), 5);
        assert!(matches!(
            people.read_many(10, usize::MAX),
            Err(DashError::Data { source: None, .. })
        ));
    }

    #[test]
    fn test_read_many_without_primary_key() {
        let conn = memory_connection();
        conn.execute_batch(
            "CREATE TABLE notes (body TEXT);
             INSERT INTO notes VALUES ('first'), ('second'), ('third');",
        )
        .unwrap();
        let notes = RecordAccessor::open(&conn, "notes").unwrap();

        let page = notes.read_many(2, 1).unwrap();
        assert_eq!(page.rows, vec![vec![Value::from("second")], vec![Value::from("third")]]);
    }

    #[test]
    fn test_update() {
        let conn = memory_connection();
        setup(&conn);
        let people = RecordAccessor::open(&conn, "people").unwrap();
        people.create(&record(&[("name", Value::from("Alice"))])).unwrap();

        let affected = people
            .update(
                &Value::Integer(1),
                &record(&[("name", Value::from("Alicia")), ("age", Value::Integer(31))]),
                "id",
            )
            .unwrap();
        assert_eq!(affected, 1);
        let row = people.read(&Value::Integer(1), "id").unwrap().unwrap();
        assert_eq!(row["name"], Value::from("Alicia"));
        assert_eq!(row["age"], Value::Integer(31));

        assert_eq!(people.update(&Value::Integer(1), &Record::new(), "id").unwrap(), 0);
        assert_eq!(
            people
                .update(&Value::Integer(42), &record(&[("age", Value::Integer(1))]), "id")
                .unwrap(),
            0
        );
        assert!(people
            .update(&Value::Integer(1), &record(&[("age", Value::Integer(1))]), "nope")
            .is_err());
    }

    #[test]
    fn test_delete() {
        let conn = memory_connection();
        setup(&conn);
        let people = RecordAccessor::open(&conn, "people").unwrap();
        people.create(&record(&[("name", Value::from("Alice"))])).unwrap();
        people.create(&record(&[("name", Value::from("Bob"))])).unwrap();

        assert_eq!(people.delete(&Value::Integer(1), "id").unwrap(), 1);
        assert_eq!(people.delete(&Value::Integer(1), "id").unwrap(), 0);
        assert_eq!(people.delete(&Value::from("Bob"), "name").unwrap(), 1);
        assert_eq!(people.count().unwrap(), 0);
    }
}
