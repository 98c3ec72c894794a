/// Connection Management Module
///
/// This module owns the single live database handle of a session. The handle
/// is opened on demand, re-opened lazily after it has been closed, and the
/// database file is created when it does not exist yet.

use crate::core::{DashError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Settings needed to open the target database.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Path to the SQLite database file, or ":memory:"
    pub path: String,
    /// Whether a missing database file may be created
    pub create_if_missing: bool,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(path: impl Into<String>) -> Self {
        ConnectionSettings {
            path: path.into(),
            create_if_missing: true,
            busy_timeout: Duration::from_millis(5000),
        }
    }

    /// Settings for a throwaway in-memory database.
    pub fn in_memory() -> Self {
        ConnectionSettings::new(MEMORY_PATH)
    }

    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

/// Owns one database handle and re-creates it on demand.
#[derive(Debug)]
pub struct ConnectionProvider {
    settings: ConnectionSettings,
    connection: Option<Connection>,
}

impl ConnectionProvider {
    /// Creates a provider without opening the database yet.
    pub fn new(settings: ConnectionSettings) -> Self {
        ConnectionProvider {
            settings,
            connection: None,
        }
    }

    /// Creates a provider and opens the database immediately.
    pub fn open(settings: ConnectionSettings) -> Result<Self> {
        let mut provider = ConnectionProvider::new(settings);
        provider.connect()?;
        Ok(provider)
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Opens the database, creating it first when it does not exist.
    ///
    /// Any previously open handle is replaced.
    pub fn connect(&mut self) -> Result<()> {
        info!("Connecting to database at {}...", self.settings.path);

        let conn = if self.settings.is_memory() {
            Connection::open_in_memory().map_err(DashError::from_connect)?
        } else {
            if !self.database_exists() {
                self.create_database()?;
            }
            Connection::open_with_flags(&self.settings.path, OpenFlags::default())
                .map_err(DashError::from_connect)?
        };

        if let Err(e) = self.configure(&conn) {
            error!("Error configuring connection to {}: {}", self.settings.path, e);
            return Err(e);
        }

        self.connection = Some(conn);
        info!("Connected to database: {}", self.settings.path);
        Ok(())
    }

    fn configure(&self, conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(DashError::from_connect)?;
        conn.busy_timeout(self.settings.busy_timeout)
            .map_err(DashError::from_connect)?;
        if !self.settings.is_memory() {
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(DashError::from_connect)?;
            debug!("journal_mode for {} is {}", self.settings.path, mode);
        }
        Ok(())
    }

    /// Checks whether the database file is already present.
    pub fn database_exists(&self) -> bool {
        if self.settings.is_memory() {
            return true;
        }
        let exists = Path::new(&self.settings.path).is_file();
        debug!("Database '{}' exists: {}", self.settings.path, exists);
        exists
    }

    fn create_database(&self) -> Result<()> {
        if !self.settings.create_if_missing {
            return Err(DashError::connection(format!(
                "database '{}' does not exist and creation is disabled",
                self.settings.path
            )));
        }
        info!("Database '{}' does not exist. Creating it now...", self.settings.path);

        if let Some(parent) = Path::new(&self.settings.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    error!("Error creating directory {}: {}", parent.display(), e);
                    DashError::connection(format!(
                        "cannot create directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        Connection::open_with_flags(&self.settings.path, flags).map_err(|e| {
            error!("Error creating database {}: {}", self.settings.path, e);
            DashError::from_connect(e)
        })?;
        info!("Database '{}' created successfully.", self.settings.path);
        Ok(())
    }

    /// Returns the live connection, re-opening it first if it was closed.
    pub fn connection(&mut self) -> Result<&Connection> {
        if self.connection.is_none() {
            info!("Re-establishing database connection...");
            self.connect()?;
        }
        self.connection
            .as_ref()
            .ok_or_else(|| DashError::connection("connection unavailable after connect"))
    }

    /// Mutable access to the live connection, for callers that need
    /// `rusqlite::Connection::transaction`.
    pub fn connection_mut(&mut self) -> Result<&mut Connection> {
        if self.connection.is_none() {
            info!("Re-establishing database connection...");
            self.connect()?;
        }
        self.connection
            .as_mut()
            .ok_or_else(|| DashError::connection("connection unavailable after connect"))
    }

    /// Closes the handle; the next `connection()` call re-opens it.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.take() {
            conn.close().map_err(|(_, e)| DashError::from_connect(e))?;
            info!("Closed database connection to {}", self.settings.path);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_connection() {
        let mut provider = ConnectionProvider::new(ConnectionSettings::in_memory());
        assert!(!provider.is_connected());

        let conn = provider.connection().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
        assert!(provider.is_connected());
    }

    #[test]
    fn test_creates_missing_database_and_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.db");
        let settings = ConnectionSettings::new(path.to_string_lossy().to_string());

        let provider = ConnectionProvider::open(settings).unwrap();
        assert!(path.is_file());
        assert!(provider.database_exists());
    }

    #[test]
    fn test_missing_database_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        let mut settings = ConnectionSettings::new(path.to_string_lossy().to_string());
        settings.create_if_missing = false;

        let result = ConnectionProvider::open(settings);
        match result {
            Err(DashError::Connection { message, .. }) => {
                assert!(message.contains("does not exist"))
            }
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_lazy_reconnect_after_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reconnect.db");
        let mut provider =
            ConnectionProvider::open(ConnectionSettings::new(path.to_string_lossy().to_string()))
                .unwrap();

        provider
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE kept (id INTEGER PRIMARY KEY)")
            .unwrap();
        provider.close().unwrap();
        assert!(!provider.is_connected());

        let count: i64 = provider
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'kept'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(provider.is_connected());
    }

    #[test]
    fn test_unopenable_path_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        let mut settings = ConnectionSettings::new(dir.path().to_string_lossy().to_string());
        settings.create_if_missing = false;
        assert!(matches!(
            ConnectionProvider::open(settings),
            Err(DashError::Connection { .. })
        ));
    }
}
