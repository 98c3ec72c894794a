/// # Test Utilities Module
///
/// Shared fixtures for the unit tests: configured in-memory connections and a
/// small sample schema with rows in it.

use crate::core::db::{ConnectionProvider, ConnectionSettings};
use rusqlite::Connection;

/// An in-memory connection with the same pragmas a session connection gets.
pub fn memory_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory database");
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .expect("enable foreign keys");
    conn
}

/// A connected provider over a private in-memory database.
pub fn memory_provider() -> ConnectionProvider {
    ConnectionProvider::open(ConnectionSettings::in_memory()).expect("open in-memory provider")
}

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub connection: Connection,
}

impl DatabaseFixture {
    pub fn new() -> Self {
        DatabaseFixture {
            connection: memory_connection(),
        }
    }

    /// Create fixture with the sample schema and a few rows
    pub fn with_sample_data() -> Self {
        let fixture = Self::new();
        fixture
            .connection
            .execute_batch(
                "
                CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL,
                    active BOOLEAN DEFAULT 1,
                    joined DATE
                );

                CREATE TABLE posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    score REAL,
                    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
                );

                INSERT INTO users (username, email, joined) VALUES
                    ('alice', 'alice@example.com', '2024-01-05'),
                    ('bob', 'bob@example.com', '2024-03-17'),
                    ('charlie', 'charlie@example.com', NULL);

                INSERT INTO posts (user_id, title, score) VALUES
                    (1, 'Welcome to Rust', 4.5),
                    (2, 'My Trip to Paris', 3.0),
                    (1, 'Terminal dashboards', NULL);
            ",
            )
            .expect("create sample schema");
        fixture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data();
        let count: i64 = fixture
            .connection
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .expect("Failed to count posts");
        assert_eq!(count, 3);

        let fk: i64 = fixture
            .connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_memory_provider_is_connected() {
        assert!(memory_provider().is_connected());
    }
}
