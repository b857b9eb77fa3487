//! SQLite storage for the database backend
//!
//! Owns the connection and the first-run schema/seed. Tool logic lives in
//! `tools`; this module only knows how to open, initialize and read rows
//! into JSON.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

/// Default database location
pub const DB_PATH: &str = "data/sample.db";

/// Seed rows for a fresh database
const SAMPLE_USERS: [(&str, &str, i64); 5] = [
    ("Alice Johnson", "alice@example.com", 28),
    ("Bob Smith", "bob@example.com", 34),
    ("Carol Davis", "carol@example.com", 26),
    ("David Wilson", "david@example.com", 42),
    ("Eva Brown", "eva@example.com", 31),
];

pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

impl Database {
    /// Open (creating parent directories as needed) a database file.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.display().to_string(),
        })
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: ":memory:".to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Create the users table and seed sample data on first run. Returns
    /// whether seeding happened.
    pub fn initialize(&self) -> rusqlite::Result<bool> {
        let conn = self.conn();

        let exists: bool = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='users'",
                [],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if exists {
            return Ok(false);
        }

        info!("initializing sample database");
        conn.execute(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                age INTEGER NOT NULL CHECK (age > 0),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        for (name, email, age) in SAMPLE_USERS {
            conn.execute(
                "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
                rusqlite::params![name, email, age],
            )?;
        }

        Ok(true)
    }
}

/// Convert one SQLite value into JSON.
pub fn sql_to_json(value: rusqlite::types::Value) -> Value {
    use rusqlite::types::Value as SqlValue;
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => json!(i),
        SqlValue::Real(f) => json!(f),
        SqlValue::Text(s) => json!(s),
        SqlValue::Blob(b) => json!(b),
    }
}

/// Run a parameterized query and collect every row as a JSON object keyed
/// by column name.
pub fn query_rows<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params)?;
    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = serde_json::Map::new();
        for (i, name) in column_names.iter().enumerate() {
            let value: rusqlite::types::Value = row.get(i)?;
            object.insert(name.clone(), sql_to_json(value));
        }
        data.push(Value::Object(object));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_seeds_once() {
        let db = Database::in_memory().unwrap();
        assert!(db.initialize().unwrap());
        assert!(!db.initialize().unwrap());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sample.db");

        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn query_rows_maps_columns() {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();

        let rows = query_rows(
            &db.conn(),
            "SELECT name, age FROM users WHERE email = ?",
            ["alice@example.com"],
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Alice Johnson");
        assert_eq!(rows[0]["age"], 28);
    }
}
