//!
//! bookshelf database handle
//! -------------------------
//! A single SQLite connection shared by the catalog and credential stores.
//! The connection sits behind a `parking_lot::Mutex`; every store operation is
//! one statement, so holding the lock for its duration gives single-row
//! atomicity without explicit transactions.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS books (
    pk INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    classification TEXT NOT NULL DEFAULT '',
    id TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    secret BLOB NOT NULL
);
";

/// Cloneable handle to the shared connection.
#[derive(Clone)]
pub struct SharedDb(Arc<Mutex<Connection>>);

impl SharedDb {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
        debug!(path = %path.display(), "opened sqlite database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.0.lock()
    }

    /// Cheap liveness check run before every request.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_created_and_ping_succeeds() {
        let db = SharedDb::open_in_memory().unwrap();
        db.ping().unwrap();
        let conn = db.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('books', 'users')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn reopening_a_file_keeps_existing_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("books.db");
        {
            let db = SharedDb::open(&path).unwrap();
            db.lock()
                .execute("INSERT INTO books (title, author) VALUES ('a', 'b')", [])
                .unwrap();
        }
        let db = SharedDb::open(&path).unwrap();
        let n: i64 = db.lock().query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 1);
    }
}
