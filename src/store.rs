//! Primary store - the durable SQLite database
//!
//! Owns the live connection migration steps run against and the
//! schema-version record tracking which migrations have been applied.

use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::Result;

/// SQL to create the schema-version relation
const CREATE_VERSION_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL, PRIMARY KEY(version))";

/// Handle to the primary store.
///
/// The primary store and the auxiliary staging store are distinct
/// databases; staging work never touches this connection.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    /// The live connection migration steps and decoders run against
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Open a second, independent connection to the same database.
    ///
    /// Returns `None` for in-memory stores, which have exactly one handle.
    pub fn reopen(&self) -> Result<Option<Connection>> {
        match &self.path {
            Some(path) => Ok(Some(Connection::open(path)?)),
            None => Ok(None),
        }
    }

    /// Read the persisted schema version.
    ///
    /// `None` means the store has never been stamped - a fresh database
    /// with no version relation or an empty one.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        if !self.has_relation("schema_version")? {
            return Ok(None);
        }
        let version = self
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;
        Ok(version)
    }

    /// Persist the schema version in a single transactional write
    pub fn set_schema_version(&self, version: u32) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(CREATE_VERSION_TABLE, [])?;
        tx.execute("DELETE FROM schema_version", [])?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
        debug!(version, "Updated schema version record");
        Ok(())
    }

    /// Check whether a relation exists
    pub fn has_relation(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List all relations in the store
    pub fn relation_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }

    /// Run a batch of schema statements
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_has_no_version() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), None);
    }

    #[test]
    fn test_version_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store.set_schema_version(3).unwrap();
        assert_eq!(store.schema_version().unwrap(), Some(3));

        store.set_schema_version(4).unwrap();
        assert_eq!(store.schema_version().unwrap(), Some(4));

        // exactly one row backs the record
        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_relation_inspection() {
        let store = Store::open_in_memory().unwrap();
        store
            .execute_batch("CREATE TABLE users (id TEXT PRIMARY KEY)")
            .unwrap();

        assert!(store.has_relation("users").unwrap());
        assert!(!store.has_relation("missing").unwrap());
        assert_eq!(store.relation_names().unwrap(), vec!["users".to_string()]);
    }

    #[test]
    fn test_reopen_in_memory_has_no_second_handle() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.reopen().unwrap().is_none());
    }

    #[test]
    fn test_reopen_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("data.db")).unwrap();
        store.set_schema_version(1).unwrap();

        let second = store.reopen().unwrap().unwrap();
        let version: u32 = second
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
