//! Auxiliary staging store
//!
//! A scratch SQLite database holding the ephemeral staging relation. The
//! file is created on demand and deleted after each unit of work; it never
//! holds durable state. The staging relation itself is a scoped resource
//! dropped on every exit path.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Name of the ephemeral staging relation
pub const STAGING_TABLE: &str = "staging";

/// Wrap a driver-level failure during staging into a single adapter error
pub(crate) fn adapter_error(err: rusqlite::Error) -> Error {
    Error::Adapter(err.to_string())
}

/// Quote an arbitrary map key as a SQLite identifier
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Handle to the auxiliary staging database.
///
/// Holds only the file location; a connection is opened per unit of work
/// and the file removed afterwards.
#[derive(Debug, Clone)]
pub struct StagingStore {
    path: PathBuf,
}

impl StagingStore {
    /// Create a handle for a staging database at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the staging database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a dedicated connection, creating the database file on demand
    pub(crate) fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path).map_err(adapter_error)
    }

    /// List the relations currently present in the staging store.
    ///
    /// A missing database file means no relations. Used to verify that no
    /// staging relation survives a bridge operation.
    pub fn relation_names(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .map_err(adapter_error)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(adapter_error)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }

    /// Delete the staging database file, best-effort.
    ///
    /// Called unconditionally after each unit of work; a missing file is
    /// not an error.
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Deleted staging store"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), "Failed to delete staging store: {}", err),
        }
    }
}

/// The ephemeral staging relation, scoped to one bridge operation.
///
/// Dropping the guard drops the table, so the relation cannot outlive the
/// operation that created it regardless of how the operation exits.
pub(crate) struct StagingRelation<'conn> {
    conn: &'conn Connection,
}

impl<'conn> StagingRelation<'conn> {
    /// Create the staging relation on the given connection
    pub fn create(conn: &'conn Connection) -> Result<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (_staging_row INTEGER PRIMARY KEY)",
                STAGING_TABLE
            ),
            [],
        )
        .map_err(adapter_error)?;
        debug!("Created staging relation");
        Ok(Self { conn })
    }

    /// Add a column for a map key; a `None` type yields a typeless column
    /// whose cells keep whatever affinity their values carry
    pub fn add_column(&self, key: &str, column_type: Option<&str>) -> Result<()> {
        let sql = match column_type {
            Some(ty) => format!("ALTER TABLE {} ADD COLUMN {} {}", STAGING_TABLE, quote_ident(key), ty),
            None => format!("ALTER TABLE {} ADD COLUMN {}", STAGING_TABLE, quote_ident(key)),
        };
        self.conn.execute(&sql, []).map_err(adapter_error)?;
        Ok(())
    }
}

impl Drop for StagingRelation<'_> {
    fn drop(&mut self) {
        if let Err(err) = self
            .conn
            .execute(&format!("DROP TABLE IF EXISTS {}", STAGING_TABLE), [])
        {
            warn!("Failed to drop staging relation: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_in(dir: &tempfile::TempDir) -> StagingStore {
        StagingStore::new(dir.path().join("staging.db"))
    }

    #[test]
    fn test_relation_names_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(&dir);
        assert!(staging.relation_names().unwrap().is_empty());
    }

    #[test]
    fn test_relation_dropped_with_guard() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(&dir);
        let conn = staging.connect().unwrap();
        {
            let relation = StagingRelation::create(&conn).unwrap();
            relation.add_column("value", Some("TEXT")).unwrap();
            let names = staging.relation_names().unwrap();
            assert_eq!(names, vec![STAGING_TABLE.to_string()]);
        }
        assert!(staging.relation_names().unwrap().is_empty());
        staging.remove();
        assert!(!staging.path().exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_in(&dir);
        staging.remove();
        staging.remove();
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("wei\"rd"), "\"wei\"\"rd\"");
    }
}
