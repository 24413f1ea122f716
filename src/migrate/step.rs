//! Migration steps - immutable version-to-version schema transformations

use rusqlite::Connection;

use crate::Result;

/// Deferred cleanup action, run on a second connection after a step
pub type CleanupFn = Box<dyn FnOnce(&Connection) -> Result<()>>;

/// What a step leaves behind after its forward transformation.
///
/// Cleanup runs on an independent connection: some dialects refuse to
/// drop a relation still referenced by the batch that obsoleted it.
pub enum Cleanup {
    /// The step left nothing behind
    None,
    /// Action dropping relations the forward transformation obsoleted
    Deferred(CleanupFn),
}

/// One registered, immutable schema transformation.
///
/// A step declares the schema version it transforms away from and applies
/// its forward statements against a live connection. Statements must be
/// guarded (conditional) so that re-running after a partial failure
/// tolerates prior partial application; there is no automatic rollback.
pub trait MigrationStep {
    /// Schema version this step transforms away from
    fn source_version(&self) -> u32;

    /// Apply the forward transformation
    fn apply(&self, conn: &Connection) -> Result<Cleanup>;
}

/// A migration step built from statement batches.
///
/// Covers the common case: a forward batch of schema statements and an
/// optional cleanup batch dropping whatever the forward pass obsoleted.
pub struct SqlStep {
    source_version: u32,
    forward: Vec<String>,
    cleanup: Vec<String>,
}

impl SqlStep {
    /// Create a step transforming away from `source_version`
    pub fn new(
        source_version: u32,
        forward: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            source_version,
            forward: forward.into_iter().map(Into::into).collect(),
            cleanup: Vec::new(),
        }
    }

    /// Attach a deferred cleanup batch
    pub fn with_cleanup(mut self, statements: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cleanup = statements.into_iter().map(Into::into).collect();
        self
    }
}

impl MigrationStep for SqlStep {
    fn source_version(&self) -> u32 {
        self.source_version
    }

    fn apply(&self, conn: &Connection) -> Result<Cleanup> {
        for sql in &self.forward {
            conn.execute_batch(sql)?;
        }
        if self.cleanup.is_empty() {
            return Ok(Cleanup::None);
        }
        let statements = self.cleanup.clone();
        Ok(Cleanup::Deferred(Box::new(move |conn: &Connection| {
            for sql in &statements {
                conn.execute_batch(sql)?;
            }
            Ok(())
        })))
    }
}
