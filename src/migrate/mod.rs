//! Migration Engine - brings the store to the current schema version
//!
//! Runs once at process start, before any request handling: reads the
//! persisted schema version, applies every registered step at or past it
//! in order, then persists the target version in a single write. A
//! failing step aborts the run with the version left at the last fully
//! completed value.

pub mod step;

use tracing::{debug, info};

use crate::store::Store;
use crate::{Error, Result};
use step::{Cleanup, MigrationStep};

/// What a migration run did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Fresh store: baseline schema applied, stamped directly at target
    Fresh { version: u32 },
    /// Store already at the target version; no statements executed
    UpToDate { version: u32 },
    /// Steps applied in order
    Migrated { from: u32, to: u32 },
}

/// Ordered set of migration steps plus the baseline schema for fresh
/// stores.
///
/// Steps are registered once at process start and never mutated or
/// removed. Registration order is execution order; the engine refuses to
/// run a list whose declared source versions are not contiguous.
#[derive(Default)]
pub struct MigrationEngine {
    steps: Vec<Box<dyn MigrationStep>>,
    baseline: Vec<String>,
}

impl MigrationEngine {
    /// Create an engine with no steps and no baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schema batch executed on a store that has never been
    /// stamped
    pub fn with_baseline(
        mut self,
        statements: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.baseline = statements.into_iter().map(Into::into).collect();
        self
    }

    /// Append an immutable step to the ordered execution list
    pub fn register_step(&mut self, step: impl MigrationStep + 'static) {
        self.steps.push(Box::new(step));
    }

    /// The version a fully migrated store carries: one past the last
    /// step's source version, or 1 for an engine with no steps
    pub fn target_version(&self) -> u32 {
        self.steps
            .last()
            .map(|step| step.source_version() + 1)
            .unwrap_or(1)
    }

    /// Reject gapped, duplicate, or out-of-order registrations before any
    /// statement executes
    fn validate(&self) -> Result<()> {
        for pair in self.steps.windows(2) {
            let previous = pair[0].source_version();
            let next = pair[1].source_version();
            if next != previous + 1 {
                return Err(Error::Migration(format!(
                    "steps must be contiguous in registration order: step from v{} follows step from v{}",
                    next, previous
                )));
            }
        }
        Ok(())
    }

    /// Bring the store to the target schema version.
    ///
    /// Idempotent: a store already at target sees zero schema statements.
    /// Any error aborts the run without bumping the persisted version, so
    /// a re-run picks up from the same point; steps must tolerate partial
    /// prior application via guarded statements.
    pub fn run(&self, store: &Store) -> Result<MigrationOutcome> {
        self.validate()?;
        let target = self.target_version();

        let Some(version) = store.schema_version()? else {
            info!(version = target, "Fresh store, applying baseline schema");
            for sql in &self.baseline {
                store
                    .execute_batch(sql)
                    .map_err(|err| Error::Migration(format!("baseline schema failed: {}", err)))?;
            }
            store.set_schema_version(target)?;
            return Ok(MigrationOutcome::Fresh { version: target });
        };

        if version == target {
            debug!(version, "Store already at target schema version");
            return Ok(MigrationOutcome::UpToDate { version });
        }
        if version > target {
            return Err(Error::Migration(format!(
                "store is at schema version {} but this binary targets {}",
                version, target
            )));
        }

        for step in &self.steps {
            let source = step.source_version();
            if source < version {
                continue;
            }
            info!(from = source, to = source + 1, "Applying migration step");
            let cleanup = step
                .apply(store.connection())
                .map_err(|err| Error::Migration(format!("step from v{} failed: {}", source, err)))?;
            match cleanup {
                Cleanup::None => {}
                Cleanup::Deferred(action) => {
                    debug!(from = source, "Running deferred cleanup");
                    let second = store.reopen()?;
                    match second {
                        Some(conn) => action(&conn),
                        // In-memory stores have exactly one handle
                        None => action(store.connection()),
                    }
                    .map_err(|err| {
                        Error::Migration(format!("cleanup after v{} failed: {}", source, err))
                    })?;
                }
            }
        }

        store.set_schema_version(target)?;
        info!(from = version, to = target, "Migration complete");
        Ok(MigrationOutcome::Migrated {
            from: version,
            to: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::step::SqlStep;
    use super::*;

    const BASELINE: &str = "CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY)";

    fn stamped_store(version: u32) -> Store {
        let store = Store::open_in_memory().unwrap();
        store.execute_batch(BASELINE).unwrap();
        store.set_schema_version(version).unwrap();
        store
    }

    #[test]
    fn test_fresh_store_gets_baseline_and_stamp() {
        let store = Store::open_in_memory().unwrap();
        let engine = MigrationEngine::new().with_baseline([BASELINE]);

        let outcome = engine.run(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::Fresh { version: 1 });
        assert!(store.has_relation("users").unwrap());
        assert_eq!(store.schema_version().unwrap(), Some(1));
    }

    #[test]
    fn test_two_steps_apply_in_order() {
        let store = stamped_store(1);
        let mut engine = MigrationEngine::new();
        engine.register_step(SqlStep::new(
            1,
            ["ALTER TABLE users ADD COLUMN display_name TEXT"],
        ));
        engine.register_step(SqlStep::new(
            2,
            ["CREATE TABLE IF NOT EXISTS sessions (token TEXT PRIMARY KEY)"],
        ));

        let outcome = engine.run(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { from: 1, to: 3 });
        assert_eq!(store.schema_version().unwrap(), Some(3));
        assert!(store.has_relation("sessions").unwrap());

        // second step saw the first step's work
        let column_count: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('users') WHERE name = 'display_name'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(column_count, 1);
    }

    #[test]
    fn test_run_is_idempotent() {
        let store = stamped_store(1);
        let mut engine = MigrationEngine::new();
        // unguarded on purpose: re-execution would fail with a duplicate column
        engine.register_step(SqlStep::new(1, ["ALTER TABLE users ADD COLUMN created INTEGER"]));

        assert_eq!(
            engine.run(&store).unwrap(),
            MigrationOutcome::Migrated { from: 1, to: 2 }
        );
        assert_eq!(
            engine.run(&store).unwrap(),
            MigrationOutcome::UpToDate { version: 2 }
        );
        assert_eq!(store.schema_version().unwrap(), Some(2));
    }

    #[test]
    fn test_steps_below_current_version_are_skipped() {
        let store = stamped_store(2);
        let mut engine = MigrationEngine::new();
        engine.register_step(SqlStep::new(1, ["CREATE TABLE skipped (x INTEGER)"]));
        engine.register_step(SqlStep::new(2, ["CREATE TABLE applied (x INTEGER)"]));

        let outcome = engine.run(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { from: 2, to: 3 });
        assert!(!store.has_relation("skipped").unwrap());
        assert!(store.has_relation("applied").unwrap());
    }

    #[test]
    fn test_failed_step_leaves_version_untouched() {
        let store = stamped_store(1);
        let mut engine = MigrationEngine::new();
        engine.register_step(SqlStep::new(
            1,
            ["CREATE TABLE IF NOT EXISTS first (x INTEGER)"],
        ));
        engine.register_step(SqlStep::new(2, ["THIS IS NOT SQL"]));

        let result = engine.run(&store);
        assert!(matches!(result, Err(Error::Migration(_))));
        assert_eq!(store.schema_version().unwrap(), Some(1));
    }

    #[test]
    fn test_gapped_registration_is_rejected() {
        let store = stamped_store(1);
        let mut engine = MigrationEngine::new();
        engine.register_step(SqlStep::new(1, ["CREATE TABLE a (x INTEGER)"]));
        engine.register_step(SqlStep::new(3, ["CREATE TABLE b (x INTEGER)"]));

        let result = engine.run(&store);
        assert!(matches!(result, Err(Error::Migration(_))));
        // rejected before any statement executed
        assert!(!store.has_relation("a").unwrap());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let store = stamped_store(1);
        let mut engine = MigrationEngine::new();
        engine.register_step(SqlStep::new(1, ["CREATE TABLE a (x INTEGER)"]));
        engine.register_step(SqlStep::new(1, ["CREATE TABLE b (x INTEGER)"]));

        assert!(matches!(engine.run(&store), Err(Error::Migration(_))));
    }

    #[test]
    fn test_store_newer_than_binary_is_rejected() {
        let store = stamped_store(5);
        let mut engine = MigrationEngine::new();
        engine.register_step(SqlStep::new(1, ["CREATE TABLE a (x INTEGER)"]));

        assert!(matches!(engine.run(&store), Err(Error::Migration(_))));
        assert_eq!(store.schema_version().unwrap(), Some(5));
    }

    #[test]
    fn test_deferred_cleanup_runs_on_second_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("data.db")).unwrap();
        store.execute_batch(BASELINE).unwrap();
        store.set_schema_version(1).unwrap();

        let mut engine = MigrationEngine::new();
        engine.register_step(
            SqlStep::new(
                1,
                ["ALTER TABLE users RENAME TO users_old;
                  CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, created INTEGER);
                  INSERT INTO users (id) SELECT id FROM users_old;"],
            )
            .with_cleanup(["DROP TABLE IF EXISTS users_old"]),
        );

        let outcome = engine.run(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::Migrated { from: 1, to: 2 });
        assert!(store.has_relation("users").unwrap());
        assert!(!store.has_relation("users_old").unwrap());
    }
}
