//! Schema migrations.
//!
//! Migrations are:
//! - **Versioned**: each has a unique version; they apply in version order
//! - **Forward-only**: there is no rollback, use a backup of the file instead
//! - **Transactional**: each migration and its bookkeeping row commit together
//! - **Validated**: an unknown applied version or a gap below the highest
//!   applied version is refused before anything runs
//!
//! ```rust,ignore
//! let mut manager = MigrationManager::new();
//! manager.register(Box::new(SqlMigration::new(1, "0001_initial", "CREATE TABLE ...")))?;
//! manager.run_pending(&mut conn)?;
//! ```

use crate::error::{CoreError, CoreResult};
use crate::store::table_exists;
use crate::types::now_millis;
use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;

/// Version number for migrations.
pub type MigrationVersion = u64;

const BOOKKEEPING_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL
);
";

/// Information about a registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version number.
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
    /// Description of what this migration does.
    pub description: Option<String>,
}

/// A migration recorded in `schema_migrations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Version number.
    pub version: MigrationVersion,
    /// Migration name.
    pub name: String,
    /// When the migration was applied (Unix milliseconds).
    pub applied_at: i64,
}

/// Migration state read from the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationState {
    /// Applied migrations in version order.
    pub applied: Vec<AppliedMigration>,
}

impl MigrationState {
    /// Reads the state. A database without the bookkeeping table has
    /// nothing applied.
    pub fn load(conn: &Connection) -> CoreResult<Self> {
        if !table_exists(conn, "schema_migrations")? {
            return Ok(Self::default());
        }
        let mut stmt =
            conn.prepare("SELECT version, name, applied_at FROM schema_migrations ORDER BY version")?;
        let applied = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    version: row.get::<_, i64>(0)? as MigrationVersion,
                    name: row.get(1)?,
                    applied_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { applied })
    }

    /// Highest applied version, 0 when nothing is applied.
    #[must_use]
    pub fn current_version(&self) -> MigrationVersion {
        self.applied.last().map(|m| m.version).unwrap_or(0)
    }

    /// Checks if a version has been applied.
    #[must_use]
    pub fn is_applied(&self, version: MigrationVersion) -> bool {
        self.applied.iter().any(|m| m.version == version)
    }
}

/// Result of running all pending migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Migrations applied by this run, in order.
    pub applied: Vec<MigrationInfo>,
    /// The schema version after the run.
    pub final_version: MigrationVersion,
}

/// Trait for defining migrations.
pub trait Migration: Send + Sync {
    /// Returns the version number for this migration.
    fn version(&self) -> MigrationVersion;

    /// Returns the name of this migration.
    fn name(&self) -> &str;

    /// Returns an optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Applies the migration inside the given transaction.
    fn up(&self, tx: &Transaction<'_>) -> CoreResult<()>;
}

/// A migration consisting of one embedded SQL batch.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    version: MigrationVersion,
    name: &'static str,
    description: Option<&'static str>,
    sql: &'static str,
}

impl SqlMigration {
    /// Creates a migration from an SQL batch.
    pub const fn new(version: MigrationVersion, name: &'static str, sql: &'static str) -> Self {
        Self {
            version,
            name,
            description: None,
            sql,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }
}

impl Migration for SqlMigration {
    fn version(&self) -> MigrationVersion {
        self.version
    }

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> Option<&str> {
        self.description
    }

    fn up(&self, tx: &Transaction<'_>) -> CoreResult<()> {
        tx.execute_batch(self.sql)?;
        Ok(())
    }
}

/// Manages schema migrations.
pub struct MigrationManager {
    migrations: BTreeMap<MigrationVersion, Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates an empty migration manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Registers a migration.
    ///
    /// Returns an error if the version is 0 or already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(CoreError::migration("migration versions start at 1"));
        }
        if self.migrations.contains_key(&version) {
            return Err(CoreError::migration(format!(
                "migration version {} already registered",
                version
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Returns registered migrations in version order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info(m.as_ref())).collect()
    }

    /// Highest registered version.
    #[must_use]
    pub fn latest_version(&self) -> MigrationVersion {
        self.migrations.keys().next_back().copied().unwrap_or(0)
    }

    /// Returns migrations not yet applied.
    #[must_use]
    pub fn pending(&self, state: &MigrationState) -> Vec<MigrationInfo> {
        self.migrations
            .values()
            .filter(|m| !state.is_applied(m.version()))
            .map(|m| info(m.as_ref()))
            .collect()
    }

    /// Checks that recorded state is consistent with the registered set.
    pub fn validate_state(&self, state: &MigrationState) -> CoreResult<()> {
        for applied in &state.applied {
            match self.migrations.get(&applied.version) {
                None => {
                    return Err(CoreError::migration(format!(
                        "unknown applied migration version {} ({})",
                        applied.version, applied.name
                    )))
                }
                Some(known) if known.name() != applied.name => {
                    return Err(CoreError::migration(format!(
                        "migration {} recorded as {:?} but registered as {:?}",
                        applied.version,
                        applied.name,
                        known.name()
                    )))
                }
                Some(_) => {}
            }
        }

        let highest = state.current_version();
        if let Some(missing) = self
            .migrations
            .keys()
            .find(|v| **v < highest && !state.is_applied(**v))
        {
            return Err(CoreError::migration(format!(
                "partial migration state: version {} missing below applied version {}",
                missing, highest
            )));
        }
        Ok(())
    }

    /// Validates the stored state and reports whether anything is pending.
    pub fn check(&self, conn: &Connection) -> CoreResult<MigrationState> {
        let state = MigrationState::load(conn)?;
        self.validate_state(&state)?;
        Ok(state)
    }

    /// Runs all pending migrations, each in its own transaction.
    ///
    /// Stops at the first failure; migrations applied before it stay applied.
    pub fn run_pending(&self, conn: &mut Connection) -> CoreResult<MigrationRunResult> {
        conn.execute_batch(BOOKKEEPING_TABLE)?;
        let state = self.check(conn)?;
        let mut applied = Vec::new();

        for migration in self
            .migrations
            .values()
            .filter(|m| !state.is_applied(m.version()))
        {
            let tx = conn.transaction()?;
            migration.up(&tx).map_err(|e| {
                CoreError::migration(format!("apply migration {}: {}", migration.name(), e))
            })?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version() as i64, migration.name(), now_millis()],
            )?;
            tx.commit().map_err(|e| {
                CoreError::migration(format!("commit migration {}: {}", migration.name(), e))
            })?;

            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "applied migration"
            );
            applied.push(info(migration.as_ref()));
        }

        let final_version = applied
            .last()
            .map(|m| m.version)
            .unwrap_or(state.current_version());
        Ok(MigrationRunResult {
            applied,
            final_version,
        })
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

fn info(migration: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: migration.version(),
        name: migration.name().to_string(),
        description: migration.description().map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(migrations: &[(u64, &'static str, &'static str)]) -> MigrationManager {
        let mut manager = MigrationManager::new();
        for (version, name, sql) in migrations {
            manager
                .register(Box::new(SqlMigration::new(*version, name, sql)))
                .unwrap();
        }
        manager
    }

    fn two_tables() -> MigrationManager {
        // Registered out of order on purpose.
        manager(&[
            (2, "0002_second", "CREATE TABLE second_table (id INTEGER PRIMARY KEY);"),
            (1, "0001_first", "CREATE TABLE first_table (id INTEGER PRIMARY KEY);"),
        ])
    }

    fn has_table(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn applies_in_order_and_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        let manager = two_tables();

        let result = manager.run_pending(&mut conn).unwrap();
        assert_eq!(result.final_version, 2);
        let names: Vec<_> = result.applied.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["0001_first", "0002_second"]);

        let rerun = manager.run_pending(&mut conn).unwrap();
        assert!(rerun.applied.is_empty());
        assert_eq!(rerun.final_version, 2);

        let state = MigrationState::load(&conn).unwrap();
        assert_eq!(state.applied.len(), 2);
    }

    #[test]
    fn duplicate_version_rejected() {
        let mut manager = two_tables();
        let err = manager
            .register(Box::new(SqlMigration::new(1, "dup", "SELECT 1;")))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert!(manager
            .register(Box::new(SqlMigration::new(0, "zero", "SELECT 1;")))
            .is_err());
    }

    #[test]
    fn unknown_applied_migration_fails() {
        let mut conn = Connection::open_in_memory().unwrap();
        let manager = two_tables();
        manager.run_pending(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (99, '0099_manual', 0)",
            [],
        )
        .unwrap();

        let err = manager.run_pending(&mut conn).unwrap_err();
        assert!(err.to_string().contains("unknown applied migration"));
    }

    #[test]
    fn partial_state_fails() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(BOOKKEEPING_TABLE).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (2, '0002_second', 0)",
            [],
        )
        .unwrap();

        let err = two_tables().run_pending(&mut conn).unwrap_err();
        assert!(err.to_string().contains("partial migration state"));
        assert!(!has_table(&conn, "first_table"));
    }

    #[test]
    fn renamed_migration_fails_validation() {
        let mut conn = Connection::open_in_memory().unwrap();
        two_tables().run_pending(&mut conn).unwrap();

        let renamed = manager(&[
            (1, "0001_renamed", "SELECT 1;"),
            (2, "0002_second", "SELECT 1;"),
        ]);
        assert!(renamed.check(&conn).is_err());
    }

    #[test]
    fn failed_migration_rolls_back_and_stops() {
        let mut conn = Connection::open_in_memory().unwrap();
        let manager = manager(&[
            (1, "0001_ok", "CREATE TABLE ok_table (id INTEGER PRIMARY KEY);"),
            (
                2,
                "0002_broken",
                "CREATE TABLE half_table (id INTEGER); THIS IS NOT SQL;",
            ),
            (3, "0003_never", "CREATE TABLE never_table (id INTEGER);"),
        ]);

        let err = manager.run_pending(&mut conn).unwrap_err();
        assert!(err.to_string().contains("0002_broken"));

        let state = MigrationState::load(&conn).unwrap();
        assert_eq!(state.current_version(), 1);
        assert!(has_table(&conn, "ok_table"));
        assert!(!has_table(&conn, "half_table"));
        assert!(!has_table(&conn, "never_table"));
    }

    #[test]
    fn pending_lists_unapplied() {
        let mut conn = Connection::open_in_memory().unwrap();
        let first_only = manager(&[(
            1,
            "0001_first",
            "CREATE TABLE first_table (id INTEGER PRIMARY KEY);",
        )]);
        first_only.run_pending(&mut conn).unwrap();

        let state = MigrationState::load(&conn).unwrap();
        let pending = two_tables().pending(&state);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].version, 2);
        assert_eq!(two_tables().latest_version(), 2);
    }
}
