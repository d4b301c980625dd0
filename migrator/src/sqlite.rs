//! # SQLite migration support
//!
//! This module runs migration scripts against SQLite using the
//! [`rusqlite`](https://crates.io/crates/rusqlite) crate.
//!
//! ## Transaction Safety
//!
//! SQLite supports transactional DDL. A [SqliteRunnerFactory] opens one connection
//! and one transaction per [MigrationService](crate::MigrationService) call, so either
//! every targeted migration is committed or none is.
//!
//! ## Example
//!
//! ```
//! use migrator::{FileSystemMigrationFinder, MigrationService};
//! use migrator::sqlite::SqliteRunnerFactory;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scripts = tempfile::tempdir()?;
//! std::fs::write(
//!     scripts.path().join("20240101000000_create_users_up.sql"),
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
//! )?;
//! std::fs::write(
//!     scripts.path().join("20240101000000_create_users_down.sql"),
//!     "DROP TABLE users",
//! )?;
//!
//! let db = tempfile::tempdir()?;
//! let service = MigrationService::new(
//!     FileSystemMigrationFinder::from_dir(scripts.path()),
//!     SqliteRunnerFactory::new(db.path().join("app.db")),
//! );
//!
//! let report = service.up()?;
//! assert_eq!(report.migrations_run, vec![20240101000000]);
//!
//! let report = service.down(0)?;
//! assert_eq!(report.migrations_run, vec![20240101000000]);
//! # Ok(())
//! # }
//! ```

use crate::batch::split_batches;
use crate::core::DEFAULT_HISTORY_TABLE_NAME;
use crate::error::Error;
use crate::history::{quote_identifier, HistoryBackend, HistoryTableRunner};
use crate::runner::RunnerFactory;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A [HistoryBackend] holding an open SQLite transaction.
///
/// The transaction is begun on construction and rolled back on drop unless
/// [HistoryBackend::commit] succeeded.
pub struct SqliteBackend {
    conn: Connection,
    history_table_name: String,
    committed: bool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("history_table_name", &self.history_table_name)
            .field("committed", &self.committed)
            .finish()
    }
}

impl SqliteBackend {
    /// Begin a transaction on `conn`.
    pub fn begin(conn: Connection, history_table_name: impl Into<String>) -> Result<Self, Error> {
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn,
            history_table_name: history_table_name.into(),
            committed: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl HistoryBackend for SqliteBackend {
    fn execute_script(&mut self, script: &str) -> Result<(), Error> {
        for batch in split_batches(script) {
            if batch.trim().is_empty() {
                continue;
            }
            self.conn.execute_batch(batch)?;
        }
        Ok(())
    }

    fn is_history_table_present(&mut self) -> Result<bool, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        let present = stmt.query([&self.history_table_name])?.next()?.is_some();
        Ok(present)
    }

    fn create_history_table(&mut self) -> Result<(), Error> {
        self.conn.execute(
            &format!(
                "CREATE TABLE {} (Version INTEGER PRIMARY KEY NOT NULL, ScriptName TEXT NOT NULL)",
                quote_identifier(&self.history_table_name)
            ),
            [],
        )?;
        Ok(())
    }

    fn insert_history_record(&mut self, version: i64, name: &str) -> Result<(), Error> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (Version, ScriptName) VALUES (?1, ?2)",
                quote_identifier(&self.history_table_name)
            ),
            params![version, name],
        )?;
        Ok(())
    }

    fn delete_history_record(&mut self, version: i64) -> Result<(), Error> {
        self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE Version = ?1",
                quote_identifier(&self.history_table_name)
            ),
            params![version],
        )?;
        Ok(())
    }

    fn read_history(&mut self) -> Result<Vec<i64>, Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT Version FROM {} ORDER BY Version",
            quote_identifier(&self.history_table_name)
        ))?;
        let versions = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for SqliteBackend {
    fn drop(&mut self) {
        if self.committed || self.conn.is_autocommit() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("Rolling back uncommitted migration transaction");
        if let Err(_error) = self.conn.execute_batch("ROLLBACK") {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_error, "Failed to roll back migration transaction");
        }
    }
}

/// The [RunnerFactory] for SQLite databases.
#[derive(Debug, Clone)]
pub struct SqliteRunnerFactory {
    path: PathBuf,
    history_table_name: String,
    busy_timeout: Duration,
}

impl SqliteRunnerFactory {
    /// Open the database file at `path` for every runner.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            history_table_name: DEFAULT_HISTORY_TABLE_NAME.to_string(),
            busy_timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom name for the history table.
    /// Defaults to "_MigrationHistory".
    pub fn with_history_table_name(mut self, name: impl Into<String>) -> Self {
        self.history_table_name = name.into();
        self
    }

    /// Set how long a runner waits for locks held by other connections.
    /// Defaults to 30 seconds.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history_table_name(&self) -> &str {
        &self.history_table_name
    }

    fn open(&self) -> Result<Connection, Error> {
        let conn = Connection::open(&self.path)?;
        // Concurrent runs wait for the lock instead of failing immediately
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

impl RunnerFactory for SqliteRunnerFactory {
    type Runner = HistoryTableRunner<SqliteBackend>;

    fn create(&self) -> Result<Self::Runner, Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %self.path.display(), "Opening SQLite migration session");

        let backend = SqliteBackend::begin(self.open()?, self.history_table_name.clone())?;
        Ok(HistoryTableRunner::new(backend))
    }

    fn check_connection(&self) -> Result<(), Error> {
        let conn = self.open()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Direction, Migration};
    use crate::runner::Runner;
    use crate::{FileSystemMigrationFinder, HistoryTableState, MigrationService};
    use tempfile::TempDir;

    fn up(version: i64, name: &str, sql: &str) -> Migration {
        Migration::with_content(version, name, Direction::Up, sql)
    }

    fn down(version: i64, name: &str, sql: &str) -> Migration {
        Migration::with_content(version, name, Direction::Down, sql)
    }

    fn factory(dir: &TempDir) -> SqliteRunnerFactory {
        SqliteRunnerFactory::new(dir.path().join("test.db"))
    }

    fn tables(dir: &TempDir) -> Vec<String> {
        let conn = Connection::open(dir.path().join("test.db")).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn write_script(dir: &TempDir, file: &str, sql: &str) {
        std::fs::write(dir.path().join(file), sql).unwrap();
    }

    #[test]
    fn executed_migrations_on_fresh_database_does_not_create_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = factory(&dir).create().unwrap();

        assert!(runner.executed_migrations().unwrap().is_empty());
        runner.commit().unwrap();
        drop(runner);

        assert!(tables(&dir).is_empty());
    }

    #[test]
    fn committed_up_migration_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir);

        let mut runner = factory.create().unwrap();
        runner
            .execute_up(&up(20121212000000, "Foo", "CREATE TABLE foo (id INTEGER)"))
            .unwrap();
        assert_eq!(runner.table_state(), HistoryTableState::Created);
        runner.commit().unwrap();
        drop(runner);

        assert_eq!(tables(&dir), vec!["_MigrationHistory", "foo"]);
        let conn = Connection::open(dir.path().join("test.db")).unwrap();
        let row: (i64, String) = conn
            .query_row("SELECT Version, ScriptName FROM _MigrationHistory", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(row, (20121212000000, "Foo".to_string()));

        let mut runner = factory.create().unwrap();
        assert_eq!(runner.executed_migrations().unwrap(), vec![20121212000000]);
        assert_eq!(runner.table_state(), HistoryTableState::Present);
    }

    #[test]
    fn dropping_without_commit_rolls_back_everything() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir);

        let mut runner = factory.create().unwrap();
        runner
            .execute_up(&up(1, "Foo", "CREATE TABLE foo (id INTEGER)"))
            .unwrap();
        drop(runner);

        assert!(tables(&dir).is_empty());
    }

    #[test]
    fn down_migration_removes_history_row() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir);

        let mut runner = factory.create().unwrap();
        runner
            .execute_up(&up(1, "Foo", "CREATE TABLE foo (id INTEGER)"))
            .unwrap();
        runner.execute_down(&down(1, "Foo", "DROP TABLE foo")).unwrap();
        assert!(runner.executed_migrations().unwrap().is_empty());
        runner.commit().unwrap();
        drop(runner);

        assert_eq!(tables(&dir), vec!["_MigrationHistory"]);
    }

    #[test]
    fn scripts_with_go_separators_run_every_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = factory(&dir).create().unwrap();

        runner
            .execute_up(&up(
                1,
                "batches",
                "CREATE TABLE a (v TEXT);\nGO\nINSERT INTO a VALUES ('x\nGO\ny');\nGO\n",
            ))
            .unwrap();
        let value: String = runner
            .backend()
            .connection()
            .query_row("SELECT v FROM a", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, "x\nGO\ny");
    }

    #[test]
    fn custom_history_table_name_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir).with_history_table_name("schema_log");

        let mut runner = factory.create().unwrap();
        runner.execute_up(&up(1, "noop", "SELECT 1")).unwrap();
        runner.commit().unwrap();
        drop(runner);

        assert_eq!(tables(&dir), vec!["schema_log"]);
    }

    #[test]
    fn history_table_name_with_quote_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let factory = factory(&dir).with_history_table_name("odd\"log");

        let mut runner = factory.create().unwrap();
        runner.execute_up(&up(1, "noop", "SELECT 1")).unwrap();
        runner.commit().unwrap();
        drop(runner);

        assert_eq!(tables(&dir), vec!["odd\"log"]);
        let mut runner = factory.create().unwrap();
        assert_eq!(runner.executed_migrations().unwrap(), vec![1]);
        runner.execute_down(&down(1, "noop", "SELECT 1")).unwrap();
        runner.commit().unwrap();
        drop(runner);
        assert!(factory.create().unwrap().executed_migrations().unwrap().is_empty());
    }

    #[test]
    fn failing_script_surfaces_rusqlite_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = factory(&dir).create().unwrap();

        let result = runner.execute_up(&up(1, "broken", "bleep blorp"));

        assert!(matches!(result, Err(Error::Rusqlite(_))));
    }

    #[test]
    fn service_failure_leaves_database_untouched() {
        let scripts = tempfile::tempdir().unwrap();
        write_script(&scripts, "20121212000000_Foo_up.sql", "CREATE TABLE foo (id INTEGER)");
        write_script(&scripts, "20121212000001_Bar_up.sql", "bleep blorp");
        let dir = tempfile::tempdir().unwrap();
        let service =
            MigrationService::new(FileSystemMigrationFinder::from_dir(scripts.path()), factory(&dir));

        assert!(matches!(service.up(), Err(Error::Rusqlite(_))));
        assert!(tables(&dir).is_empty());
        assert!(service.executed_versions().unwrap().is_empty());
    }

    #[test]
    fn service_round_trip_against_sqlite() {
        let scripts = tempfile::tempdir().unwrap();
        write_script(&scripts, "20121212000000_Foo_up.sql", "CREATE TABLE foo (id INTEGER)");
        write_script(&scripts, "20121212000000_Foo_down.sql", "DROP TABLE foo");
        write_script(&scripts, "20121212000001_Bar_up.sql", "CREATE TABLE bar (id INTEGER)");
        write_script(&scripts, "20121212000001_Bar_down.sql", "DROP TABLE bar");
        let dir = tempfile::tempdir().unwrap();
        let service =
            MigrationService::new(FileSystemMigrationFinder::from_dir(scripts.path()), factory(&dir));

        let report = service.up().unwrap();
        assert_eq!(report.migrations_run, vec![20121212000000, 20121212000001]);
        assert_eq!(tables(&dir), vec!["_MigrationHistory", "bar", "foo"]);

        // second run is a no-op
        assert!(service.up().unwrap().migrations_run.is_empty());

        let report = service.down(20121212000000).unwrap();
        assert_eq!(report.migrations_run, vec![20121212000001]);
        assert_eq!(tables(&dir), vec!["_MigrationHistory", "foo"]);
        assert_eq!(service.executed_versions().unwrap(), vec![20121212000000]);

        let report = service.down(0).unwrap();
        assert_eq!(report.migrations_run, vec![20121212000000]);
        assert_eq!(tables(&dir), vec!["_MigrationHistory"]);
    }

    #[test]
    fn check_connection_succeeds_for_writable_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(factory(&dir).check_connection(), Ok(()));
    }

    #[test]
    fn check_connection_fails_for_missing_directory() {
        let factory = SqliteRunnerFactory::new("/definitely/not/here/test.db");
        assert!(matches!(factory.check_connection(), Err(Error::Rusqlite(_))));
    }
}
