//! Generic history-table bookkeeping shared by every database runner.
//!
//! A database driver only implements the primitive [HistoryBackend] operations;
//! [HistoryTableRunner] composes them into a [Runner] that creates the history
//! table lazily and records or removes one row per executed migration.

use crate::core::{Direction, Migration};
use crate::error::Error;
use crate::runner::Runner;

/// Primitive, database-specific operations of a transactional session.
///
/// Implementations hold an open transaction. Dropping one without calling
/// [HistoryBackend::commit] must roll that transaction back.
pub trait HistoryBackend {
    /// Execute a raw migration script.
    fn execute_script(&mut self, script: &str) -> Result<(), Error>;

    fn is_history_table_present(&mut self) -> Result<bool, Error>;

    fn create_history_table(&mut self) -> Result<(), Error>;

    fn insert_history_record(&mut self, version: i64, name: &str) -> Result<(), Error>;

    fn delete_history_record(&mut self, version: i64) -> Result<(), Error>;

    /// All versions currently recorded in the history table.
    fn read_history(&mut self) -> Result<Vec<i64>, Error>;

    fn commit(&mut self) -> Result<(), Error>;
}

/// Quote `name` as an SQL identifier, doubling any embedded `"`.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// What a runner knows about the history table. Only ever moves forward:
/// `Unchecked -> Present`, `Unchecked -> Absent -> Created` or `Unchecked -> Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryTableState {
    /// Existence has not been queried yet.
    Unchecked,
    /// Queried and found missing; not created yet.
    Absent,
    /// Queried and found present.
    Present,
    /// Created by this runner.
    Created,
}

impl HistoryTableState {
    fn exists(self) -> bool {
        matches!(self, HistoryTableState::Present | HistoryTableState::Created)
    }
}

/// A [Runner] that keeps the history table in step with executed scripts.
#[derive(Debug)]
pub struct HistoryTableRunner<B> {
    backend: B,
    table_state: HistoryTableState,
}

impl<B: HistoryBackend> HistoryTableRunner<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            table_state: HistoryTableState::Unchecked,
        }
    }

    pub fn table_state(&self) -> HistoryTableState {
        self.table_state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Query table existence at most once per runner.
    fn check_history_table(&mut self) -> Result<HistoryTableState, Error> {
        if self.table_state == HistoryTableState::Unchecked {
            self.table_state = if self.backend.is_history_table_present()? {
                HistoryTableState::Present
            } else {
                HistoryTableState::Absent
            };
        }
        Ok(self.table_state)
    }

    fn ensure_history_table(&mut self) -> Result<(), Error> {
        if self.check_history_table()?.exists() {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Creating migration history table");

        self.backend.create_history_table()?;
        self.table_state = HistoryTableState::Created;
        Ok(())
    }
}

impl<B: HistoryBackend> Runner for HistoryTableRunner<B> {
    fn executed_migrations(&mut self) -> Result<Vec<i64>, Error> {
        if !self.check_history_table()?.exists() {
            #[cfg(feature = "tracing")]
            tracing::debug!("History table absent, no migrations executed yet");
            return Ok(vec![]);
        }
        self.backend.read_history()
    }

    fn execute_up(&mut self, migration: &Migration) -> Result<(), Error> {
        debug_assert_eq!(migration.direction(), Direction::Up);
        self.ensure_history_table()?;
        self.backend.execute_script(migration.content()?)?;
        self.backend
            .insert_history_record(migration.version(), migration.name())
    }

    fn execute_down(&mut self, migration: &Migration) -> Result<(), Error> {
        debug_assert_eq!(migration.direction(), Direction::Down);
        self.ensure_history_table()?;
        self.backend.execute_script(migration.content()?)?;
        self.backend.delete_history_record(migration.version())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.backend.commit()
    }
}
