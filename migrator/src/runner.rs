use crate::core::Migration;
use crate::error::Error;

/// A transactional session against one database.
///
/// A runner is a scoped resource: everything it executes becomes durable only
/// after [Runner::commit]. Dropping a runner releases its connection and rolls
/// back anything not committed.
pub trait Runner {
    /// Versions recorded in the history table. Never creates the table.
    fn executed_migrations(&mut self) -> Result<Vec<i64>, Error>;

    /// Execute an up migration and record it in the history table.
    fn execute_up(&mut self, migration: &Migration) -> Result<(), Error>;

    /// Execute a down migration and remove it from the history table.
    fn execute_down(&mut self, migration: &Migration) -> Result<(), Error>;

    fn commit(&mut self) -> Result<(), Error>;
}

/// Opens a new [Runner], and with it a new transaction, per call.
pub trait RunnerFactory {
    type Runner: Runner;

    fn create(&self) -> Result<Self::Runner, Error>;

    /// Run a trivial query to verify the database is reachable.
    fn check_connection(&self) -> Result<(), Error> {
        Ok(())
    }
}
