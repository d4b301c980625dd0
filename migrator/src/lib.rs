#![cfg_attr(docsrs, feature(doc_cfg))]
//! `migrator` applies and reverts versioned SQL scripts and tracks what has been applied
//! in a history table inside the target database.
//!
//! Core concepts:
//! - Scripts live in a directory and are named `<14 digits>_<Name>_up.sql` or
//!   `<14 digits>_<Name>_down.sql`. The digits are the migration's version.
//! - A [MigrationService] compares the scripts a [MigrationFinder] discovers with the
//!   versions recorded by a [Runner], then executes what is pending.
//! - Every `up`/`down` call runs in a single transaction: either all pending scripts
//!   apply and the history is updated, or nothing changes.
//!
//! # Example
//!
//! ```
//! use migrator::{FileSystemMigrationFinder, MigrationService};
//! use migrator::sqlite::SqliteRunnerFactory;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("20121212000000_CreateUsers_up.sql"),
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY)",
//! ).unwrap();
//! std::fs::write(
//!     dir.path().join("20121212000000_CreateUsers_down.sql"),
//!     "DROP TABLE users",
//! ).unwrap();
//!
//! let service = MigrationService::new(
//!     FileSystemMigrationFinder::from_dir(dir.path()),
//!     SqliteRunnerFactory::new(dir.path().join("app.db")),
//! )
//! .on_migration_start(|version, name| println!("[{version}] {name}"))
//! .on_migration_complete(|| println!("done"));
//!
//! assert_eq!(service.up().unwrap().migrations_run, vec![20121212000000]);
//! assert_eq!(service.down(0).unwrap().migrations_run, vec![20121212000000]);
//! ```
//!
//! # Features
//! - Preview of what `up`/`down` would run, without executing anything.
//! - Migration history querying.
//! - Observability hooks.
//! - Tracing integration - available with the `tracing` feature flag.
//! - Testing utilities - available with the `testing` feature flag.
//!
//! # Database support
//!
//! - [`SQLite`](sqlite) - available with the `sqlite` feature flag (on by default).
//! - [`PostgreSQL`](postgres) - available with the `postgres` feature flag.

mod core;
pub use core::{
    ensure_unique_versions, Direction, Migration, MigrationReport, DEFAULT_HISTORY_TABLE_NAME,
};

mod error;
pub use error::Error;

mod finder;
pub use finder::{
    FileSystem, FileSystemMigrationFinder, MigrationFinder, OsFileSystem, SQL_FILE_EXTENSION,
};

mod runner;
pub use runner::{Runner, RunnerFactory};

mod history;
pub use history::{HistoryBackend, HistoryTableRunner, HistoryTableState};

mod service;
pub use service::MigrationService;

pub mod batch;
pub use batch::split_batches;

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

#[cfg(all(test, feature = "postgres"))]
pub(crate) mod test_postgres;
