use std::path::PathBuf;

/// Error type for the migrator crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Two discovered migrations of the same direction share a version.
    #[error("Duplicate migration version found: {0}")]
    DuplicateMigrationVersion(i64),
    /// A downgrade target that does not appear in the history table.
    #[error("Migration version {0} has never been executed against this database")]
    VersionNeverExecuted(i64),
    /// An executed version that has no down script on disk.
    #[error("No down migration script found for executed version {0}")]
    MigrationScriptMissing(i64),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid migration version in '{file}': {source}")]
    InvalidVersion {
        file: String,
        source: std::num::ParseIntError,
    },
    #[error("Failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
    #[error("{0}")]
    Generic(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}

// Manual PartialEq implementation because io::Error and postgres::Error don't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DuplicateMigrationVersion(a), Self::DuplicateMigrationVersion(b)) => a == b,
            (Self::VersionNeverExecuted(a), Self::VersionNeverExecuted(b)) => a == b,
            (Self::MigrationScriptMissing(a), Self::MigrationScriptMissing(b)) => a == b,
            (Self::InvalidArgument(a), Self::InvalidArgument(b)) => a == b,
            (
                Self::InvalidVersion {
                    file: a,
                    source: a_source,
                },
                Self::InvalidVersion {
                    file: b,
                    source: b_source,
                },
            ) => a == b && a_source == b_source,
            (
                Self::Io {
                    path: a,
                    source: a_source,
                },
                Self::Io {
                    path: b,
                    source: b_source,
                },
            ) => a == b && a_source.kind() == b_source.kind(),
            #[cfg(feature = "sqlite")]
            (Self::Rusqlite(a), Self::Rusqlite(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            (Self::Generic(a), Self::Generic(b)) => a == b,
            _ => false,
        }
    }
}
