//! Discovery of migration scripts on disk.
//!
//! Scripts follow the naming convention `<14-digit-version>_<name>_<up|down>.sql`,
//! matched case-insensitively. Any other `.sql` file (stored procedures, seed data,
//! ...) is ignored.

use crate::core::{Direction, Migration};
use crate::error::Error;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use walkdir::WalkDir;

/// File extension of migration scripts.
pub const SQL_FILE_EXTENSION: &str = "sql";

/// Access to the files holding migration scripts.
pub trait FileSystem {
    /// List the files below `dir` whose extension equals `extension` (case-insensitive).
    /// When `recursive` is false only the direct children of `dir` are listed.
    fn list_files(&self, dir: &Path, extension: &str, recursive: bool)
        -> Result<Vec<PathBuf>, Error>;

    /// Read a whole file as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> Result<String, Error>;
}

/// [FileSystem] backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_files(
        &self,
        dir: &Path,
        extension: &str,
        recursive: bool,
    ) -> Result<Vec<PathBuf>, Error> {
        let mut walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                Error::Io {
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if matches {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, Error> {
        std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Source of the up and down migrations available to a
/// [MigrationService](crate::MigrationService).
pub trait MigrationFinder {
    fn up_migrations(&self) -> Result<Vec<Migration>, Error>;
    fn down_migrations(&self) -> Result<Vec<Migration>, Error>;
}

fn up_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^([0-9]{14})_(.+)_up$").expect("valid regex"))
}

fn down_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^([0-9]{14})_(.+)_down$").expect("valid regex"))
}

/// Finds migrations by recursively scanning a directory for `.sql` files.
///
/// Every call rescans the directory; nothing is cached between calls.
#[derive(Debug)]
pub struct FileSystemMigrationFinder<FS> {
    file_system: Arc<FS>,
    path: PathBuf,
}

impl FileSystemMigrationFinder<OsFileSystem> {
    /// Scan `path` on the local file system.
    pub fn from_dir(path: impl Into<PathBuf>) -> Self {
        Self::new(OsFileSystem, path)
    }
}

impl<FS: FileSystem + 'static> FileSystemMigrationFinder<FS> {
    pub fn new(file_system: FS, path: impl Into<PathBuf>) -> Self {
        Self {
            file_system: Arc::new(file_system),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find(&self, direction: Direction) -> Result<Vec<Migration>, Error> {
        let pattern = match direction {
            Direction::Up => up_pattern(),
            Direction::Down => down_pattern(),
        };

        let files = self
            .file_system
            .list_files(&self.path, SQL_FILE_EXTENSION, true)?;

        let mut migrations = Vec::new();
        for file in files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(captures) = pattern.captures(stem) else {
                #[cfg(feature = "tracing")]
                tracing::trace!(file = %file.display(), direction = %direction, "Ignoring non-matching script");
                continue;
            };

            let version = captures[1]
                .parse::<i64>()
                .map_err(|source| Error::InvalidVersion {
                    file: file.display().to_string(),
                    source,
                })?;
            let name = captures[2].to_string();

            let file_system = Arc::clone(&self.file_system);
            let script_path = file.clone();
            migrations.push(Migration::new(version, name, direction, move || {
                file_system.read_to_string(&script_path)
            }));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            path = %self.path.display(),
            direction = %direction,
            found = migrations.len(),
            "Discovered migration scripts"
        );

        Ok(migrations)
    }
}

impl<FS: FileSystem + 'static> MigrationFinder for FileSystemMigrationFinder<FS> {
    fn up_migrations(&self) -> Result<Vec<Migration>, Error> {
        self.find(Direction::Up)
    }

    fn down_migrations(&self) -> Result<Vec<Migration>, Error> {
        self.find(Direction::Down)
    }
}
