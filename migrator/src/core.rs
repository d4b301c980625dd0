use crate::error::Error;
use std::cell::OnceCell;
use std::collections::HashSet;

/// History table name used when none is configured.
pub const DEFAULT_HISTORY_TABLE_NAME: &str = "_MigrationHistory";

/// Whether a [Migration] applies a change or reverts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

type ContentLoader = Box<dyn Fn() -> Result<String, Error>>;

/// A single versioned, named SQL script.
///
/// The script text is produced by a loader that only runs the first time
/// [Migration::content] is called, so a migration that is skipped never touches
/// the file system.
pub struct Migration {
    version: i64,
    name: String,
    direction: Direction,
    loader: ContentLoader,
    content: OnceCell<String>,
}

impl Migration {
    /// Create a migration whose content is produced on demand by `loader`.
    pub fn new(
        version: i64,
        name: impl Into<String>,
        direction: Direction,
        loader: impl Fn() -> Result<String, Error> + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            direction,
            loader: Box::new(loader),
            content: OnceCell::new(),
        }
    }

    /// Create a migration with its content already in memory.
    pub fn with_content(
        version: i64,
        name: impl Into<String>,
        direction: Direction,
        content: impl Into<String>,
    ) -> Self {
        let content = OnceCell::from(content.into());
        Self {
            version,
            name: name.into(),
            direction,
            loader: Box::new(|| Err(Error::Generic("content already loaded".to_string()))),
            content,
        }
    }

    /// The version parsed from the script's file name. Unique per direction.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The SQL text of this migration, loaded on first access.
    pub fn content(&self) -> Result<&str, Error> {
        if let Some(content) = self.content.get() {
            return Ok(content);
        }
        let loaded = (self.loader)()?;
        Ok(self.content.get_or_init(|| loaded))
    }

    /// Whether the content has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.content.get().is_some()
    }
}

impl PartialEq for Migration {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.direction == other.direction
            && self.name == other.name
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// A report of the migrations executed by one `up` or `down` call,
/// in the order they ran.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MigrationReport {
    pub migrations_run: Vec<i64>,
}

/// Fail with [Error::DuplicateMigrationVersion] if two migrations share a version.
pub fn ensure_unique_versions(migrations: &[Migration]) -> Result<(), Error> {
    let mut seen = HashSet::with_capacity(migrations.len());
    for migration in migrations {
        if !seen.insert(migration.version()) {
            return Err(Error::DuplicateMigrationVersion(migration.version()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn content_is_loaded_once_and_only_on_demand() {
        let loads = Rc::new(Cell::new(0));
        let counter = loads.clone();
        let migration = Migration::new(1, "create_users", Direction::Up, move || {
            counter.set(counter.get() + 1);
            Ok("CREATE TABLE users (id INTEGER)".to_string())
        });

        assert_eq!(loads.get(), 0);
        assert!(!migration.is_loaded());

        assert_eq!(migration.content().unwrap(), "CREATE TABLE users (id INTEGER)");
        assert_eq!(migration.content().unwrap(), "CREATE TABLE users (id INTEGER)");
        assert_eq!(loads.get(), 1);
        assert!(migration.is_loaded());
    }

    #[test]
    fn failed_load_is_retried_on_next_access() {
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();
        let migration = Migration::new(1, "flaky", Direction::Up, move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(Error::Generic("disk hiccup".to_string()))
            } else {
                Ok("SELECT 1".to_string())
            }
        });

        assert_eq!(
            migration.content(),
            Err(Error::Generic("disk hiccup".to_string()))
        );
        assert_eq!(migration.content().unwrap(), "SELECT 1");
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn in_memory_content_never_calls_loader() {
        let migration = Migration::with_content(7, "seed", Direction::Down, "DELETE FROM t");
        assert!(migration.is_loaded());
        assert_eq!(migration.content().unwrap(), "DELETE FROM t");
        assert_eq!(migration.direction(), Direction::Down);
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let migrations = vec![
            Migration::with_content(666, "first", Direction::Up, ""),
            Migration::with_content(1, "other", Direction::Up, ""),
            Migration::with_content(666, "second", Direction::Up, ""),
        ];
        assert_eq!(
            ensure_unique_versions(&migrations),
            Err(Error::DuplicateMigrationVersion(666))
        );
    }

    #[test]
    fn unique_versions_pass() {
        let migrations = vec![
            Migration::with_content(2, "b", Direction::Up, ""),
            Migration::with_content(1, "a", Direction::Up, ""),
        ];
        assert_eq!(ensure_unique_versions(&migrations), Ok(()));
        assert_eq!(ensure_unique_versions(&[]), Ok(()));
    }
}
