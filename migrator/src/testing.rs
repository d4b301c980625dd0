//! Test doubles for exercising migration logic without a real database or disk.
//!
//! [InMemoryFileSystem] stands in for the scripts directory and counts reads, and
//! [RecordingBackend] is a [HistoryBackend] that logs every primitive call so tests
//! can assert on the exact sequence the history template and service produce.
//!
//! ```
//! use migrator::testing::{BackendCall, InMemoryFileSystem, RecordingRunnerFactory};
//! use migrator::{FileSystemMigrationFinder, MigrationService};
//!
//! let fs = InMemoryFileSystem::new();
//! fs.add_file("scripts/20121212000000_Foo_up.sql", "CREATE TABLE foo (id INT)");
//!
//! let factory = RecordingRunnerFactory::new();
//! let service = MigrationService::new(FileSystemMigrationFinder::new(fs, "scripts"), factory.clone());
//! service.up().unwrap();
//!
//! assert!(factory.calls().contains(&BackendCall::Commit));
//! ```

use crate::error::Error;
use crate::finder::FileSystem;
use crate::history::{HistoryBackend, HistoryTableRunner};
use crate::runner::RunnerFactory;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct FileSystemState {
    files: BTreeMap<PathBuf, String>,
    reads: usize,
}

/// A [FileSystem] holding files in memory. Clones share the same files.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFileSystem {
    state: Arc<Mutex<FileSystemState>>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.files.insert(path.into(), content.into());
    }

    /// Number of successful [FileSystem::read_to_string] calls so far.
    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).reads
    }
}

impl FileSystem for InMemoryFileSystem {
    fn list_files(
        &self,
        dir: &Path,
        extension: &str,
        recursive: bool,
    ) -> Result<Vec<PathBuf>, Error> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .files
            .keys()
            .filter(|path| path.starts_with(dir))
            .filter(|path| recursive || path.parent() == Some(dir))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            })
            .cloned()
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, Error> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let content = state.files.get(path).cloned().ok_or_else(|| Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        state.reads += 1;
        Ok(content)
    }
}

/// A primitive operation observed by a [RecordingBackend].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ExecuteScript(String),
    IsHistoryTablePresent,
    CreateHistoryTable,
    InsertHistoryRecord(i64, String),
    DeleteHistoryRecord(i64),
    ReadHistory,
    Commit,
    Dispose,
}

/// Simulated database state shared by every [RecordingBackend] of one factory.
#[derive(Debug, Default)]
pub struct BackendState {
    pub calls: Vec<BackendCall>,
    pub history_table_present: bool,
    pub history: BTreeMap<i64, String>,
    /// Scripts whose execution fails with [Error::Generic].
    pub failing_scripts: Vec<String>,
}

/// A [HistoryBackend] that records every call into a shared [BackendState].
///
/// History writes are applied to the shared state immediately; transactions are
/// not simulated beyond recording `Commit` and `Dispose`.
#[derive(Debug)]
pub struct RecordingBackend {
    state: Rc<RefCell<BackendState>>,
}

impl RecordingBackend {
    pub fn new(state: Rc<RefCell<BackendState>>) -> Self {
        Self { state }
    }

    fn record(&self, call: BackendCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl HistoryBackend for RecordingBackend {
    fn execute_script(&mut self, script: &str) -> Result<(), Error> {
        self.record(BackendCall::ExecuteScript(script.to_string()));
        if self.state.borrow().failing_scripts.iter().any(|s| s == script) {
            return Err(Error::Generic(format!("script failed: {}", script)));
        }
        Ok(())
    }

    fn is_history_table_present(&mut self) -> Result<bool, Error> {
        self.record(BackendCall::IsHistoryTablePresent);
        Ok(self.state.borrow().history_table_present)
    }

    fn create_history_table(&mut self) -> Result<(), Error> {
        self.record(BackendCall::CreateHistoryTable);
        self.state.borrow_mut().history_table_present = true;
        Ok(())
    }

    fn insert_history_record(&mut self, version: i64, name: &str) -> Result<(), Error> {
        self.record(BackendCall::InsertHistoryRecord(version, name.to_string()));
        self.state
            .borrow_mut()
            .history
            .insert(version, name.to_string());
        Ok(())
    }

    fn delete_history_record(&mut self, version: i64) -> Result<(), Error> {
        self.record(BackendCall::DeleteHistoryRecord(version));
        self.state.borrow_mut().history.remove(&version);
        Ok(())
    }

    fn read_history(&mut self) -> Result<Vec<i64>, Error> {
        self.record(BackendCall::ReadHistory);
        Ok(self.state.borrow().history.keys().copied().collect())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.record(BackendCall::Commit);
        Ok(())
    }
}

impl Drop for RecordingBackend {
    fn drop(&mut self) {
        self.record(BackendCall::Dispose);
    }
}

/// A [RunnerFactory] producing [HistoryTableRunner]s over [RecordingBackend]s.
/// Clones share state, so a test can keep one handle and give another to a service.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunnerFactory {
    state: Rc<RefCell<BackendState>>,
    created: Rc<Cell<usize>>,
}

impl RecordingRunnerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a database whose history table already holds `versions`.
    pub fn with_history(versions: impl IntoIterator<Item = i64>) -> Self {
        let factory = Self::new();
        {
            let mut state = factory.state.borrow_mut();
            state.history_table_present = true;
            state.history = versions
                .into_iter()
                .map(|v| (v, format!("migration {}", v)))
                .collect::<BTreeMap<_, _>>();
        }
        factory
    }

    /// Make every execution of `script` fail.
    pub fn fail_on_script(&self, script: impl Into<String>) {
        self.state.borrow_mut().failing_scripts.push(script.into());
    }

    /// Number of runners created so far.
    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.borrow().calls.clone()
    }

    /// The scripts executed so far, in order.
    pub fn executed_scripts(&self) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::ExecuteScript(script) => Some(script.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn history(&self) -> Vec<i64> {
        self.state.borrow().history.keys().copied().collect()
    }

    /// Count the recorded calls of each kind, keyed by their debug name.
    pub fn call_counts(&self) -> HashMap<&'static str, usize> {
        let mut counts = HashMap::new();
        for call in self.state.borrow().calls.iter() {
            let key = match call {
                BackendCall::ExecuteScript(_) => "execute_script",
                BackendCall::IsHistoryTablePresent => "is_history_table_present",
                BackendCall::CreateHistoryTable => "create_history_table",
                BackendCall::InsertHistoryRecord(..) => "insert_history_record",
                BackendCall::DeleteHistoryRecord(_) => "delete_history_record",
                BackendCall::ReadHistory => "read_history",
                BackendCall::Commit => "commit",
                BackendCall::Dispose => "dispose",
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }
}

impl RunnerFactory for RecordingRunnerFactory {
    type Runner = HistoryTableRunner<RecordingBackend>;

    fn create(&self) -> Result<Self::Runner, Error> {
        self.created.set(self.created.get() + 1);
        Ok(HistoryTableRunner::new(RecordingBackend::new(Rc::clone(
            &self.state,
        ))))
    }
}
