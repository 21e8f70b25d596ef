//! Test fixtures and store helpers.
//!
//! A [`TestStore`] owns a temporary directory. [`TestStore::reopen`] opens a
//! second, independent handle on the same directory, which behaves like
//! another process: it shares nothing in memory with the first.

use rootstore_core::{Config, PersistentStore, SessionView};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store handle.
    pub store: Arc<PersistentStore>,
    /// Directory shared with reopened handles; `None` in memory.
    temp_dir: Option<Arc<TempDir>>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        init_test_tracing();
        Self {
            store: PersistentStore::open_in_memory().expect("Failed to open in-memory store"),
            temp_dir: None,
        }
    }

    /// Creates a new store in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a new store in a temporary directory with `config`.
    pub fn file_with_config(config: Config) -> Self {
        init_test_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = PersistentStore::open_with_config(temp_dir.path(), config)
            .expect("Failed to open file store");
        Self {
            store,
            temp_dir: Some(Arc::new(temp_dir)),
        }
    }

    /// Opens an independent handle on the same directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(&self) -> Self {
        let temp_dir = self
            .temp_dir
            .clone()
            .expect("Only file stores can be reopened");
        let store = PersistentStore::open(temp_dir.path()).expect("Failed to reopen store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Opens a session.
    pub fn session(&self) -> SessionView {
        self.store.session().expect("Failed to open session")
    }

    /// Returns the store directory if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_deref().map(TempDir::path)
    }

    /// Returns the commit log path if file-based.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.path().map(|p| p.join("commit.log"))
    }

    /// Appends raw bytes to the commit log, as a writer that died mid-append
    /// would leave them.
    pub fn append_to_log(&self, bytes: &[u8]) {
        let path = self.log_path().expect("Only file stores have a log file");
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .expect("Failed to open commit log");
        file.write_all(bytes).expect("Failed to append to commit log");
        file.sync_all().expect("Failed to sync commit log");
    }

    /// Size of the commit log in bytes.
    pub fn log_size(&self) -> u64 {
        self.store.wal().size().expect("Failed to read log size")
    }
}

impl std::ops::Deref for TestStore {
    type Target = Arc<PersistentStore>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a session on a temporary in-memory store.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&mut SessionView) -> R,
{
    let store = TestStore::memory();
    let mut session = store.session();
    f(&mut session)
}

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; silent otherwise.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
