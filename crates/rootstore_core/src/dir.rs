//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ MANIFEST          # Format version and store id
//! ├─ LOCK              # Advisory lock taken for the duration of a commit
//! └─ commit.log        # Append-only commit log
//! ```
//!
//! Any number of processes may open the directory. Only committers take
//! the LOCK file; readers never do.

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "commit.log";

/// The on-disk layout of one store.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
}

impl StoreDir {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist and
    /// `create_if_missing` is false, or if the path is not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the path to the MANIFEST file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Checks if this is a new (empty) store directory.
    #[must_use]
    pub fn is_new_store(&self) -> bool {
        !self.manifest_path().exists() && !self.log_path().exists()
    }

    /// Loads the manifest; `None` for a store without one yet.
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&manifest_path)?;
        if data.is_empty() {
            return Ok(None);
        }
        Manifest::decode(&data).map(Some)
    }

    /// Saves the manifest atomically (write temp, sync, rename, sync dir).
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);

        let data = manifest.encode()?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()
    }

    /// Takes the cross-process commit lock, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another committer holds the lock
    /// for longer than `timeout`.
    pub fn commit_lock(&self, timeout: Duration, retry_interval: Duration) -> CoreResult<CommitLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path.join(LOCK_FILE))?;

        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if file.try_lock_exclusive().is_ok() {
                if attempts > 1 {
                    debug!(attempts, "commit lock acquired after waiting");
                }
                return Ok(CommitLock { file });
            }
            if Instant::now() >= deadline {
                return Err(CoreError::StoreLocked);
            }
            std::thread::sleep(retry_interval);
        }
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals metadata; directories cannot be fsynced there.
        Ok(())
    }
}

/// Held while a commit appends to the log; unlocks on drop.
#[derive(Debug)]
pub struct CommitLock {
    file: File,
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        // Closing the handle also releases the lock.
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("new_store");

        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(dir.is_new_store());
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = StoreDir::open(&temp.path().join("missing"), false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path(), true).unwrap();
        assert!(dir.load_manifest().unwrap().is_none());

        let manifest = Manifest::new((1, 0));
        dir.save_manifest(&manifest).unwrap();

        assert_eq!(dir.load_manifest().unwrap(), Some(manifest));
        assert!(!dir.is_new_store());
        assert!(!temp.path().join(MANIFEST_TEMP).exists());
    }

    #[test]
    fn commit_lock_is_exclusive() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path(), true).unwrap();
        let other = StoreDir::open(temp.path(), true).unwrap();

        let held = dir
            .commit_lock(Duration::from_millis(10), Duration::from_millis(1))
            .unwrap();
        let contended = other.commit_lock(Duration::from_millis(20), Duration::from_millis(5));
        assert!(matches!(contended, Err(CoreError::StoreLocked)));

        drop(held);
        other
            .commit_lock(Duration::from_millis(10), Duration::from_millis(1))
            .unwrap();
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(temp.path(), true).unwrap();
        assert_eq!(dir.log_path(), temp.path().join("commit.log"));
        assert_eq!(dir.manifest_path(), temp.path().join("MANIFEST"));
    }
}
