//! The persistent store: one directory, one commit log, many sessions.

use crate::config::Config;
use crate::dir::{CommitLock, StoreDir};
use crate::error::{CoreError, CoreResult};
use crate::graph::DurableWrite;
use crate::manifest::Manifest;
use crate::session::SessionView;
use crate::snapshot::{CatchUp, Snapshot};
use crate::types::{ObjectId, SequenceNumber, SessionId, StoreKey};
use crate::wal::{WalManager, WalRecord};
use parking_lot::Mutex;
use rootstore_codec::to_canonical_cbor;
use rootstore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a session asks [`PersistentStore::publish`] to commit.
pub(crate) struct PublishRequest<'a> {
    pub session: SessionId,
    pub base: SequenceNumber,
    pub keys: &'a BTreeSet<StoreKey>,
}

/// Latest commit record seen in the log, read forward incrementally.
#[derive(Debug, Default)]
struct CommitCursor {
    offset: u64,
    sequence: SequenceNumber,
}

/// A store shared by every session of this process.
///
/// Other processes may open the same directory at the same time. Commits
/// from all of them are serialized through the directory's commit lock and
/// become visible to a session when it refreshes.
pub struct PersistentStore {
    config: Config,
    dir: Option<StoreDir>,
    manifest: Manifest,
    wal: WalManager,
    /// Serializes commits within this process before the file lock.
    commit_mutex: Mutex<()>,
    committed: Mutex<CommitCursor>,
}

impl PersistentStore {
    /// Opens the store at `path` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read, or if
    /// its format is incompatible.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Arc<Self>> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the store at `path`.
    ///
    /// # Errors
    ///
    /// Besides I/O failures:
    /// - `InvalidFormat` if the store is missing and `create_if_missing` is
    ///   false, or if its major format version differs
    /// - `InvalidOperation` if the store exists and `error_if_exists` is set
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> CoreResult<Arc<Self>> {
        let path = path.as_ref();
        let dir = StoreDir::open(path, config.create_if_missing)?;

        if !config.create_if_missing && dir.is_new_store() {
            return Err(CoreError::invalid_format(
                "store does not exist and create_if_missing is false",
            ));
        }
        if config.error_if_exists && !dir.is_new_store() {
            return Err(CoreError::invalid_operation(
                "store already exists and error_if_exists is true",
            ));
        }

        let manifest = match dir.load_manifest()? {
            Some(manifest) => {
                manifest.check_compatible(config.format_version)?;
                manifest
            }
            None => {
                let manifest = Manifest::new(config.format_version);
                dir.save_manifest(&manifest)?;
                manifest
            }
        };

        let backend = FileBackend::open(&dir.log_path())?;
        info!(
            path = %dir.path().display(),
            store_id = %manifest.store_id,
            "store opened"
        );

        Ok(Arc::new(Self {
            config,
            dir: Some(dir),
            manifest,
            wal: WalManager::new(Box::new(backend)),
            commit_mutex: Mutex::new(()),
            committed: Mutex::new(CommitCursor::default()),
        }))
    }

    /// Opens a store over an existing log backend.
    ///
    /// There is no directory, so commits are serialized only within this
    /// handle.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Arc<Self>> {
        let manifest = Manifest::new(config.format_version);
        debug!(store_id = %manifest.store_id, "store opened over backend");
        Ok(Arc::new(Self {
            config,
            dir: None,
            manifest,
            wal: WalManager::new(backend),
            commit_mutex: Mutex::new(()),
            committed: Mutex::new(CommitCursor::default()),
        }))
    }

    /// Opens a fresh store that lives only in memory.
    pub fn open_in_memory() -> CoreResult<Arc<Self>> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a session on this store.
    ///
    /// # Errors
    ///
    /// Fails if the committed state cannot be read.
    pub fn session(self: &Arc<Self>) -> CoreResult<SessionView> {
        SessionView::open(Arc::clone(self))
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The store's identity from its manifest.
    #[must_use]
    pub fn store_id(&self) -> Uuid {
        self.manifest.store_id
    }

    /// The on-disk format version.
    #[must_use]
    pub fn format_version(&self) -> (u16, u16) {
        self.manifest.format_version
    }

    /// The store directory, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// The commit log.
    #[must_use]
    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    /// Replays the whole log into a fresh snapshot.
    pub fn snapshot(&self) -> CoreResult<Snapshot> {
        let mut snapshot = Snapshot::new();
        snapshot.catch_up(&self.wal)?;
        Ok(snapshot)
    }

    /// Replays the whole log and reports what its end looks like.
    pub fn verify(&self) -> CoreResult<CatchUp> {
        Snapshot::new().catch_up(&self.wal)
    }

    /// Sequence number of the latest commit in the log.
    ///
    /// Only records appended since the previous call are read. A log that
    /// shrank below the cursor is read again from the start.
    pub fn committed_sequence(&self) -> CoreResult<SequenceNumber> {
        let mut cursor = self.committed.lock();
        if cursor.offset > self.wal.size()? {
            *cursor = CommitCursor::default();
        }
        let scan = self.wal.scan(cursor.offset)?;
        for (_, record) in &scan.records {
            if let WalRecord::Commit { sequence, .. } = record {
                if *sequence > cursor.sequence {
                    cursor.sequence = *sequence;
                }
            }
        }
        cursor.offset = scan.end;
        Ok(cursor.sequence)
    }

    pub(crate) fn catch_up(&self, snapshot: &mut Snapshot) -> CoreResult<CatchUp> {
        snapshot.catch_up(&self.wal)
    }

    /// Appends one transaction to the log.
    ///
    /// Under the commit lock: brings `snapshot` up to date, repairs the log
    /// tail, rejects the commit if another session committed one of
    /// `request.keys` after `request.base`, then lets `build` produce the
    /// writes (given the first free object id) and appends them as one
    /// `Begin`/`Put`/`Delete`/`Commit` batch.
    pub(crate) fn publish<F>(
        &self,
        request: PublishRequest<'_>,
        snapshot: &mut Snapshot,
        build: F,
    ) -> CoreResult<SequenceNumber>
    where
        F: FnOnce(ObjectId) -> CoreResult<Vec<DurableWrite>>,
    {
        let _local = self.commit_mutex.lock();
        let _lock = self.commit_lock()?;

        self.recover_tail(snapshot)?;

        if let Some(key) = snapshot.conflict(request.base, request.session, request.keys) {
            warn!(session = %request.session, %key, "commit conflict");
            return Err(CoreError::commit_conflict(key.to_string()));
        }

        let txid = snapshot.next_txid();
        let sequence = snapshot.sequence().next();
        let writes = build(snapshot.next_oid())?;

        let mut records = Vec::with_capacity(writes.len() + 2);
        records.push(WalRecord::Begin {
            txid,
            session: request.session,
        });
        for (key, state) in writes {
            records.push(match state {
                Some(state) => WalRecord::Put {
                    txid,
                    key,
                    payload: to_canonical_cbor(&state)?,
                },
                None => WalRecord::Delete { txid, key },
            });
        }
        records.push(WalRecord::Commit { txid, sequence });

        let start = self.wal.size()?;
        if let Err(err) = self.append_durably(&records) {
            if let Err(cleanup) = self.wal.truncate(start) {
                warn!(error = %cleanup, "could not remove partial commit");
            }
            return Err(err);
        }

        snapshot.catch_up(&self.wal)?;
        info!(
            session = %request.session,
            %txid,
            %sequence,
            writes = records.len() - 2,
            "committed"
        );
        Ok(sequence)
    }

    fn commit_lock(&self) -> CoreResult<Option<CommitLock>> {
        match &self.dir {
            Some(dir) => dir
                .commit_lock(self.config.lock_timeout, self.config.lock_retry_interval)
                .map(Some),
            None => Ok(None),
        }
    }

    fn append_durably(&self, records: &[WalRecord]) -> CoreResult<()> {
        self.wal.append_batch(records)?;
        if self.config.sync_on_commit {
            self.wal.sync()
        } else {
            self.wal.flush()
        }
    }

    /// Cuts a torn tail and closes transactions whose writer died.
    ///
    /// Only called with the commit lock held, so nobody else is writing.
    fn recover_tail(&self, snapshot: &mut Snapshot) -> CoreResult<()> {
        let report = snapshot.catch_up(&self.wal)?;
        if report.torn {
            warn!(offset = report.end, "truncating torn log tail");
            self.wal.truncate(report.end)?;
        }
        if report.unresolved.is_empty() {
            return Ok(());
        }

        let aborts: Vec<_> = report
            .unresolved
            .iter()
            .map(|&txid| WalRecord::Abort { txid })
            .collect();
        warn!(transactions = ?report.unresolved, "aborting abandoned transactions");
        self.append_durably(&aborts)?;
        snapshot.catch_up(&self.wal)?;
        Ok(())
    }
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("path", &self.path())
            .field("store_id", &self.manifest.store_id)
            .finish_non_exhaustive()
    }
}
