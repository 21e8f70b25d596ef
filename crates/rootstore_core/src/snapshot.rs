//! Committed state rebuilt from the commit log.
//!
//! A snapshot replays the log incrementally: it remembers how far it has
//! read and picks up from there on the next [`Snapshot::catch_up`]. Only
//! transactions whose `Commit` record is complete are applied, so readers
//! never need the commit lock.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, SequenceNumber, SessionId, StoreKey, TransactionId};
use crate::wal::{WalManager, WalRecord};
use rootstore_codec::{from_cbor, Value as Cbor};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Keys written by one applied commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Sequence number of the commit.
    pub sequence: SequenceNumber,
    /// Session that wrote it.
    pub session: SessionId,
    /// Keys it wrote or deleted.
    pub keys: Vec<StoreKey>,
}

/// What a catch-up pass observed at the end of the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatchUp {
    /// Commits applied by this pass.
    pub applied: usize,
    /// Transactions begun but neither committed nor aborted.
    pub unresolved: Vec<TransactionId>,
    /// Offset just past the last complete record.
    pub end: u64,
    /// True if incomplete bytes follow `end`.
    pub torn: bool,
}

#[derive(Debug)]
struct OpenTransaction {
    begin: u64,
    session: SessionId,
    writes: Vec<(StoreKey, Option<Vec<u8>>)>,
}

impl OpenTransaction {
    fn decode(self, sequence: SequenceNumber) -> CoreResult<StagedCommit> {
        let mut writes = Vec::with_capacity(self.writes.len());
        for (key, payload) in self.writes {
            let state = match payload {
                Some(bytes) => Some(from_cbor(&bytes)?),
                None => None,
            };
            writes.push((key, state));
        }
        Ok(StagedCommit {
            sequence,
            session: self.session,
            writes,
        })
    }
}

/// A decoded commit waiting for the rest of its pass to succeed.
#[derive(Debug)]
struct StagedCommit {
    sequence: SequenceNumber,
    session: SessionId,
    writes: Vec<(StoreKey, Option<Cbor>)>,
}

/// Latest committed state as seen by one reader.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: BTreeMap<StoreKey, Cbor>,
    sequence: SequenceNumber,
    offset: u64,
    next_oid: u64,
    next_txid: u64,
    history: Vec<CommitSummary>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    /// An empty snapshot positioned at the start of the log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            sequence: SequenceNumber::default(),
            offset: 0,
            next_oid: 1,
            next_txid: 1,
            history: Vec::new(),
        }
    }

    /// Sequence number of the last applied commit.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Log offset the next catch-up starts from.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// First object id not used by any applied commit.
    #[must_use]
    pub fn next_oid(&self) -> ObjectId {
        ObjectId::new(self.next_oid)
    }

    /// First transaction id not seen in the log.
    #[must_use]
    pub fn next_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid)
    }

    /// Committed state of one key.
    #[must_use]
    pub fn get(&self, key: &StoreKey) -> Option<&Cbor> {
        self.entries.get(key)
    }

    /// Every committed key with its state, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&StoreKey, &Cbor)> {
        self.entries.iter()
    }

    /// Number of committed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applied commits in sequence order, from the last prune on.
    #[must_use]
    pub fn history(&self) -> &[CommitSummary] {
        &self.history
    }

    /// Forgets the summaries of commits at or below `sequence`.
    ///
    /// Conflict checks against a base of `sequence` or later never need
    /// them again.
    pub fn prune_history(&mut self, sequence: SequenceNumber) {
        let keep = self.history.partition_point(|commit| commit.sequence <= sequence);
        self.history.drain(..keep);
    }

    /// First key in `keys` that another session committed after `base`.
    #[must_use]
    pub fn conflict<'k>(
        &self,
        base: SequenceNumber,
        session: SessionId,
        keys: &'k BTreeSet<StoreKey>,
    ) -> Option<&'k StoreKey> {
        self.history
            .iter()
            .filter(|commit| commit.sequence > base && commit.session != session)
            .flat_map(|commit| commit.keys.iter())
            .find_map(|key| keys.get(key))
    }

    /// Applies every commit appended since the last call.
    ///
    /// New records are decoded into a staged batch first; the snapshot only
    /// changes once the whole pass has succeeded.
    ///
    /// # Errors
    ///
    /// Fails if the log is corrupt. The snapshot is unchanged on error.
    pub fn catch_up(&mut self, wal: &WalManager) -> CoreResult<CatchUp> {
        let scan = wal.scan(self.offset)?;
        if scan.records.is_empty() {
            return Ok(CatchUp {
                end: scan.end,
                torn: scan.torn,
                ..CatchUp::default()
            });
        }
        let mut open: BTreeMap<TransactionId, OpenTransaction> = BTreeMap::new();
        let mut staged = Vec::new();
        let mut latest = self.sequence;
        let mut next_txid = self.next_txid;

        for (offset, record) in scan.records {
            next_txid = next_txid.max(record.txid().as_u64() + 1);
            match record {
                WalRecord::Begin { txid, session } => {
                    open.insert(
                        txid,
                        OpenTransaction {
                            begin: offset,
                            session,
                            writes: Vec::new(),
                        },
                    );
                }
                WalRecord::Put { txid, key, payload } => {
                    open_mut(&mut open, txid, offset)?.writes.push((key, Some(payload)));
                }
                WalRecord::Delete { txid, key } => {
                    open_mut(&mut open, txid, offset)?.writes.push((key, None));
                }
                WalRecord::Commit { txid, sequence } => {
                    let tx = open.remove(&txid).ok_or_else(|| orphan(txid, offset))?;
                    if sequence > latest {
                        staged.push(tx.decode(sequence)?);
                        latest = sequence;
                    }
                }
                WalRecord::Abort { txid } => {
                    open.remove(&txid);
                }
            }
        }

        let applied = staged.len();
        for commit in staged {
            self.apply(commit);
        }
        self.next_txid = next_txid;
        self.offset = open.values().map(|tx| tx.begin).min().unwrap_or(scan.end);

        if applied > 0 {
            trace!(applied, sequence = %self.sequence, "snapshot caught up");
        }
        Ok(CatchUp {
            applied,
            unresolved: open.into_keys().collect(),
            end: scan.end,
            torn: scan.torn,
        })
    }

    fn apply(&mut self, commit: StagedCommit) {
        let mut keys = Vec::with_capacity(commit.writes.len());
        for (key, state) in commit.writes {
            if let StoreKey::Object(oid) = &key {
                self.next_oid = self.next_oid.max(oid.as_u64() + 1);
            }
            match state {
                Some(state) => {
                    self.entries.insert(key.clone(), state);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
            keys.push(key);
        }
        self.sequence = commit.sequence;
        self.history.push(CommitSummary {
            sequence: commit.sequence,
            session: commit.session,
            keys,
        });
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, key: StoreKey, state: Option<Cbor>) {
        match state {
            Some(state) => self.entries.insert(key, state),
            None => self.entries.remove(&key),
        };
    }
}

fn open_mut(
    open: &mut BTreeMap<TransactionId, OpenTransaction>,
    txid: TransactionId,
    offset: u64,
) -> CoreResult<&mut OpenTransaction> {
    open.get_mut(&txid).ok_or_else(|| orphan(txid, offset))
}

fn orphan(txid: TransactionId, offset: u64) -> CoreError {
    CoreError::wal_corruption(format!("{txid} has no begin record before offset {offset}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Symbol;
    use rootstore_codec::to_canonical_cbor;
    use rootstore_storage::InMemoryBackend;

    fn root(name: &str) -> StoreKey {
        StoreKey::Root(Symbol::from(name))
    }

    fn put(txid: u64, key: StoreKey, value: i64) -> WalRecord {
        WalRecord::Put {
            txid: TransactionId::new(txid),
            key,
            payload: to_canonical_cbor(&Cbor::Integer(value)).unwrap(),
        }
    }

    fn begin(txid: u64, session: SessionId) -> WalRecord {
        WalRecord::Begin {
            txid: TransactionId::new(txid),
            session,
        }
    }

    fn commit(txid: u64, sequence: u64) -> WalRecord {
        WalRecord::Commit {
            txid: TransactionId::new(txid),
            sequence: SequenceNumber::new(sequence),
        }
    }

    fn wal() -> WalManager {
        WalManager::new(Box::new(InMemoryBackend::new()))
    }

    #[test]
    fn applies_committed_transactions() {
        let wal = wal();
        let session = SessionId::generate();
        wal.append_batch(&[begin(1, session), put(1, root("a"), 1), commit(1, 1)])
            .unwrap();

        let mut snapshot = Snapshot::new();
        let report = snapshot.catch_up(&wal).unwrap();
        assert_eq!(report.applied, 1);
        assert!(report.unresolved.is_empty());
        assert_eq!(snapshot.sequence(), SequenceNumber::new(1));
        assert_eq!(snapshot.get(&root("a")), Some(&Cbor::Integer(1)));
        assert_eq!(snapshot.offset(), wal.size().unwrap());
        assert_eq!(snapshot.next_txid(), TransactionId::new(2));
    }

    #[test]
    fn incomplete_transaction_is_not_visible_until_commit() {
        let wal = wal();
        let session = SessionId::generate();
        wal.append_batch(&[begin(1, session), put(1, root("a"), 1)]).unwrap();

        let mut snapshot = Snapshot::new();
        let report = snapshot.catch_up(&wal).unwrap();
        assert_eq!(report.unresolved, vec![TransactionId::new(1)]);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.offset(), 0);

        wal.append(&commit(1, 1)).unwrap();
        snapshot.catch_up(&wal).unwrap();
        assert_eq!(snapshot.get(&root("a")), Some(&Cbor::Integer(1)));
    }

    #[test]
    fn aborted_transaction_is_skipped() {
        let wal = wal();
        let session = SessionId::generate();
        wal.append_batch(&[
            begin(1, session),
            put(1, root("a"), 1),
            WalRecord::Abort {
                txid: TransactionId::new(1),
            },
            begin(2, session),
            WalRecord::Delete {
                txid: TransactionId::new(2),
                key: root("b"),
            },
            commit(2, 1),
        ])
        .unwrap();

        let mut snapshot = Snapshot::new();
        snapshot.catch_up(&wal).unwrap();
        assert!(snapshot.get(&root("a")).is_none());
        assert_eq!(snapshot.history()[0].keys, vec![root("b")]);
    }

    #[test]
    fn object_ids_advance_past_committed_objects() {
        let wal = wal();
        let session = SessionId::generate();
        wal.append_batch(&[
            begin(1, session),
            put(1, StoreKey::Object(ObjectId::new(41)), 0),
            commit(1, 1),
        ])
        .unwrap();

        let mut snapshot = Snapshot::new();
        snapshot.catch_up(&wal).unwrap();
        assert_eq!(snapshot.next_oid(), ObjectId::new(42));
    }

    #[test]
    fn conflict_ignores_own_and_older_commits() {
        let wal = wal();
        let mine = SessionId::generate();
        let theirs = SessionId::generate();
        wal.append_batch(&[begin(1, theirs), put(1, root("a"), 1), commit(1, 1)])
            .unwrap();
        wal.append_batch(&[begin(2, mine), put(2, root("b"), 1), commit(2, 2)])
            .unwrap();
        wal.append_batch(&[begin(3, theirs), put(3, root("c"), 1), commit(3, 3)])
            .unwrap();

        let mut snapshot = Snapshot::new();
        snapshot.catch_up(&wal).unwrap();

        let keys: BTreeSet<_> = [root("a"), root("b"), root("c")].into_iter().collect();
        assert_eq!(
            snapshot.conflict(SequenceNumber::new(1), mine, &keys),
            Some(&root("c"))
        );
        let keys: BTreeSet<_> = [root("a"), root("b")].into_iter().collect();
        assert_eq!(snapshot.conflict(SequenceNumber::new(1), mine, &keys), None);
    }

    #[test]
    fn commit_without_begin_is_corruption() {
        let wal = wal();
        wal.append(&commit(7, 1)).unwrap();
        let mut snapshot = Snapshot::new();
        assert!(matches!(
            snapshot.catch_up(&wal),
            Err(CoreError::WalCorruption { .. })
        ));
        assert_eq!(snapshot.offset(), 0);
    }

    #[test]
    fn undecodable_payload_leaves_snapshot_unchanged() {
        let wal = wal();
        let session = SessionId::generate();
        wal.append_batch(&[begin(1, session), put(1, root("a"), 1), commit(1, 1)])
            .unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.catch_up(&wal).unwrap();
        let offset = snapshot.offset();

        wal.append_batch(&[
            begin(2, session),
            put(2, root("b"), 2),
            commit(2, 2),
            begin(3, session),
            WalRecord::Put {
                txid: TransactionId::new(3),
                key: root("c"),
                payload: vec![0xFF, 0x00],
            },
            commit(3, 3),
        ])
        .unwrap();

        assert!(snapshot.catch_up(&wal).is_err());
        assert_eq!(snapshot.offset(), offset);
        assert_eq!(snapshot.sequence(), SequenceNumber::new(1));
        assert!(snapshot.get(&root("b")).is_none());
        assert_eq!(snapshot.next_txid(), TransactionId::new(2));
    }

    #[test]
    fn pruned_history_keeps_later_commits() {
        let wal = wal();
        let mine = SessionId::generate();
        let theirs = SessionId::generate();
        for txid in 1..=3 {
            wal.append_batch(&[begin(txid, theirs), put(txid, root("a"), 0), commit(txid, txid)])
                .unwrap();
        }
        let mut snapshot = Snapshot::new();
        snapshot.catch_up(&wal).unwrap();

        snapshot.prune_history(SequenceNumber::new(2));
        assert_eq!(snapshot.history().len(), 1);
        assert_eq!(snapshot.history()[0].sequence, SequenceNumber::new(3));

        let keys: BTreeSet<_> = [root("a")].into_iter().collect();
        assert_eq!(
            snapshot.conflict(SequenceNumber::new(2), mine, &keys),
            Some(&root("a"))
        );
        snapshot.prune_history(SequenceNumber::new(3));
        assert!(snapshot.history().is_empty());
        assert_eq!(snapshot.get(&root("a")), Some(&Cbor::Integer(0)));
    }
}
