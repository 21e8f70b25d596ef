//! Damaged log tails left by writers that died mid-commit.

use rootstore_core::wal::WalRecord;
use rootstore_core::{SessionId, StoreKey, Symbol, Value};
use rootstore_testkit::prelude::*;

fn commit_hat(store: &TestStore, value: &str) {
    let mut session = store.session();
    session
        .enter_persistent(|s| {
            s.write("hat", value)?;
            s.commit_transaction()
        })
        .unwrap();
}

#[test]
fn torn_tail_is_ignored_by_readers_and_cut_by_next_writer() {
    let store = TestStore::file();
    commit_hat(&store, "A New Hat");
    let clean_size = store.log_size();

    // Start of a record header, cut short.
    store.append_to_log(b"RSTL\x01");
    assert_eq!(store.log_size(), clean_size + 5);

    let reader = store.reopen();
    assert_eq!(reader.session().read("hat"), Some(Value::from("A New Hat")));
    let report = reader.verify().unwrap();
    assert!(report.torn);
    assert_eq!(report.end, clean_size);

    commit_hat(&reader, "Another Hat");
    let report = store.reopen().verify().unwrap();
    assert!(!report.torn);
    assert!(report.unresolved.is_empty());
    assert_eq!(
        store.reopen().session().read("hat"),
        Some(Value::from("Another Hat"))
    );
}

#[test]
fn abandoned_transaction_is_invisible_and_aborted() {
    let store = TestStore::file();
    commit_hat(&store, "A New Hat");

    // A writer that got as far as its first write.
    let txid = store.snapshot().unwrap().next_txid();
    store
        .wal()
        .append_batch(&[
            WalRecord::Begin {
                txid,
                session: SessionId::generate(),
            },
            WalRecord::Put {
                txid,
                key: StoreKey::Root(Symbol::from("hat")),
                payload: b"\x64Half".to_vec(),
            },
        ])
        .unwrap();

    let reader = store.reopen();
    assert_eq!(reader.session().read("hat"), Some(Value::from("A New Hat")));
    assert_eq!(reader.verify().unwrap().unresolved, vec![txid]);

    commit_hat(&reader, "Another Hat");
    assert!(store.reopen().verify().unwrap().unresolved.is_empty());
    assert_eq!(
        store.reopen().session().read("hat"),
        Some(Value::from("Another Hat"))
    );
}

#[test]
fn sessions_opened_before_damage_keep_working() {
    let store = TestStore::file();
    commit_hat(&store, "A New Hat");
    let mut session = store.session();

    store.append_to_log(&[0xFF; 3]);
    session.refresh().unwrap();
    assert_eq!(session.read("hat"), Some(Value::from("A New Hat")));

    session
        .enter_persistent(|s| {
            s.write("coat", "Trench")?;
            s.commit_transaction()
        })
        .unwrap();
    let checker = store.reopen().session();
    assert_eq!(checker.read("hat"), Some(Value::from("A New Hat")));
    assert_eq!(checker.read("coat"), Some(Value::from("Trench")));
}
