//! Sessions and store handles committing against each other.

use rootstore_core::{CoreError, ObjectRef, Value};
use rootstore_testkit::prelude::*;
use std::sync::Arc;
use std::thread;

#[test]
fn second_writer_to_same_key_conflicts() {
    let store = TestStore::file();
    let mut first = store.session();
    let mut second = store.reopen().session();

    first
        .enter_persistent(|s| {
            s.write("hat", "First")?;
            s.commit_transaction()
        })
        .unwrap();

    let result = second.enter_persistent(|s| {
        s.write("hat", "Second")?;
        s.commit_transaction()
    });
    assert!(matches!(result, Err(CoreError::CommitConflict { .. })));
    assert_eq!(second.read("hat"), None);

    second.refresh().unwrap();
    assert_eq!(second.read("hat"), Some(Value::from("First")));
    second
        .enter_persistent(|s| {
            s.write("hat", "Second")?;
            s.commit_transaction()
        })
        .unwrap();
    assert_eq!(
        store.reopen().session().read("hat"),
        Some(Value::from("Second"))
    );
}

#[test]
fn disjoint_keys_commit_without_refresh() {
    let store = TestStore::file();
    let mut first = store.session();
    let mut second = store.reopen().session();

    first
        .enter_persistent(|s| {
            s.write("hat", 1)?;
            s.commit_transaction()
        })
        .unwrap();
    second
        .enter_persistent(|s| {
            s.write("coat", 2)?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    assert_eq!(checker.read("hat"), Some(Value::from(1)));
    assert_eq!(checker.read("coat"), Some(Value::from(2)));
}

#[test]
fn conflicting_object_update_is_rejected() {
    let store = TestStore::file();
    let mut setup = store.session();
    setup
        .enter_persistent(|s| {
            s.write("hat", ObjectRef::with_fields("Hat", [("size", Value::from(7))]))?;
            s.commit_transaction()
        })
        .unwrap();

    let mut first = store.session();
    let mut second = store.reopen().session();
    let hat_a = first.read("hat").unwrap().as_object().unwrap().clone();
    let hat_b = second.read("hat").unwrap().as_object().unwrap().clone();

    first
        .enter_persistent(|s| {
            s.set_field(&hat_a, "size", 8)?;
            s.commit_transaction()
        })
        .unwrap();
    let result = second.enter_persistent(|s| {
        s.set_field(&hat_b, "size", 9)?;
        s.commit_transaction()
    });
    assert!(matches!(result, Err(CoreError::CommitConflict { .. })));
    assert_eq!(hat_b.field("size"), Some(Value::from(7)));

    second.refresh().unwrap();
    assert_eq!(hat_b.field("size"), Some(Value::from(8)));
}

#[test]
fn failed_commit_leaves_store_unchanged() {
    let store = TestStore::file();
    let mut first = store.session();
    let mut second = store.session();
    first
        .enter_persistent(|s| {
            s.write("hat", "First")?;
            s.commit_transaction()
        })
        .unwrap();
    let size = store.log_size();
    let sequence = store.committed_sequence().unwrap();

    let result = second.enter_persistent(|s| {
        s.write("hat", "Second")?;
        s.write("coat", "Trench")?;
        s.commit_transaction()
    });
    assert!(result.is_err());
    assert_eq!(store.log_size(), size);
    assert_eq!(store.committed_sequence().unwrap(), sequence);
    assert_eq!(store.reopen().session().read("coat"), None);
}

#[test]
fn threads_with_separate_store_handles_lose_no_increments() {
    let store = TestStore::file();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let process = store.reopen();
            thread::spawn(move || {
                let mut session = process.session();
                let mut conflicts = 0;
                for _ in 0..10 {
                    conflicts += commit_with_retry(&mut session, 1_000, |s| {
                        let current = s.read(COUNTER_KEY).and_then(|v| v.as_integer()).unwrap_or(0);
                        s.write(COUNTER_KEY, current + 1)
                    })
                    .unwrap();
                }
                conflicts
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    assert_eq!(store.reopen().session().read(COUNTER_KEY), Some(Value::from(40)));
}

#[test]
fn shared_store_stress() {
    let store = TestStore::file();
    let config = StressConfig {
        operations: 80,
        threads: 4,
        ..Default::default()
    };

    let result = stress_concurrent_increments(Arc::clone(&store), &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(
        store.reopen().session().read(COUNTER_KEY),
        Some(Value::from(80))
    );
}
