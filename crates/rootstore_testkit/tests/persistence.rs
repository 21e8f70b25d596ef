//! Writer/checker passes across independent store handles.

use rootstore_core::{ObjectRef, PersistentStore, ScopeMode, SequenceNumber, Value};
use rootstore_testkit::prelude::*;

#[test]
fn hat_written_by_one_process_is_read_by_the_next() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.write("hat", "A New Hat")?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    assert_eq!(checker.read("hat"), Some(Value::from("A New Hat")));
}

#[test]
fn undefined_key_reads_as_absent() {
    let store = TestStore::file();
    let checker = store.reopen().session();
    assert_eq!(checker.read("never_written"), None);
    assert!(checker.roots().is_empty());
}

#[test]
fn uncommitted_writes_are_not_durable() {
    let store = TestStore::file();
    let mut writer = store.session();
    let handle = writer.enter(ScopeMode::Persistent);
    writer.write("hat", "Draft").unwrap();

    assert_eq!(store.reopen().session().read("hat"), None);
    writer.close(handle).unwrap();
    assert_eq!(store.reopen().session().read("hat"), None);
}

#[test]
fn employees_survive_reopen() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            let staff = ObjectRef::list(vec![]);
            for (name, salary) in [("Alice", 5200), ("Bob", 4100), ("Carol", 6300)] {
                let employee = ObjectRef::with_fields(
                    "Employee",
                    [("name", Value::from(name)), ("salary", Value::from(salary))],
                );
                s.push(&staff, employee)?;
            }
            s.write("employees", staff)?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    let staff = checker.read("employees").unwrap();
    let staff = staff.as_object().unwrap();
    assert_eq!(staff.len(), 3);

    let mut names = Vec::new();
    for employee in staff.elements().unwrap() {
        let employee = employee.as_object().unwrap().clone();
        assert_eq!(employee.class_name(), "Employee");
        assert!(employee.field("salary").and_then(|v| v.as_integer()).unwrap() > 0);
        names.push(employee.field("name").unwrap());
    }
    assert_eq!(
        names,
        vec![Value::from("Alice"), Value::from("Bob"), Value::from("Carol")]
    );
}

#[test]
fn cycles_and_shared_references_keep_identity() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            let owner = ObjectRef::with_fields("Person", [("name", Value::from("Ann"))]);
            let hat = ObjectRef::with_fields("Hat", [("owner", Value::from(&owner))]);
            s.set_field(&owner, "hat", &hat)?;
            s.write("owner", &owner)?;
            s.write("hat", &hat)?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    let owner = checker.read("owner").unwrap();
    let hat = checker.read("hat").unwrap();
    let owner = owner.as_object().unwrap();
    let hat = hat.as_object().unwrap();

    assert!(owner.field("hat").unwrap().as_object().unwrap().ptr_eq(hat));
    assert!(hat.field("owner").unwrap().as_object().unwrap().ptr_eq(owner));
    assert_eq!(
        checker.inspect(&Value::from(owner)),
        "#<Person @hat=#<Hat @owner=#<Person ...>>, @name=\"Ann\">"
    );
}

#[test]
fn later_commit_updates_object_in_place() {
    let store = TestStore::file();
    let mut writer = store.session();
    let hat = ObjectRef::with_fields("Hat", [("size", Value::from(7))]);
    writer
        .enter_persistent(|s| {
            s.write("hat", &hat)?;
            s.commit_transaction()
        })
        .unwrap();

    let mut reader = store.reopen().session();
    let seen = reader.read("hat").unwrap();

    writer
        .enter_persistent(|s| {
            s.set_field(&hat, "size", 8)?;
            s.commit_transaction()
        })
        .unwrap();

    reader.refresh().unwrap();
    let again = reader.read("hat").unwrap();
    assert!(seen.as_object().unwrap().ptr_eq(again.as_object().unwrap()));
    assert_eq!(again.as_object().unwrap().field("size"), Some(Value::from(8)));
}

#[test]
fn removed_root_stays_removed() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.write("hat", 1)?;
            s.write("coat", 2)?;
            s.commit_transaction()?;
            s.remove("hat")?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    assert_eq!(checker.read("hat"), None);
    assert_eq!(checker.read("coat"), Some(Value::from(2)));
    assert_eq!(
        store.committed_sequence().unwrap(),
        SequenceNumber::new(2)
    );
}

#[test]
fn constants_commit_only_from_persistent_scopes() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.set_constant("MAX_HATS", 3)?;
            s.commit_transaction()
        })
        .unwrap();
    writer
        .enter_transient(|s| {
            s.set_constant("MAX_HATS", 99)?;
            s.set_constant("SCRATCH", "tmp")?;
            assert_eq!(s.constant("MAX_HATS"), Some(Value::from(99)));
            Ok(())
        })
        .unwrap();

    assert_eq!(writer.constant("MAX_HATS"), Some(Value::from(3)));
    let checker = store.reopen().session();
    assert_eq!(checker.constant("MAX_HATS"), Some(Value::from(3)));
    assert_eq!(checker.constant("SCRATCH"), None);
}

#[test]
fn memory_store_is_visible_to_later_sessions() {
    let store = PersistentStore::open_in_memory().unwrap();
    let mut writer = store.session().unwrap();
    writer
        .enter_persistent(|s| {
            s.write("hat", "A New Hat")?;
            s.commit_transaction()
        })
        .unwrap();
    assert_eq!(
        store.session().unwrap().read("hat"),
        Some(Value::from("A New Hat"))
    );
}
