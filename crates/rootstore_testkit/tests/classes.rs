//! Class definitions, method removal and class-level variables.

use rootstore_core::{ClassEntry, CoreError, MethodBody, MethodKind, ObjectRef, Value};
use rootstore_testkit::prelude::*;

fn c004() -> ClassEntry {
    ClassEntry::new("C004")
        .with_instance_method("foo", MethodBody::Constant(Value::from("foo")))
        .with_instance_method("bar", MethodBody::Constant(Value::from("bar")))
        .with_class_method("baz", MethodBody::Constant(Value::from("baz")))
        .with_class_method("qux", MethodBody::Constant(Value::from("qux")))
}

#[test]
fn removed_methods_stay_removed_after_commit() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.define_class(c004())?;
            s.commit_transaction()
        })
        .unwrap();

    writer
        .enter_persistent(|s| {
            s.remove_instance_method("C004", "bar")?;
            s.remove_class_method("C004", "qux")?;
            s.commit_transaction()
        })
        .unwrap();

    let instance = Value::from(ObjectRef::new("C004"));
    for session in [&writer, &store.reopen().session()] {
        assert_eq!(session.send(&instance, "foo").unwrap(), Value::from("foo"));
        assert!(!session.responds_to(&instance, "bar"));
        let err = session.send(&instance, "bar").unwrap_err();
        assert_eq!(err.to_string(), "undefined method `bar' for #<C004>");

        assert_eq!(session.send_class("C004", "baz").unwrap(), Value::from("baz"));
        assert!(!session.class_responds_to("C004", "qux"));
        let err = session.send_class("C004", "qux").unwrap_err();
        assert_eq!(err.to_string(), "undefined method `qux' for C004:Class");
    }
}

#[test]
fn removing_missing_method_is_undefined_target() {
    with_session(|session| {
        session
            .enter_persistent(|s| {
                s.define_class(c004())?;
                assert!(matches!(
                    s.remove_instance_method("C004", "nope"),
                    Err(CoreError::UndefinedTarget { .. })
                ));
                assert!(matches!(
                    s.remove_class_method("Missing", "baz"),
                    Err(CoreError::UndefinedTarget { .. })
                ));
                Ok(())
            })
            .unwrap();
    });
}

#[test]
fn transient_method_removal_is_undone() {
    let store = TestStore::file();
    let mut session = store.session();
    session
        .enter_persistent(|s| {
            s.define_class(c004())?;
            s.commit_transaction()
        })
        .unwrap();
    session
        .enter_transient(|s| {
            s.remove_instance_method("C004", "foo")?;
            assert!(!s.responds_to(&Value::from(ObjectRef::new("C004")), "foo"));
            Ok(())
        })
        .unwrap();

    let instance = Value::from(ObjectRef::new("C004"));
    assert!(session.responds_to(&instance, "foo"));
    assert!(store.reopen().session().responds_to(&instance, "foo"));
}

#[test]
fn class_variables_survive_commit() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.define_class(
                ClassEntry::new("Hat")
                    .with_class_method("count", MethodBody::ClassVar("count".into()))
                    .with_class_method("label", MethodBody::ClassInstanceVar("label".into())),
            )?;
            s.set_class_var("Hat", "count", 3)?;
            s.set_class_instance_var("Hat", "label", "felt")?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    assert_eq!(checker.class_var("Hat", "count"), Some(Value::from(3)));
    assert_eq!(
        checker.class_instance_var("Hat", "label"),
        Some(Value::from("felt"))
    );
    assert_eq!(checker.send_class("Hat", "count").unwrap(), Value::from(3));
    assert_eq!(checker.send_class("Hat", "label").unwrap(), Value::from("felt"));
}

#[test]
fn reopening_a_class_merges_members() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.define_class(c004())?;
            s.define_class(
                ClassEntry::new("C004")
                    .with_instance_method("foo", MethodBody::Constant(Value::from("FOO")))
                    .with_instance_method("size", MethodBody::Field("size".into())),
            )?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    let hat = Value::from(ObjectRef::with_fields("C004", [("size", Value::from(9))]));
    assert_eq!(checker.send(&hat, "foo").unwrap(), Value::from("FOO"));
    assert_eq!(checker.send(&hat, "bar").unwrap(), Value::from("bar"));
    assert_eq!(checker.send(&hat, "size").unwrap(), Value::from(9));
}

#[test]
fn defined_method_is_dispatched_in_later_sessions() {
    let store = TestStore::file();
    let mut writer = store.session();
    writer
        .enter_persistent(|s| {
            s.define_class(c004())?;
            s.define_method(
                "C004",
                "greeting",
                MethodKind::Class,
                MethodBody::Constant(Value::from("hello")),
            )?;
            s.commit_transaction()
        })
        .unwrap();

    let checker = store.reopen().session();
    assert_eq!(
        checker.send_class("C004", "greeting").unwrap(),
        Value::from("hello")
    );
}

#[test]
fn scalar_receivers_describe_themselves() {
    with_session(|session| {
        let err = session.send(&Value::from(5), "bar").unwrap_err();
        assert_eq!(err.to_string(), "undefined method `bar' for 5:Integer");
    });
}
