//! Property tests: durability across sessions and scope semantics, roots
//! and list pushes, against a reference model.

use proptest::prelude::*;
use rootstore_core::{CoreError, ObjectRef, ScopeHandle, ScopeMode, SessionView, Value};
use rootstore_testkit::prelude::*;
use std::collections::BTreeSet;

/// A live write in the reference model.
#[derive(Clone, Copy)]
enum Entry {
    Root(usize, Option<i64>),
    Push(i64),
}

/// Reference model of one session's scope stack over a few root keys and
/// one committed list.
///
/// The working view is every live write folded in recording order, with
/// pushes appended to the committed list. A commit publishes, for each key
/// the target scope wrote, the value left when other scopes' pending writes
/// are ignored. Committed pushes join the committed list.
#[derive(Default)]
struct Model {
    durable: [Option<i64>; 3],
    list: Vec<i64>,
    live: Vec<(u64, Entry)>,
    scopes: Vec<(ScopeMode, Vec<u64>)>,
    next_seq: u64,
}

impl Model {
    fn fold(&self, skip: &BTreeSet<u64>) -> ([Option<i64>; 3], Vec<i64>) {
        let mut roots = [None; 3];
        let mut list = self.list.clone();
        for (seq, entry) in &self.live {
            if skip.contains(seq) {
                continue;
            }
            match *entry {
                Entry::Root(key, value) => roots[key] = value,
                Entry::Push(value) => list.push(value),
            }
        }
        (roots, list)
    }

    fn view(&self) -> ([Option<i64>; 3], Vec<i64>) {
        self.fold(&BTreeSet::new())
    }

    fn record(&mut self, entry: Entry) {
        self.next_seq += 1;
        self.live.push((self.next_seq, entry));
        if let Some((_, pending)) = self.scopes.last_mut() {
            pending.push(self.next_seq);
        }
    }

    fn discard(&mut self, seqs: &[u64]) {
        self.live.retain(|(seq, _)| !seqs.contains(seq));
    }

    fn close(&mut self) {
        let Some((mode, pending)) = self.scopes.pop() else {
            return;
        };
        if mode == ScopeMode::Transient || pending.is_empty() {
            self.discard(&pending);
            return;
        }
        match self
            .scopes
            .iter_mut()
            .rev()
            .find(|(mode, _)| *mode == ScopeMode::Persistent)
        {
            Some((_, parent)) => {
                parent.extend(pending);
                parent.sort_unstable();
            }
            None => self.discard(&pending),
        }
    }

    /// `None` without a persistent scope, `Some(false)` for an empty commit.
    fn commit(&mut self) -> Option<bool> {
        let target = self
            .scopes
            .iter()
            .rposition(|(mode, _)| *mode == ScopeMode::Persistent)?;
        let committing = std::mem::take(&mut self.scopes[target].1);
        if committing.is_empty() {
            return Some(false);
        }
        let others: BTreeSet<u64> = self
            .scopes
            .iter()
            .flat_map(|(_, pending)| pending.iter().copied())
            .collect();
        let (published, published_list) = self.fold(&others);
        let mut pushed = false;
        for (seq, entry) in &self.live {
            if !committing.contains(seq) {
                continue;
            }
            match *entry {
                Entry::Root(key, _) => self.durable[key] = published[key],
                Entry::Push(_) => pushed = true,
            }
        }
        if pushed {
            self.list = published_list;
            self.live
                .retain(|(seq, entry)| !(committing.contains(seq) && matches!(entry, Entry::Push(_))));
        }
        Some(true)
    }
}

fn read_all(session: &SessionView) -> [Option<i64>; 3] {
    SCOPE_OP_KEYS.map(|key| session.read(key).and_then(|v| v.as_integer()))
}

fn integers(list: &ObjectRef) -> Vec<i64> {
    list.elements()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_integer)
        .collect()
}

fn observe(session: &SessionView, list: &ObjectRef) -> ([Option<i64>; 3], Vec<i64>) {
    (read_all(session), integers(list))
}

const MAX_DEPTH: usize = 5;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn committed_scalars_reach_new_sessions(
        writes in prop::collection::btree_map(root_key_strategy(), scalar_value_strategy(), 1..8)
    ) {
        let store = TestStore::memory();
        let mut writer = store.session();
        writer.enter_persistent(|s| {
            for (key, value) in &writes {
                s.write(key.clone(), value.clone())?;
            }
            s.commit_transaction()
        }).unwrap();

        let checker = store.session();
        for (key, value) in &writes {
            prop_assert_eq!(checker.read(key.clone()), Some(value.clone()));
        }
    }

    #[test]
    fn object_graphs_keep_their_shape(graph in graph_spec_strategy(6)) {
        let store = TestStore::memory();
        let mut writer = store.session();
        let written = writer.enter_persistent(|s| {
            let entry = graph.build(s)?;
            s.write("graph", entry.clone())?;
            s.commit_transaction()?;
            Ok(entry)
        }).unwrap();

        let read = store.session().read("graph").unwrap();
        prop_assert_eq!(GraphShape::of(&read), GraphShape::of(&written));
    }

    #[test]
    fn class_entries_round_trip(entry in class_entry_strategy()) {
        let store = TestStore::memory();
        let mut writer = store.session();
        writer.enter_persistent(|s| {
            s.define_class(entry.clone())?;
            s.commit_transaction()
        }).unwrap();

        let checker = store.session();
        prop_assert_eq!(checker.class(entry.name()), Some(&entry));
    }

    #[test]
    fn scopes_match_reference_model(ops in scope_op_sequence_strategy(1, 40)) {
        let store = TestStore::memory();
        let mut session = store.session();
        let list = ObjectRef::list(vec![]);
        session.enter_persistent(|s| {
            s.write("items", &list)?;
            s.commit_transaction()
        }).unwrap();
        let mut handles: Vec<ScopeHandle> = Vec::new();
        let mut model = Model::default();

        for op in &ops {
            match op {
                ScopeOp::EnterPersistent | ScopeOp::EnterTransient => {
                    if handles.len() < MAX_DEPTH {
                        let mode = if *op == ScopeOp::EnterPersistent {
                            ScopeMode::Persistent
                        } else {
                            ScopeMode::Transient
                        };
                        handles.push(session.enter(mode));
                        model.scopes.push((mode, Vec::new()));
                    }
                }
                ScopeOp::Write { key, value } => {
                    let result = session.write(SCOPE_OP_KEYS[*key], *value);
                    if handles.is_empty() {
                        prop_assert!(matches!(result, Err(CoreError::NoActiveScope)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.record(Entry::Root(*key, Some(*value)));
                    }
                }
                ScopeOp::Remove { key } => {
                    let result = session.remove(SCOPE_OP_KEYS[*key]);
                    if handles.is_empty() {
                        prop_assert!(matches!(result, Err(CoreError::NoActiveScope)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.record(Entry::Root(*key, None));
                    }
                }
                ScopeOp::Push { value } => {
                    let result = session.push(&list, *value);
                    if handles.is_empty() {
                        prop_assert!(matches!(result, Err(CoreError::NoActiveScope)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.record(Entry::Push(*value));
                    }
                }
                ScopeOp::Close => {
                    if let Some(handle) = handles.pop() {
                        session.close(handle).unwrap();
                        model.close();
                    }
                }
                ScopeOp::Commit => {
                    let result = session.commit_transaction();
                    match model.commit() {
                        None => prop_assert!(matches!(result, Err(CoreError::NoActiveTransaction))),
                        Some(published) => prop_assert_eq!(result.unwrap().is_some(), published),
                    }
                }
            }
            prop_assert_eq!(observe(&session, &list), model.view());
        }

        while let Some(handle) = handles.pop() {
            session.close(handle).unwrap();
            model.close();
        }
        prop_assert_eq!(observe(&session, &list), model.view());

        let checker = store.session();
        prop_assert_eq!(read_all(&checker), model.durable);
        let stored = checker.read("items").and_then(|v| v.as_object().cloned());
        prop_assert_eq!(stored.map(|l| integers(&l)), Some(model.list.clone()));
    }
}

#[test]
fn model_discards_overwritten_transient_value() {
    let mut model = Model::default();
    model.scopes.push((ScopeMode::Persistent, Vec::new()));
    model.scopes.push((ScopeMode::Transient, Vec::new()));
    model.record(Entry::Root(0, Some(1)));
    model.scopes.push((ScopeMode::Persistent, Vec::new()));
    model.record(Entry::Root(0, Some(2)));
    model.close();
    model.close();
    assert_eq!(model.view().0, [Some(2), None, None]);
    model.close();
    assert_eq!(model.view().0, [None, None, None]);
}

#[test]
fn model_commits_pushes_without_transient_ones() {
    let mut model = Model::default();
    model.scopes.push((ScopeMode::Transient, Vec::new()));
    model.record(Entry::Push(1));
    model.scopes.push((ScopeMode::Persistent, Vec::new()));
    model.record(Entry::Push(2));
    assert_eq!(model.commit(), Some(true));
    assert_eq!(model.list, vec![2]);
    assert_eq!(model.view().1, vec![2, 1]);
    model.close();
    model.close();
    assert_eq!(model.view().1, vec![2]);
}
