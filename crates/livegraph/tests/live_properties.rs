use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use livegraph::address::{key_at, parent_and_key_at, path_of, value_at};
use livegraph::descriptor::replay;
use livegraph::inspect::{inspect, inspect_getter, inspect_handle};
use livegraph::mutation::{insert_mapping, move_entry, new_position, rename};
use livegraph::serialize::serialize;
use livegraph::{Accessor, Callable, Error, Heap, InspectionSpace, Module, ObjId, Object, Path, Serialized, Value};
use proptest::prelude::*;
use serde_json::{json, Value as Json};

fn fixture() -> (Heap, Module) {
    let mut heap = Heap::new();
    let root = heap
        .alloc_json(&json!({"a": [1, 2, 3], "b": {"x": 1, "y": 2}}))
        .as_object()
        .unwrap();
    (heap, Module::new("m", "main", root))
}

fn dump(heap: &Heap, root: ObjId) -> Json {
    serialize(heap, &Value::Object(root)).unwrap().to_json()
}

/// Every path addressing a node below `id`, depth first.
fn all_paths(heap: &Heap, id: ObjId, prefix: &[usize], out: &mut Vec<Path>) {
    let children: Vec<Value> = match heap.object(id).unwrap() {
        Object::Sequence(items) => items.clone(),
        Object::Mapping(_) => heap.entries(id).unwrap().into_iter().map(|(_, v)| v).collect(),
        Object::Callable(_) => return,
    };
    for (i, v) in children.iter().enumerate() {
        let mut path = prefix.to_vec();
        path.push(i);
        out.push(path.clone());
        if let Value::Object(child) = v {
            all_paths(heap, *child, &path, out);
        }
    }
}

fn arb_json() -> impl Strategy<Value = Json> {
    let leaf = prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,4}".prop_map(Json::String),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Json::Array),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                .prop_map(|m| Json::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_tree() -> impl Strategy<Value = Json> {
    prop::collection::btree_map("[a-z]{1,3}", arb_json(), 1..5).prop_map(|m| Json::Object(m.into_iter().collect()))
}

// ── Addressing ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_path_roundtrip(tree in arb_tree(), reverse in any::<bool>()) {
        let mut heap = Heap::new();
        let root = heap.alloc_json(&tree).as_object().unwrap();
        if reverse {
            heap.ensure_order(root).unwrap().reverse();
        }
        let mut paths = Vec::new();
        all_paths(&heap, root, &[], &mut paths);
        for path in paths {
            let loc = parent_and_key_at(&heap, root, &path).unwrap();
            prop_assert_eq!(path_of(&heap, &path[..path.len() - 1], &loc).unwrap(), path);
        }
    }

    #[test]
    fn prop_move_replays_as_delete_then_insert(tree in arb_tree(), forward in any::<bool>()) {
        let mut heap = Heap::new();
        let root = heap.alloc_json(&tree).as_object().unwrap();
        let module = Module::new("m", "main", root);
        let mut paths = Vec::new();
        all_paths(&heap, root, &[], &mut paths);

        for path in paths {
            let before = heap.clone();
            let mut copy = heap.clone();
            let (_, log) = move_entry(&mut heap, &module, &path, forward).unwrap();
            replay(&mut copy, root, &log).unwrap();
            prop_assert_eq!(dump(&copy, root), dump(&heap, root));
            heap = before;
        }
    }
}

#[test]
fn overlay_ensure_is_idempotent() {
    let (mut heap, module) = fixture();
    let b = heap.mapping(module.root).unwrap().entries["b"].as_object().unwrap();
    let before = heap.keys(b).unwrap();
    let first = heap.ensure_order(b).unwrap().clone();
    let second = heap.ensure_order(b).unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(heap.ordered_keys().len(), 1);
    assert_eq!(heap.keys(b).unwrap(), before);
}

// ── Moves ─────────────────────────────────────────────────────────────────

#[test]
fn move_wraps_at_both_ends() {
    let (mut heap, module) = fixture();
    let (p, _) = move_entry(&mut heap, &module, &[0, 2], true).unwrap();
    assert_eq!(p, vec![0, 0]);
    let (p, _) = move_entry(&mut heap, &module, &[0, 0], false).unwrap();
    assert_eq!(p, vec![0, 2]);
    for i in 1..9 {
        assert_eq!(new_position(10, i, true), i + 1);
        assert_eq!(new_position(10, i, false), i - 1);
    }
}

#[test]
fn move_scenario_sequence_element() {
    let (mut heap, module) = fixture();
    let (new_path, _) = move_entry(&mut heap, &module, &[0, 1], true).unwrap();
    assert_eq!(new_path, vec![0, 2]);
    assert_eq!(
        dump(&heap, module.root)["value"]["a"],
        json!({"kind": "sequence", "value": [
            {"kind": "leaf", "value": "1"},
            {"kind": "leaf", "value": "3"},
            {"kind": "leaf", "value": "2"}
        ]})
    );
}

// ── Inserts and renames ───────────────────────────────────────────────────

#[test]
fn insert_scenario_mapping_front() {
    let (mut heap, module) = fixture();
    insert_mapping(&mut heap, &module, &[1], 0, "z", Value::Number(9.0)).unwrap();
    assert_eq!(key_at(&heap, module.root, &[1, 0]).unwrap(), "z");
    assert_eq!(key_at(&heap, module.root, &[1, 1]).unwrap(), "x");
    assert_eq!(key_at(&heap, module.root, &[1, 2]).unwrap(), "y");
    assert_eq!(value_at(&heap, module.root, &[1, 0]).unwrap(), Value::Number(9.0));
}

#[test]
fn rename_collision_is_rejected_without_mutation() {
    let (mut heap, module) = fixture();
    let before = dump(&heap, module.root);
    let err = rename(&mut heap, &module, &[0], "b").unwrap_err();
    assert_eq!(err.tag(), "duplicate_key");
    assert_eq!(err.info()["duplicatedKey"], json!("b"));
    assert_eq!(dump(&heap, module.root), before);
}

// ── Inspection ────────────────────────────────────────────────────────────

#[test]
fn refcount_lifecycle() {
    let (heap, module) = fixture();
    let mut space = InspectionSpace::new();
    let root = Value::Object(module.root);
    let h1 = inspect(&heap, &mut space, &root, false).unwrap().handle().unwrap();
    let h2 = inspect(&heap, &mut space, &root, false).unwrap().handle().unwrap();
    assert_eq!(h1, h2);
    assert_eq!(space.refcount(h1), Some(2));

    space.release(h1).unwrap();
    assert_eq!(space.resolve(h1).unwrap(), module.root);
    space.release(h1).unwrap();
    assert_eq!(space.release(h1), Err(Error::UnknownHandle(h1)));
    assert_eq!(inspect_handle(&heap, &mut space, h1), Err(Error::UnknownHandle(h1)));
}

#[test]
fn deep_inspection_does_not_evaluate_accessors() {
    let (mut heap, module) = fixture();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let getter = heap.new_callable(Callable::native("get total() { ... }", move |heap, this| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Number(heap.keys(this).map(|k| k.len()).unwrap_or(0) as f64))
    }));
    heap.mapping_mut(module.root).unwrap().accessors.insert(
        "total".into(),
        Accessor {
            getter: Some(getter),
            setter: None,
        },
    );

    let mut space = InspectionSpace::new();
    let out = inspect(&heap, &mut space, &Value::Object(module.root), true).unwrap();
    let Serialized::Mapping { handle: Some(h), value: Some(entries) } = out else {
        panic!("expected a deep mapping");
    };
    assert_eq!(
        entries["total"],
        Serialized::Unrevealed {
            parent_handle: h,
            prop: "total".into()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let value = inspect_getter(&mut heap, &mut space, h, "total").unwrap();
    assert_eq!(value, Serialized::Leaf { value: "2".into() });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
