//! Mutation engine.
//!
//! Each operation resolves its target through the addressor, refuses a value
//! that would contain its own new parent, serializes the incoming value, and
//! only then touches the tree, so a failure at any step leaves the tree as it
//! was. The returned descriptors are in the order the
//! persistence collaborator must apply them.

use livegraph_path::{child, split_last, Path};

use crate::address::{container_at, parent_and_key_at, value_at, Key, Location};
use crate::descriptor::{Change, Descriptor};
use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::project::Module;
use crate::serialize::{serialize, untracked_placeholder};
use crate::value::{ObjId, Object, Value};

// ── Primitive edits ───────────────────────────────────────────────────────

/// Overwrite the slot at `loc`, keeping its position.
pub(crate) fn write_at(heap: &mut Heap, loc: &Location, value: Value) -> Result<()> {
    match &loc.key {
        Key::Index(i) => {
            let items = heap.sequence_mut(loc.parent)?;
            let slot = items
                .get_mut(*i)
                .ok_or_else(|| Error::bad_path(&[*i], "position out of range"))?;
            *slot = value;
        }
        Key::Name(key) => {
            heap.mapping_mut(loc.parent)?.entries.insert(key.clone(), value);
        }
    }
    Ok(())
}

/// Remove the slot at `loc` and return what it held.
pub(crate) fn remove_at(heap: &mut Heap, loc: &Location) -> Result<Value> {
    match &loc.key {
        Key::Index(i) => {
            let items = heap.sequence_mut(loc.parent)?;
            if *i >= items.len() {
                return Err(Error::bad_path(&[*i], "position out of range"));
            }
            Ok(items.remove(*i))
        }
        Key::Name(key) => Ok(heap.delete_entry(loc.parent, key)?.unwrap_or(Value::Undefined)),
    }
}

/// Insert into `parent` at `pos`, clamped to append. `key` selects a mapping
/// insert, `None` a sequence insert. Returns the final position.
pub(crate) fn insert_into(heap: &mut Heap, parent: ObjId, pos: usize, key: Option<&str>, value: Value) -> Result<usize> {
    match key {
        None => {
            let items = heap.sequence_mut(parent)?;
            let pos = pos.min(items.len());
            items.insert(pos, value);
            Ok(pos)
        }
        Some(key) => {
            if heap.mapping(parent)?.has_own(key) {
                return Err(Error::DuplicateKey {
                    path: Vec::new(),
                    key: key.to_string(),
                });
            }
            heap.insert_entry(parent, key, value, pos)
        }
    }
}

/// Position after moving one step, wrapping at both ends.
pub fn new_position(len: usize, i: usize, forward: bool) -> usize {
    if forward {
        if i + 1 >= len {
            0
        } else {
            i + 1
        }
    } else if i == 0 {
        len.saturating_sub(1)
    } else {
        i - 1
    }
}

fn entry_count(heap: &Heap, id: ObjId) -> Result<usize> {
    Ok(match heap.object(id)? {
        Object::Sequence(items) => items.len(),
        Object::Mapping(mapping) => heap.ordered_keys().keys_of(id, mapping).len(),
        Object::Callable(_) => 0,
    })
}

/// Storing `value` under `parent` must not make `parent` its own descendant.
fn refuse_cycle(heap: &Heap, value: &Value, parent: ObjId) -> Result<()> {
    if heap.reaches(value, parent) {
        return Err(Error::Cycle);
    }
    Ok(())
}

// ── Operations ────────────────────────────────────────────────────────────

/// Overwrite the node at `path` in place.
pub fn replace(heap: &mut Heap, module: &Module, path: &[usize], value: Value) -> Result<Vec<Descriptor>> {
    let loc = parent_and_key_at(heap, module.root, path)?;
    refuse_cycle(heap, &value, loc.parent)?;
    let new_value = serialize(heap, &value)?;
    write_at(heap, &loc, value)?;
    Ok(vec![Descriptor::new(
        &module.id,
        Change::Replace {
            path: path.to_vec(),
            new_value,
        },
    )])
}

/// Rename the mapping key at `path`, keeping its position.
pub fn rename(heap: &mut Heap, module: &Module, path: &[usize], new_name: &str) -> Result<Vec<Descriptor>> {
    let loc = parent_and_key_at(heap, module.root, path)?;
    let old = match &loc.key {
        Key::Name(old) => old.clone(),
        Key::Index(_) => {
            return Err(Error::TypeMismatch {
                expected: "mapping",
                actual: "sequence",
            })
        }
    };
    heap.rename_entry(loc.parent, &old, new_name)
        .map_err(|e| e.at_path(path))?;
    Ok(vec![Descriptor::new(
        &module.id,
        Change::Rename {
            path: path.to_vec(),
            new_name: new_name.to_string(),
        },
    )])
}

/// Insert `value` into the sequence at `parent_path`.
pub fn insert_sequence(
    heap: &mut Heap,
    module: &Module,
    parent_path: &[usize],
    pos: usize,
    value: Value,
) -> Result<Vec<Descriptor>> {
    let parent = container_at(heap, module.root, parent_path)?;
    heap.sequence(parent)?;
    refuse_cycle(heap, &value, parent)?;
    let serialized = serialize(heap, &value)?;
    let pos = insert_into(heap, parent, pos, None, value)?;
    Ok(vec![Descriptor::new(
        &module.id,
        Change::Insert {
            path: child(parent_path, pos),
            key: None,
            value: serialized,
        },
    )])
}

/// Insert `key: value` into the mapping at `parent_path`.
pub fn insert_mapping(
    heap: &mut Heap,
    module: &Module,
    parent_path: &[usize],
    pos: usize,
    key: &str,
    value: Value,
) -> Result<Vec<Descriptor>> {
    let parent = container_at(heap, module.root, parent_path)?;
    if heap.mapping(parent)?.has_own(key) {
        return Err(Error::DuplicateKey {
            path: parent_path.to_vec(),
            key: key.to_string(),
        });
    }
    refuse_cycle(heap, &value, parent)?;
    let serialized = serialize(heap, &value)?;
    let pos = insert_into(heap, parent, pos, Some(key), value)?;
    Ok(vec![Descriptor::new(
        &module.id,
        Change::Insert {
            path: child(parent_path, pos),
            key: Some(key.to_string()),
            value: serialized,
        },
    )])
}

/// Move the entry at `path` one step forward or backward, wrapping at both
/// ends. Returns the new path and a `delete` + `insert` pair.
pub fn move_entry(
    heap: &mut Heap,
    module: &Module,
    path: &[usize],
    forward: bool,
) -> Result<(Path, Vec<Descriptor>)> {
    let loc = parent_and_key_at(heap, module.root, path)?;
    let (parent_path, pos) = split_last(path)?;
    let len = entry_count(heap, loc.parent)?;
    let new_pos = new_position(len, pos, forward);

    let untracked = loc.parent == module.root
        && loc.key.as_name().is_some_and(|k| module.is_untracked(k));
    let serialized = if untracked {
        untracked_placeholder()
    } else {
        let value = value_at(heap, module.root, path)?;
        serialize(heap, &value)?
    };

    match &loc.key {
        Key::Index(_) => {
            let items = heap.sequence_mut(loc.parent)?;
            let value = items.remove(pos);
            items.insert(new_pos, value);
        }
        Key::Name(_) => heap.reposition_entry(loc.parent, pos, new_pos)?,
    }

    let new_path = child(parent_path, new_pos);
    let descriptors = vec![
        Descriptor::new(&module.id, Change::Delete { path: path.to_vec() }),
        Descriptor::new(
            &module.id,
            Change::Insert {
                path: new_path.clone(),
                key: loc.key.as_name().map(str::to_string),
                value: serialized,
            },
        ),
    ];
    Ok((new_path, descriptors))
}

/// Remove the entry at `path`.
pub fn delete(heap: &mut Heap, module: &Module, path: &[usize]) -> Result<Vec<Descriptor>> {
    let loc = parent_and_key_at(heap, module.root, path)?;
    remove_at(heap, &loc)?;
    Ok(vec![Descriptor::new(&module.id, Change::Delete { path: path.to_vec() })])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::key_at;
    use crate::serialize::Serialized;
    use crate::value::Supertype;
    use serde_json::json;

    fn fixture() -> (Heap, Module) {
        let mut heap = Heap::new();
        let root = heap
            .alloc_json(&json!({"a": [1, 2, 3], "b": {"x": 1, "y": 2}}))
            .as_object()
            .unwrap();
        (heap, Module::new("m", "main", root))
    }

    fn dump(heap: &Heap, module: &Module) -> serde_json::Value {
        serialize(heap, &Value::Object(module.root)).unwrap().to_json()
    }

    #[test]
    fn test_insert_refuses_ancestor() {
        let (mut heap, module) = fixture();
        let before = dump(&heap, &module);
        let root = Value::Object(module.root);

        let err = insert_mapping(&mut heap, &module, &[1], 0, "self", root.clone()).unwrap_err();
        assert_eq!(err, Error::Cycle);
        assert_eq!(err.tag(), "generic");
        let err = insert_sequence(&mut heap, &module, &[0], 1, root.clone()).unwrap_err();
        assert_eq!(err, Error::Cycle);
        let err = insert_mapping(&mut heap, &module, &[], 0, "me", root).unwrap_err();
        assert_eq!(err, Error::Cycle);

        assert_eq!(dump(&heap, &module), before);
    }

    #[test]
    fn test_replace_refuses_ancestor() {
        let (mut heap, module) = fixture();
        let before = dump(&heap, &module);
        let b = container_at(&heap, module.root, &[1]).unwrap();
        let wrapper = heap.alloc_json(&json!({"inner": null}));
        let wrapper_id = wrapper.as_object().unwrap();
        heap.set_entry(wrapper_id, "inner", Value::Object(b)).unwrap();

        let err = replace(&mut heap, &module, &[1, 0], wrapper).unwrap_err();
        assert_eq!(err, Error::Cycle);
        assert_eq!(dump(&heap, &module), before);
    }

    #[test]
    fn test_shared_subtree_is_not_a_cycle() {
        let (mut heap, module) = fixture();
        let b = container_at(&heap, module.root, &[1]).unwrap();
        insert_sequence(&mut heap, &module, &[0], 0, Value::Object(b)).unwrap();
        let out = dump(&heap, &module);
        assert_eq!(out["value"]["a"]["value"][0], out["value"]["b"]);
    }

    #[test]
    fn test_new_position_wraps() {
        assert_eq!(new_position(3, 2, true), 0);
        assert_eq!(new_position(3, 0, false), 2);
        assert_eq!(new_position(3, 1, true), 2);
        assert_eq!(new_position(3, 1, false), 0);
        assert_eq!(new_position(1, 0, true), 0);
        assert_eq!(new_position(1, 0, false), 0);
    }

    #[test]
    fn test_move_sequence_element_forward() {
        let (mut heap, module) = fixture();
        let (new_path, ds) = move_entry(&mut heap, &module, &[0, 1], true).unwrap();
        assert_eq!(new_path, vec![0, 2]);
        let a = container_at(&heap, module.root, &[0]).unwrap();
        assert_eq!(
            heap.sequence(a).unwrap(),
            &vec![Value::Number(1.0), Value::Number(3.0), Value::Number(2.0)]
        );
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].change, Change::Delete { path: vec![0, 1] });
        assert_eq!(
            ds[1].change,
            Change::Insert {
                path: vec![0, 2],
                key: None,
                value: Serialized::Leaf { value: "2".into() }
            }
        );
    }

    #[test]
    fn test_move_mapping_key_wraps() {
        let (mut heap, module) = fixture();
        let (new_path, ds) = move_entry(&mut heap, &module, &[1, 1], true).unwrap();
        assert_eq!(new_path, vec![1, 0]);
        let b = container_at(&heap, module.root, &[1]).unwrap();
        assert_eq!(heap.keys(b).unwrap(), vec!["y", "x"]);
        assert!(matches!(&ds[1].change, Change::Insert { key: Some(k), .. } if k == "y"));

        let (new_path, _) = move_entry(&mut heap, &module, &[1, 0], false).unwrap();
        assert_eq!(new_path, vec![1, 1]);
        assert_eq!(heap.keys(b).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_move_redacts_untracked_root_key() {
        let (mut heap, module) = fixture();
        let module = module.with_untracked(["a"]);
        let (_, ds) = move_entry(&mut heap, &module, &[0], true).unwrap();
        assert!(matches!(
            &ds[1].change,
            Change::Insert { value, .. } if *value == untracked_placeholder()
        ));
        // The live tree still holds the real sequence.
        assert_eq!(key_at(&heap, module.root, &[1]).unwrap(), "a");
        assert!(value_at(&heap, module.root, &[1]).unwrap().is_object());
    }

    #[test]
    fn test_insert_mapping_at_front() {
        let (mut heap, module) = fixture();
        let ds = insert_mapping(&mut heap, &module, &[1], 0, "z", Value::Number(9.0)).unwrap();
        let b = container_at(&heap, module.root, &[1]).unwrap();
        assert_eq!(heap.keys(b).unwrap(), vec!["z", "x", "y"]);
        assert_eq!(value_at(&heap, module.root, &[1, 0]).unwrap(), Value::Number(9.0));
        assert_eq!(ds[0].change.path(), &[1, 0]);
    }

    #[test]
    fn test_insert_mapping_duplicate_and_mismatch() {
        let (mut heap, module) = fixture();
        let before = dump(&heap, &module);
        assert!(matches!(
            insert_mapping(&mut heap, &module, &[1], 0, "x", Value::Null),
            Err(Error::DuplicateKey { .. })
        ));
        assert!(matches!(
            insert_mapping(&mut heap, &module, &[0], 0, "k", Value::Null),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            insert_sequence(&mut heap, &module, &[1], 0, Value::Null),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(dump(&heap, &module), before);
    }

    #[test]
    fn test_insert_sequence_clamps_and_records_position() {
        let (mut heap, module) = fixture();
        let ds = insert_sequence(&mut heap, &module, &[0], 99, Value::from("end")).unwrap();
        assert_eq!(ds[0].change.path(), &[0, 3]);
        assert_eq!(value_at(&heap, module.root, &[0, 3]).unwrap(), Value::from("end"));
    }

    #[test]
    fn test_rename_collision_leaves_tree() {
        let (mut heap, module) = fixture();
        let before = dump(&heap, &module);
        let err = rename(&mut heap, &module, &[1, 0], "y").unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateKey {
                path: vec![1, 0],
                key: "y".into()
            }
        );
        assert_eq!(dump(&heap, &module), before);
    }

    #[test]
    fn test_rename_sequence_element_is_mismatch() {
        let (mut heap, module) = fixture();
        assert!(matches!(
            rename(&mut heap, &module, &[0, 0], "q"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_replace_and_delete() {
        let (mut heap, module) = fixture();
        replace(&mut heap, &module, &[1, 1], Value::Bool(true)).unwrap();
        delete(&mut heap, &module, &[0, 0]).unwrap();
        delete(&mut heap, &module, &[1, 0]).unwrap();
        assert_eq!(
            dump(&heap, &module),
            json!({
                "kind": "mapping",
                "value": {
                    "a": {"kind": "sequence", "value": [
                        {"kind": "leaf", "value": "2"},
                        {"kind": "leaf", "value": "3"}
                    ]},
                    "b": {"kind": "mapping", "value": {"y": {"kind": "leaf", "value": "true"}}}
                }
            })
        );
    }

    #[test]
    fn test_unserializable_value_leaves_tree() {
        let (mut heap, module) = fixture();
        let before = dump(&heap, &module);
        let exotic = heap.new_mapping(Vec::<(String, Value)>::new());
        heap.mapping_mut(exotic).unwrap().supertype = Supertype::Builtin("Map".into());
        assert_eq!(
            replace(&mut heap, &module, &[0], Value::Object(exotic)),
            Err(Error::UnsupportedPrototype)
        );
        assert_eq!(dump(&heap, &module), before);
    }

    #[test]
    fn test_empty_path() {
        let (mut heap, module) = fixture();
        assert_eq!(delete(&mut heap, &module, &[]), Err(Error::EmptyPath));
        assert_eq!(move_entry(&mut heap, &module, &[], true), Err(Error::EmptyPath));
    }
}
