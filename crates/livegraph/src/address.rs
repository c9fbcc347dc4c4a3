//! Structural addressing.
//!
//! Resolves positional [`Path`]s against a root container. Each step is read
//! against the container reached so far: for a mapping the step is a
//! position in its overlay order, for a sequence it is the storage index.

use livegraph_path::{split_last, Path};

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::value::{ObjId, Object, Value};

/// How a node is named inside its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }
}

/// A node located by its parent container and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub parent: ObjId,
    pub key: Key,
}

/// Resolve position `pos` of container `id`.
fn nth(heap: &Heap, id: ObjId, pos: usize, path: &[usize]) -> Result<(Key, Value)> {
    match heap.object(id)? {
        Object::Sequence(items) => items
            .get(pos)
            .map(|v| (Key::Index(pos), v.clone()))
            .ok_or_else(|| Error::bad_path(path, format!("position {pos} out of range"))),
        Object::Mapping(mapping) => {
            let key = heap
                .ordered_keys()
                .key_at(id, mapping, pos)
                .ok_or_else(|| Error::bad_path(path, format!("position {pos} out of range")))?;
            let value = mapping
                .entries
                .get(key)
                .cloned()
                .ok_or_else(|| Error::bad_path(path, format!("key {key:?} has no value")))?;
            Ok((Key::Name(key.to_string()), value))
        }
        Object::Callable(_) => Err(Error::bad_path(path, "callable is not a container")),
    }
}

fn container_id(heap: &Heap, value: &Value, path: &[usize]) -> Result<ObjId> {
    match value {
        Value::Object(id) if heap.object(*id)?.is_container() => Ok(*id),
        _ => Err(Error::bad_path(path, "non-container reached with steps remaining")),
    }
}

/// The value addressed by `path`.
pub fn value_at(heap: &Heap, root: ObjId, path: &[usize]) -> Result<Value> {
    let mut current = Value::Object(root);
    for &pos in path {
        let id = container_id(heap, &current, path)?;
        current = nth(heap, id, pos, path)?.1;
    }
    Ok(current)
}

/// The container holding the node addressed by `path`, and its key there.
pub fn parent_and_key_at(heap: &Heap, root: ObjId, path: &[usize]) -> Result<Location> {
    let (parent_path, last) = split_last(path)?;
    let parent_value = value_at(heap, root, parent_path)?;
    let parent = container_id(heap, &parent_value, path)?;
    let (key, _) = nth(heap, parent, last, path)?;
    Ok(Location { parent, key })
}

/// The mapping key of the node addressed by `path`.
pub fn key_at(heap: &Heap, root: ObjId, path: &[usize]) -> Result<String> {
    let loc = parent_and_key_at(heap, root, path)?;
    match loc.key {
        Key::Name(name) => Ok(name),
        Key::Index(_) => Err(Error::TypeMismatch {
            expected: "mapping",
            actual: "sequence",
        }),
    }
}

/// The container addressed by `path`; fails `BadPath` for leaves/callables.
pub fn container_at(heap: &Heap, root: ObjId, path: &[usize]) -> Result<ObjId> {
    let value = value_at(heap, root, path)?;
    container_id(heap, &value, path)
}

/// Re-derive the path of `loc`, given the path of its parent.
pub fn path_of(heap: &Heap, parent_path: &[usize], loc: &Location) -> Result<Path> {
    let pos = match &loc.key {
        Key::Index(i) => *i,
        Key::Name(name) => {
            let mapping = heap.mapping(loc.parent)?;
            heap.ordered_keys()
                .position_of(loc.parent, mapping, name)
                .ok_or_else(|| Error::bad_path(parent_path, format!("no key {name:?}")))?
        }
    };
    Ok(livegraph_path::child(parent_path, pos))
}
