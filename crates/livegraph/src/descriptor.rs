//! Change descriptors.
//!
//! Every mutation is recorded as one or more [`Descriptor`]s that are sent to
//! the persistence collaborator in order. A move is always recorded as a
//! `delete` followed by an `insert`, so replaying the log reproduces it.

use livegraph_path::{split_last, Path};
use serde_json::{json, Map, Value};

use crate::address::{container_at, parent_and_key_at, Key};
use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::mutation::{insert_into, remove_at, write_at};
use crate::serialize::{materialize, Serialized};
use crate::value::ObjId;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Replace { path: Path, new_value: Serialized },
    Rename { path: Path, new_name: String },
    /// `key` is `None` for sequence inserts.
    Insert {
        path: Path,
        key: Option<String>,
        value: Serialized,
    },
    Delete { path: Path },
}

impl Change {
    pub fn op_name(&self) -> &'static str {
        match self {
            Change::Replace { .. } => "replace",
            Change::Rename { .. } => "rename",
            Change::Insert { .. } => "insert",
            Change::Delete { .. } => "delete",
        }
    }

    pub fn path(&self) -> &[usize] {
        match self {
            Change::Replace { path, .. }
            | Change::Rename { path, .. }
            | Change::Insert { path, .. }
            | Change::Delete { path } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub module_id: String,
    pub change: Change,
}

impl Descriptor {
    pub fn new(module_id: impl Into<String>, change: Change) -> Self {
        Self {
            module_id: module_id.into(),
            change,
        }
    }
}

// ── Serialization ─────────────────────────────────────────────────────────

pub fn to_json(d: &Descriptor) -> Value {
    let mut m = Map::new();
    m.insert("operation".into(), json!(d.change.op_name()));
    m.insert("moduleId".into(), json!(d.module_id));
    m.insert("path".into(), json!(d.change.path()));
    match &d.change {
        Change::Replace { new_value, .. } => {
            m.insert("newValue".into(), new_value.to_json());
        }
        Change::Rename { new_name, .. } => {
            m.insert("newName".into(), json!(new_name));
        }
        Change::Insert { key, value, .. } => {
            m.insert("key".into(), json!(key));
            m.insert("value".into(), value.to_json());
        }
        Change::Delete { .. } => {}
    }
    Value::Object(m)
}

pub fn to_json_log(ds: &[Descriptor]) -> Value {
    Value::Array(ds.iter().map(to_json).collect())
}

// ── Deserialization ───────────────────────────────────────────────────────

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidDescriptor(msg.into())
}

fn decode_path(v: Option<&Value>) -> Result<Path> {
    let items = v
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("path must be an array"))?;
    items
        .iter()
        .map(|step| {
            step.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| invalid("path steps must be non-negative integers"))
        })
        .collect()
}

fn decode_value(v: Option<&Value>, field: &str) -> Result<Serialized> {
    let v = v.ok_or_else(|| invalid(format!("missing '{field}' field")))?;
    serde_json::from_value(v.clone()).map_err(|e| invalid(format!("bad '{field}': {e}")))
}

pub fn from_json(v: &Value) -> Result<Descriptor> {
    let obj = v
        .as_object()
        .ok_or_else(|| invalid("descriptor must be an object"))?;
    let op = obj
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'operation' field"))?;
    let module_id = obj
        .get("moduleId")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'moduleId' field"))?
        .to_string();
    let path = decode_path(obj.get("path"))?;

    let change = match op {
        "replace" => Change::Replace {
            path,
            new_value: decode_value(obj.get("newValue"), "newValue")?,
        },
        "rename" => {
            let new_name = obj
                .get("newName")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("rename requires 'newName'"))?
                .to_string();
            Change::Rename { path, new_name }
        }
        "insert" => {
            let key = match obj.get("key") {
                None | Some(Value::Null) => None,
                Some(Value::String(k)) => Some(k.clone()),
                Some(_) => return Err(invalid("'key' must be a string or null")),
            };
            Change::Insert {
                path,
                key,
                value: decode_value(obj.get("value"), "value")?,
            }
        }
        "delete" => Change::Delete { path },
        other => return Err(invalid(format!("unknown operation: {other}"))),
    };
    Ok(Descriptor { module_id, change })
}

pub fn from_json_log(v: &Value) -> Result<Vec<Descriptor>> {
    v.as_array()
        .ok_or_else(|| invalid("descriptor log must be an array"))?
        .iter()
        .map(from_json)
        .collect()
}

// ── Replay ────────────────────────────────────────────────────────────────

/// Apply `descriptors` in order to the tree under `root`.
pub fn replay(heap: &mut Heap, root: ObjId, descriptors: &[Descriptor]) -> Result<()> {
    for d in descriptors {
        apply(heap, root, &d.change)?;
    }
    Ok(())
}

fn apply(heap: &mut Heap, root: ObjId, change: &Change) -> Result<()> {
    match change {
        Change::Replace { path, new_value } => {
            let loc = parent_and_key_at(heap, root, path)?;
            let value = materialize(heap, new_value)?;
            write_at(heap, &loc, value)
        }
        Change::Rename { path, new_name } => {
            let loc = parent_and_key_at(heap, root, path)?;
            match loc.key {
                Key::Name(old) => heap
                    .rename_entry(loc.parent, &old, new_name)
                    .map_err(|e| e.at_path(path)),
                Key::Index(_) => Err(Error::TypeMismatch {
                    expected: "mapping",
                    actual: "sequence",
                }),
            }
        }
        Change::Insert { path, key, value } => {
            let (parent_path, pos) = split_last(path)?;
            let parent = container_at(heap, root, parent_path)?;
            let value = materialize(heap, value)?;
            insert_into(heap, parent, pos, key.as_deref(), value).map(|_| ())
        }
        Change::Delete { path } => {
            let loc = parent_and_key_at(heap, root, path)?;
            remove_at(heap, &loc).map(|_| ())
        }
    }
}
