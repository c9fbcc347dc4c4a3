//! Wire form of values and the eager serializer.
//!
//! [`Serialized`] is shared by both serialization modes: [`serialize`] fills
//! in every `value` recursively and never assigns handles; the lazy inspector
//! in [`crate::inspect`] assigns handles and leaves container values out
//! unless asked to go one level deep.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::inspect::Handle;
use crate::literal::{parse_leaf, render_leaf};
use crate::value::{Callable, Mapping, ObjId, Object, Supertype, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Serialized {
    Leaf {
        value: String,
    },
    Callable {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<Handle>,
        value: String,
    },
    Sequence {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<Handle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Vec<Serialized>>,
    },
    Mapping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle: Option<Handle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<IndexMap<String, Serialized>>,
    },
    /// An accessor property whose value has not been evaluated.
    Unrevealed {
        #[serde(rename = "parentHandle")]
        parent_handle: Handle,
        prop: String,
    },
}

impl Serialized {
    pub fn leaf(value: &Value) -> Option<Self> {
        render_leaf(value).map(|value| Serialized::Leaf { value })
    }

    /// Leaf holding a string literal.
    pub fn string(s: &str) -> Self {
        Serialized::Leaf {
            value: render_leaf(&Value::String(s.to_string())).unwrap_or_default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Serialized::Leaf { .. } => "leaf",
            Serialized::Callable { .. } => "callable",
            Serialized::Sequence { .. } => "sequence",
            Serialized::Mapping { .. } => "mapping",
            Serialized::Unrevealed { .. } => "unrevealed",
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            Serialized::Callable { handle, .. }
            | Serialized::Sequence { handle, .. }
            | Serialized::Mapping { handle, .. } => *handle,
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Placeholder sent in place of values the module marks as untracked.
pub const UNTRACKED_PLACEHOLDER: &str = "new Object()";

pub fn untracked_placeholder() -> Serialized {
    Serialized::string(UNTRACKED_PLACEHOLDER)
}

/// Eagerly serialize `value`, recursing through every container.
///
/// # Errors
///
/// - [`Error::UnsupportedPrototype`] if a mapping delegates to anything other
///   than the base mapping type.
/// - [`Error::Cycle`] if a container contains itself.
pub fn serialize(heap: &Heap, value: &Value) -> Result<Serialized> {
    let mut stack = Vec::new();
    serialize_inner(heap, value, &mut stack)
}

fn serialize_inner(heap: &Heap, value: &Value, stack: &mut Vec<ObjId>) -> Result<Serialized> {
    let id = match value {
        Value::Object(id) => *id,
        scalar => return Ok(Serialized::leaf(scalar).unwrap_or_else(|| Serialized::string(""))),
    };
    if stack.contains(&id) {
        return Err(Error::Cycle);
    }

    stack.push(id);
    let out = match heap.object(id)? {
        Object::Callable(callable) => Serialized::Callable {
            handle: None,
            value: callable.source.clone(),
        },
        Object::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(serialize_inner(heap, item, stack)?);
            }
            Serialized::Sequence {
                handle: None,
                value: Some(out),
            }
        }
        Object::Mapping(mapping) => {
            if mapping.supertype != Supertype::Base {
                return Err(Error::UnsupportedPrototype);
            }
            let mut out = IndexMap::new();
            for key in heap.ordered_keys().keys_of(id, mapping).iter() {
                if let Some(v) = mapping.entries.get(key) {
                    out.insert(key.clone(), serialize_inner(heap, v, stack)?);
                }
            }
            Serialized::Mapping {
                handle: None,
                value: Some(out),
            }
        }
    };
    stack.pop();
    Ok(out)
}

/// Rebuild a live value from its eager wire form.
///
/// Callables come back without a native body.
pub fn materialize(heap: &mut Heap, serialized: &Serialized) -> Result<Value> {
    match serialized {
        Serialized::Leaf { value } => parse_leaf(value),
        Serialized::Callable { value, .. } => {
            Ok(Value::Object(heap.new_callable(Callable::new(value.clone()))))
        }
        Serialized::Sequence { value: Some(items), .. } => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(materialize(heap, item)?);
            }
            Ok(Value::Object(heap.new_sequence(out)))
        }
        Serialized::Mapping { value: Some(entries), .. } => {
            let mut mapping = Mapping::new();
            for (k, v) in entries {
                let v = materialize(heap, v)?;
                mapping.entries.insert(k.clone(), v);
            }
            Ok(Value::Object(heap.alloc(Object::Mapping(mapping))))
        }
        other => Err(Error::InvalidDescriptor(format!(
            "cannot materialize a {} without its value",
            other.kind()
        ))),
    }
}
