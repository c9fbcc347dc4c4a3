//! Object heap.
//!
//! Every value with identity (mappings, sequences, callables) lives here,
//! indexed by [`ObjId`]. The heap also owns the [`OrderedKeys`] overlay so
//! that an overlay entry can never outlive its mapping: freeing a mapping
//! drops its entry in the same step.
//!
//! Lifetime is explicit. Nothing is freed until [`Heap::collect`] is called
//! with the current roots; it then sweeps every object not reachable from
//! them.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::trace;

use crate::error::{Error, Result};
use crate::ordered_keys::OrderedKeys;
use crate::value::{Callable, Kind, Mapping, ObjId, Object, Value};

#[derive(Debug, Clone)]
pub struct Heap {
    objects: HashMap<ObjId, Object>,
    next_id: u64,
    ordered_keys: OrderedKeys,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: 1,
            ordered_keys: OrderedKeys::new(),
        }
    }

    // ──────────────────────────────────────────────────────────────────────
    // Allocation
    // ──────────────────────────────────────────────────────────────────────

    pub fn alloc(&mut self, object: Object) -> ObjId {
        let id = ObjId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, object);
        id
    }

    pub fn new_mapping<K, I>(&mut self, entries: I) -> ObjId
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut mapping = Mapping::new();
        mapping.entries = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.alloc(Object::Mapping(mapping))
    }

    pub fn new_sequence(&mut self, items: Vec<Value>) -> ObjId {
        self.alloc(Object::Sequence(items))
    }

    pub fn new_callable(&mut self, callable: Callable) -> ObjId {
        self.alloc(Object::Callable(callable))
    }

    /// Build live values from plain JSON. Objects become mappings in key
    /// order, arrays become sequences.
    pub fn alloc_json(&mut self, json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => {
                let items = items.iter().map(|v| self.alloc_json(v)).collect();
                Value::Object(self.new_sequence(items))
            }
            Json::Object(map) => {
                let entries: IndexMap<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.alloc_json(v)))
                    .collect();
                Value::Object(self.new_mapping(entries))
            }
        }
    }

    // ──────────────────────────────────────────────────────────────────────
    // Lookup
    // ──────────────────────────────────────────────────────────────────────

    pub fn get(&self, id: ObjId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object(&self, id: ObjId) -> Result<&Object> {
        self.objects.get(&id).ok_or(Error::Dangling(id))
    }

    pub fn object_mut(&mut self, id: ObjId) -> Result<&mut Object> {
        self.objects.get_mut(&id).ok_or(Error::Dangling(id))
    }

    pub fn mapping(&self, id: ObjId) -> Result<&Mapping> {
        match self.object(id)? {
            Object::Mapping(m) => Ok(m),
            other => Err(mismatch("mapping", other.kind())),
        }
    }

    pub fn mapping_mut(&mut self, id: ObjId) -> Result<&mut Mapping> {
        match self.object_mut(id)? {
            Object::Mapping(m) => Ok(m),
            other => Err(mismatch("mapping", other.kind())),
        }
    }

    pub fn sequence(&self, id: ObjId) -> Result<&Vec<Value>> {
        match self.object(id)? {
            Object::Sequence(items) => Ok(items),
            other => Err(mismatch("sequence", other.kind())),
        }
    }

    pub fn sequence_mut(&mut self, id: ObjId) -> Result<&mut Vec<Value>> {
        match self.object_mut(id)? {
            Object::Sequence(items) => Ok(items),
            other => Err(mismatch("sequence", other.kind())),
        }
    }

    pub fn kind_of(&self, value: &Value) -> Kind {
        match value {
            Value::Object(id) => self.get(*id).map(Object::kind).unwrap_or(Kind::Leaf),
            _ => Kind::Leaf,
        }
    }

    pub fn ordered_keys(&self) -> &OrderedKeys {
        &self.ordered_keys
    }

    /// Keys of a mapping in overlay order.
    pub fn keys(&self, id: ObjId) -> Result<Vec<String>> {
        let mapping = self.mapping(id)?;
        Ok(self.ordered_keys.keys_of(id, mapping).into_owned())
    }

    /// Entries of a mapping in overlay order.
    pub fn entries(&self, id: ObjId) -> Result<Vec<(String, Value)>> {
        let mapping = self.mapping(id)?;
        let keys = self.ordered_keys.keys_of(id, mapping);
        Ok(keys
            .iter()
            .filter_map(|k| mapping.entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    // ──────────────────────────────────────────────────────────────────────
    // Overlay-aware mapping edits
    // ──────────────────────────────────────────────────────────────────────

    /// Force an overlay entry for a mapping and return its order.
    pub fn ensure_order(&mut self, id: ObjId) -> Result<&mut Vec<String>> {
        let mapping = match self.objects.get(&id) {
            Some(Object::Mapping(m)) => m,
            Some(other) => return Err(mismatch("mapping", other.kind())),
            None => return Err(Error::Dangling(id)),
        };
        Ok(self.ordered_keys.ensure(id, mapping))
    }

    /// Insert `key` at position `pos` of the mapping's order. Returns the
    /// final position.
    pub fn insert_entry(&mut self, id: ObjId, key: &str, value: Value, pos: usize) -> Result<usize> {
        let mapping = match self.objects.get_mut(&id) {
            Some(Object::Mapping(m)) => m,
            Some(other) => return Err(mismatch("mapping", other.kind())),
            None => return Err(Error::Dangling(id)),
        };
        let pos = self.ordered_keys.insert_at(id, mapping, key, pos);
        mapping.entries.insert(key.to_string(), value);
        Ok(pos)
    }

    /// Plain property set: overwrite in place or append.
    pub fn set_entry(&mut self, id: ObjId, key: &str, value: Value) -> Result<()> {
        self.ordered_keys.push(id, key);
        self.mapping_mut(id)?.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn delete_entry(&mut self, id: ObjId, key: &str) -> Result<Option<Value>> {
        self.ordered_keys.remove(id, key);
        Ok(self.mapping_mut(id)?.entries.shift_remove(key))
    }

    pub fn rename_entry(&mut self, id: ObjId, old_key: &str, new_key: &str) -> Result<()> {
        let mapping = match self.objects.get_mut(&id) {
            Some(Object::Mapping(m)) => m,
            Some(other) => return Err(mismatch("mapping", other.kind())),
            None => return Err(Error::Dangling(id)),
        };
        self.ordered_keys.rename(id, mapping, old_key, new_key)?;
        if let Some(value) = mapping.entries.shift_remove(old_key) {
            mapping.entries.insert(new_key.to_string(), value);
        }
        Ok(())
    }

    /// Move the entry at position `from` to position `to`.
    pub fn reposition_entry(&mut self, id: ObjId, from: usize, to: usize) -> Result<()> {
        let mapping = match self.objects.get(&id) {
            Some(Object::Mapping(m)) => m,
            Some(other) => return Err(mismatch("mapping", other.kind())),
            None => return Err(Error::Dangling(id)),
        };
        self.ordered_keys.reposition(id, mapping, from, to);
        Ok(())
    }

    // ──────────────────────────────────────────────────────────────────────
    // Lifetime
    // ──────────────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Whether `target` is `value` itself or reachable from it.
    pub fn reaches(&self, value: &Value, target: ObjId) -> bool {
        let mut seen: HashSet<ObjId> = HashSet::new();
        let mut stack: Vec<ObjId> = value.as_object().into_iter().collect();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                stack.extend(object.children());
            }
        }
        false
    }

    /// Free every object not reachable from `roots`. Returns the number of
    /// objects freed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjId>) -> usize {
        let mut marked: HashSet<ObjId> = HashSet::new();
        let mut stack: Vec<ObjId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            if !marked.insert(id) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                stack.extend(object.children());
            }
        }

        let dead: Vec<ObjId> = self
            .objects
            .keys()
            .filter(|id| !marked.contains(id))
            .copied()
            .collect();
        for id in &dead {
            self.free(*id);
        }
        if !dead.is_empty() {
            trace!(freed = dead.len(), live = self.objects.len(), "heap sweep");
        }
        dead.len()
    }

    fn free(&mut self, id: ObjId) {
        self.objects.remove(&id);
        self.ordered_keys.forget(id);
    }
}

fn mismatch(expected: &'static str, actual: Kind) -> Error {
    Error::TypeMismatch {
        expected,
        actual: actual.as_str(),
    }
}
