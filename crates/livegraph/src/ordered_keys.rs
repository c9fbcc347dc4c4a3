//! Ordered-key overlay.
//!
//! A side table that gives a mapping an explicit key order independent of
//! its native storage order. An entry is created lazily, seeded from the
//! native order the first time a structural edit needs it; from then on it
//! is the only source of truth for that mapping's order. Entries are keyed by
//! object identity and are dropped by the heap together with their mapping.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::{Mapping, ObjId};

#[derive(Debug, Clone, Default)]
pub struct OrderedKeys {
    entries: HashMap<ObjId, Vec<String>>,
}

impl OrderedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the order for `id`, seeding it from the native order if absent.
    pub fn ensure(&mut self, id: ObjId, mapping: &Mapping) -> &mut Vec<String> {
        self.entries
            .entry(id)
            .or_insert_with(|| mapping.entries.keys().cloned().collect())
    }

    /// Read-only view of the order. Falls back to native order without
    /// creating an entry.
    pub fn keys_of<'a>(&'a self, id: ObjId, mapping: &'a Mapping) -> Cow<'a, [String]> {
        match self.entries.get(&id) {
            Some(keys) => Cow::Borrowed(keys.as_slice()),
            None => Cow::Owned(mapping.entries.keys().cloned().collect()),
        }
    }

    /// The key at position `pos`, if any.
    pub fn key_at<'a>(&'a self, id: ObjId, mapping: &'a Mapping, pos: usize) -> Option<&'a str> {
        match self.entries.get(&id) {
            Some(keys) => keys.get(pos).map(String::as_str),
            None => mapping.entries.get_index(pos).map(|(k, _)| k.as_str()),
        }
    }

    /// The position of `key`, if present.
    pub fn position_of(&self, id: ObjId, mapping: &Mapping, key: &str) -> Option<usize> {
        match self.entries.get(&id) {
            Some(keys) => keys.iter().position(|k| k == key),
            None => mapping.entries.get_index_of(key),
        }
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Place `key` at `pos` (clamped to append). If `key` was already in the
    /// order its old slot is removed after the shift, so the key moves rather
    /// than duplicates. Returns the final position of `key`.
    pub fn insert_at(&mut self, id: ObjId, mapping: &Mapping, key: &str, pos: usize) -> usize {
        let keys = self.ensure(id, mapping);
        let existing = keys.iter().position(|k| k == key);
        let pos = pos.min(keys.len());
        keys.insert(pos, key.to_string());

        match existing {
            Some(idx) if idx < pos => {
                keys.remove(idx);
                pos - 1
            }
            Some(idx) => {
                keys.remove(idx + 1);
                pos
            }
            None => pos,
        }
    }

    /// Remove `key` from the order. No-op if there is no entry yet.
    pub fn remove(&mut self, id: ObjId, key: &str) {
        if let Some(keys) = self.entries.get_mut(&id) {
            if let Some(idx) = keys.iter().position(|k| k == key) {
                keys.remove(idx);
            }
        }
    }

    /// Append `key` if an entry exists and lacks it.
    pub fn push(&mut self, id: ObjId, key: &str) {
        if let Some(keys) = self.entries.get_mut(&id) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    /// Substitute `new_key` for `old_key` at the same position.
    pub fn rename(&mut self, id: ObjId, mapping: &Mapping, old_key: &str, new_key: &str) -> Result<()> {
        if mapping.has_own(new_key) {
            return Err(Error::DuplicateKey {
                path: Vec::new(),
                key: new_key.to_string(),
            });
        }
        let keys = self.ensure(id, mapping);
        let slot = keys
            .iter_mut()
            .find(|k| *k == old_key)
            .ok_or_else(|| Error::bad_path(&[], format!("no key {old_key:?}")))?;
        *slot = new_key.to_string();
        Ok(())
    }

    /// Move the key at `from` to `to` within an existing order.
    pub(crate) fn reposition(&mut self, id: ObjId, mapping: &Mapping, from: usize, to: usize) {
        let keys = self.ensure(id, mapping);
        let key = keys.remove(from);
        keys.insert(to, key);
    }

    /// Drop the entry for a mapping that no longer exists.
    pub fn forget(&mut self, id: ObjId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn mapping(keys: &[&str]) -> Mapping {
        let mut m = Mapping::new();
        for (i, k) in keys.iter().enumerate() {
            m.entries.insert(k.to_string(), Value::Number(i as f64));
        }
        m
    }

    const ID: ObjId = ObjId(1);

    #[test]
    fn test_keys_of_falls_back_without_entry() {
        let m = mapping(&["a", "b"]);
        let ok = OrderedKeys::new();
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["a", "b"]);
        assert!(!ok.contains(ID));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let m = mapping(&["a", "b"]);
        let mut ok = OrderedKeys::new();
        ok.ensure(ID, &m).reverse();
        assert_eq!(ok.ensure(ID, &m).as_slice(), &["b", "a"]);
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_insert_at_new_key() {
        let m = mapping(&["x", "y"]);
        let mut ok = OrderedKeys::new();
        assert_eq!(ok.insert_at(ID, &m, "z", 0), 0);
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["z", "x", "y"]);
    }

    #[test]
    fn test_insert_at_clamps_to_append() {
        let m = mapping(&["x", "y"]);
        let mut ok = OrderedKeys::new();
        assert_eq!(ok.insert_at(ID, &m, "z", 99), 2);
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["x", "y", "z"]);
    }

    #[test]
    fn test_insert_at_existing_key_moves() {
        let m = mapping(&["a", "b", "c", "d"]);
        let mut ok = OrderedKeys::new();
        assert_eq!(ok.insert_at(ID, &m, "a", 3), 2);
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["b", "c", "a", "d"]);
        assert_eq!(ok.insert_at(ID, &m, "d", 0), 0);
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["d", "b", "c", "a"]);
    }

    #[test]
    fn test_remove_without_entry_is_noop() {
        let m = mapping(&["a"]);
        let mut ok = OrderedKeys::new();
        ok.remove(ID, "a");
        assert!(!ok.contains(ID));
        ok.ensure(ID, &m);
        ok.remove(ID, "a");
        assert!(ok.keys_of(ID, &m).is_empty());
    }

    #[test]
    fn test_rename_in_place() {
        let m = mapping(&["a", "b", "c"]);
        let mut ok = OrderedKeys::new();
        ok.rename(ID, &m, "b", "q").unwrap();
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["a", "q", "c"]);
    }

    #[test]
    fn test_rename_duplicate() {
        let m = mapping(&["a", "b"]);
        let mut ok = OrderedKeys::new();
        let err = ok.rename(ID, &m, "a", "b").unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key, .. } if key == "b"));
        assert!(!ok.contains(ID));
    }

    #[test]
    fn test_push_only_with_entry() {
        let m = mapping(&["a"]);
        let mut ok = OrderedKeys::new();
        ok.push(ID, "b");
        assert!(!ok.contains(ID));
        ok.ensure(ID, &m);
        ok.push(ID, "b");
        ok.push(ID, "b");
        assert_eq!(ok.keys_of(ID, &m).as_ref(), &["a", "b"]);
    }

    #[test]
    fn test_forget() {
        let m = mapping(&["a"]);
        let mut ok = OrderedKeys::new();
        ok.ensure(ID, &m);
        assert!(ok.forget(ID));
        assert!(!ok.forget(ID));
        assert!(ok.is_empty());
    }
}
