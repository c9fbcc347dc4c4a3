//! Identity-tracked inspection.
//!
//! An [`InspectionSpace`] maps heap identities to small integer handles with
//! a reference count per handle. The lazy inspector renders containers as
//! bare handle references so a client can walk arbitrarily large or cyclic
//! graphs one level at a time, and releases what it no longer shows.
//!
//! Handles are never reused: `next_handle` only grows, and a handle whose
//! count reaches zero is retired for good.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::serialize::Serialized;
use crate::value::{ObjId, Object, Supertype, Value};

pub type Handle = u64;

/// Key of the synthetic pseudo-property carrying a mapping's supertype.
pub const PROTO_KEY: &str = "__proto";

#[derive(Debug, Clone)]
pub struct InspectionSpace {
    obj2handle: HashMap<ObjId, Handle>,
    handle2obj: HashMap<Handle, ObjId>,
    refcounts: HashMap<Handle, usize>,
    next_handle: Handle,
    no_incr: Option<Handle>,
}

impl Default for InspectionSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectionSpace {
    pub fn new() -> Self {
        Self {
            obj2handle: HashMap::new(),
            handle2obj: HashMap::new(),
            refcounts: HashMap::new(),
            next_handle: 1,
            no_incr: None,
        }
    }

    /// Find or create the handle for `id` and take a reference on it.
    ///
    /// If the pending don't-increment flag names this handle, the flag is
    /// consumed and the count is left alone.
    pub fn ref_handle(&mut self, id: ObjId) -> Handle {
        if let Some(&handle) = self.obj2handle.get(&id) {
            if self.no_incr == Some(handle) {
                self.no_incr = None;
            } else {
                *self.refcounts.entry(handle).or_insert(0) += 1;
            }
            return handle;
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        self.obj2handle.insert(id, handle);
        self.handle2obj.insert(handle, id);
        self.refcounts.insert(handle, 1);
        handle
    }

    /// Drop one reference. The handle is retired when its count reaches 0.
    pub fn release(&mut self, handle: Handle) -> Result<()> {
        let count = self
            .refcounts
            .get_mut(&handle)
            .ok_or(Error::UnknownHandle(handle))?;
        *count -= 1;
        if *count == 0 {
            self.refcounts.remove(&handle);
            if let Some(id) = self.handle2obj.remove(&handle) {
                self.obj2handle.remove(&id);
            }
        }
        Ok(())
    }

    pub fn resolve(&self, handle: Handle) -> Result<ObjId> {
        self.handle2obj
            .get(&handle)
            .copied()
            .ok_or(Error::UnknownHandle(handle))
    }

    pub fn refcount(&self, handle: Handle) -> Option<usize> {
        self.refcounts.get(&handle).copied()
    }

    pub fn handle_of(&self, id: ObjId) -> Option<Handle> {
        self.obj2handle.get(&id).copied()
    }

    /// Identities kept alive by this space.
    pub fn held(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.handle2obj.values().copied()
    }

    pub fn len(&self) -> usize {
        self.handle2obj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handle2obj.is_empty()
    }

    pub(crate) fn set_no_incr(&mut self, handle: Option<Handle>) {
        self.no_incr = handle;
    }
}

/// All inspection spaces of a session, by space id.
#[derive(Debug, Clone, Default)]
pub struct InspectionSpaces {
    spaces: HashMap<String, InspectionSpace>,
}

impl InspectionSpaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// The space named `id`, created on first use.
    pub fn space(&mut self, id: &str) -> &mut InspectionSpace {
        self.spaces.entry(id.to_string()).or_default()
    }

    pub fn get(&self, id: &str) -> Option<&InspectionSpace> {
        self.spaces.get(id)
    }

    /// Like [`space`](Self::space) but never creates one.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut InspectionSpace> {
        self.spaces.get_mut(id)
    }

    /// Remove a space and everything it holds. Returns whether it existed.
    pub fn drop_space(&mut self, id: &str) -> bool {
        self.spaces.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.spaces.clear();
    }

    pub fn held(&self) -> Vec<ObjId> {
        self.spaces.values().flat_map(InspectionSpace::held).collect()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

// ── Lazy rendering ────────────────────────────────────────────────────────

/// Render `value` for browsing.
///
/// Containers come back as a bare handle reference unless `deep` is set, in
/// which case their immediate children are listed shallowly. Accessors are
/// never evaluated here.
pub fn inspect(heap: &Heap, space: &mut InspectionSpace, value: &Value, deep: bool) -> Result<Serialized> {
    let id = match value {
        Value::Object(id) => *id,
        scalar => return Ok(Serialized::leaf(scalar).unwrap_or_else(|| Serialized::string(""))),
    };

    match heap.object(id)? {
        Object::Callable(callable) => Ok(Serialized::Callable {
            handle: Some(space.ref_handle(id)),
            value: callable.source.clone(),
        }),
        Object::Sequence(items) => {
            let handle = Some(space.ref_handle(id));
            if !deep {
                return Ok(Serialized::Sequence { handle, value: None });
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(inspect(heap, space, item, false)?);
            }
            Ok(Serialized::Sequence {
                handle,
                value: Some(out),
            })
        }
        Object::Mapping(mapping) => {
            let handle = space.ref_handle(id);
            if !deep {
                return Ok(Serialized::Mapping {
                    handle: Some(handle),
                    value: None,
                });
            }

            let mut out = IndexMap::new();
            out.insert(PROTO_KEY.to_string(), inspect_supertype(heap, space, &mapping.supertype)?);
            for key in heap.ordered_keys().keys_of(id, mapping).iter() {
                if let Some(v) = mapping.entries.get(key) {
                    out.insert(key.clone(), inspect(heap, space, v, false)?);
                }
            }
            for prop in mapping.accessors.keys() {
                out.insert(
                    prop.clone(),
                    Serialized::Unrevealed {
                        parent_handle: handle,
                        prop: prop.clone(),
                    },
                );
            }
            for (prop, accessor) in &mapping.accessors {
                if let Some(getter) = accessor.getter {
                    out.insert(format!("get {prop}"), inspect(heap, space, &Value::Object(getter), false)?);
                }
                if let Some(setter) = accessor.setter {
                    out.insert(format!("set {prop}"), inspect(heap, space, &Value::Object(setter), false)?);
                }
            }
            Ok(Serialized::Mapping {
                handle: Some(handle),
                value: Some(out),
            })
        }
    }
}

fn inspect_supertype(heap: &Heap, space: &mut InspectionSpace, supertype: &Supertype) -> Result<Serialized> {
    Ok(match supertype {
        Supertype::Base => Serialized::Leaf {
            value: "Object.prototype".to_string(),
        },
        Supertype::Null => Serialized::Leaf {
            value: "null".to_string(),
        },
        Supertype::Object(id) => inspect(heap, space, &Value::Object(*id), false)?,
        Supertype::Builtin(name) => Serialized::Leaf { value: name.clone() },
    })
}

/// Re-render the object behind `handle` one level deep.
///
/// The client already holds `handle`, so the object itself gains no
/// reference; children it has not seen before do.
pub fn inspect_handle(heap: &Heap, space: &mut InspectionSpace, handle: Handle) -> Result<Serialized> {
    let id = space.resolve(handle)?;
    space.set_no_incr(Some(handle));
    let out = inspect(heap, space, &Value::Object(id), true);
    space.set_no_incr(None);
    out
}

/// Evaluate property `prop` of the object behind `parent_handle` and render
/// the result one level deep.
///
/// Lookup walks the supertype chain. Data entries are returned as is; an
/// accessor's getter is invoked with the parent as receiver.
///
/// # Errors
///
/// - [`Error::UnknownHandle`] if `parent_handle` is not live.
/// - [`Error::GetterThrew`] if the getter raised, or if the accessor has no
///   callable getter.
pub fn inspect_getter(
    heap: &mut Heap,
    space: &mut InspectionSpace,
    parent_handle: Handle,
    prop: &str,
) -> Result<Serialized> {
    let parent = space.resolve(parent_handle)?;
    let value = read_property(heap, parent, prop)?;
    inspect(heap, space, &value, true)
}

/// Property read with accessor dispatch. Missing properties read as
/// `undefined`.
pub fn read_property(heap: &mut Heap, receiver: ObjId, prop: &str) -> Result<Value> {
    let mut visited = HashSet::new();
    let mut current = receiver;

    loop {
        if !visited.insert(current) {
            return Ok(Value::Undefined);
        }
        let mapping = match heap.object(current)? {
            Object::Mapping(mapping) => mapping,
            Object::Sequence(items) => return Ok(sequence_property(items, prop)),
            Object::Callable(_) => return Ok(Value::Undefined),
        };
        if let Some(v) = mapping.entries.get(prop) {
            return Ok(v.clone());
        }
        if let Some(accessor) = mapping.accessors.get(prop) {
            let getter = accessor.getter;
            return call_getter(heap, getter, receiver, prop);
        }
        match mapping.supertype {
            Supertype::Object(next) => current = next,
            _ => return Ok(Value::Undefined),
        }
    }
}

fn sequence_property(items: &[Value], prop: &str) -> Value {
    if prop == "length" {
        return Value::Number(items.len() as f64);
    }
    prop.parse::<usize>()
        .ok()
        .and_then(|i| items.get(i).cloned())
        .unwrap_or(Value::Undefined)
}

fn call_getter(heap: &mut Heap, getter: Option<ObjId>, receiver: ObjId, prop: &str) -> Result<Value> {
    let not_callable = || Error::GetterThrew {
        class_name: "TypeError".to_string(),
        message: format!("property {prop:?} has no callable getter"),
    };
    let body = match getter.map(|id| heap.object(id)).transpose()? {
        Some(Object::Callable(callable)) => callable.body.clone().ok_or_else(not_callable)?,
        _ => return Err(not_callable()),
    };
    body(heap, receiver).map_err(|thrown| Error::GetterThrew {
        class_name: thrown.class_name,
        message: thrown.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Accessor, Callable, Thrown};
    use serde_json::json;

    fn with_accessor(heap: &mut Heap, getter: Callable) -> ObjId {
        let root = heap.alloc_json(&json!({"a": 1, "b": [2]})).as_object().unwrap();
        let getter = heap.new_callable(getter);
        heap.mapping_mut(root).unwrap().accessors.insert(
            "size".into(),
            Accessor {
                getter: Some(getter),
                setter: None,
            },
        );
        root
    }

    #[test]
    fn test_ref_handle_is_stable_and_counted() {
        let mut space = InspectionSpace::new();
        let h = space.ref_handle(ObjId(7));
        assert_eq!(space.ref_handle(ObjId(7)), h);
        assert_eq!(space.refcount(h), Some(2));
        assert_ne!(space.ref_handle(ObjId(8)), h);
    }

    #[test]
    fn test_release_retires_handle() {
        let mut space = InspectionSpace::new();
        let h = space.ref_handle(ObjId(1));
        space.release(h).unwrap();
        assert_eq!(space.resolve(h), Err(Error::UnknownHandle(h)));
        assert_eq!(space.release(h), Err(Error::UnknownHandle(h)));
        // Retired handles are not reused.
        assert_ne!(space.ref_handle(ObjId(1)), h);
    }

    #[test]
    fn test_no_incr_flag_consumed_once() {
        let mut space = InspectionSpace::new();
        let h = space.ref_handle(ObjId(1));
        space.set_no_incr(Some(h));
        space.ref_handle(ObjId(1));
        assert_eq!(space.refcount(h), Some(1));
        space.ref_handle(ObjId(1));
        assert_eq!(space.refcount(h), Some(2));
    }

    #[test]
    fn test_shallow_container_is_bare_handle() {
        let mut heap = Heap::new();
        let root = heap.alloc_json(&json!({"a": 1}));
        let mut space = InspectionSpace::new();
        assert_eq!(
            inspect(&heap, &mut space, &root, false).unwrap(),
            Serialized::Mapping {
                handle: Some(1),
                value: None
            }
        );
    }

    #[test]
    fn test_deep_mapping_lists_children_shallowly() {
        let mut heap = Heap::new();
        let root = with_accessor(&mut heap, Callable::new("get size() {}"));
        let mut space = InspectionSpace::new();
        let out = inspect(&heap, &mut space, &Value::Object(root), true).unwrap();
        let Serialized::Mapping { handle: Some(h), value: Some(entries) } = out else {
            panic!("expected deep mapping");
        };
        assert_eq!(
            entries.keys().collect::<Vec<_>>(),
            vec!["__proto", "a", "b", "size", "get size"]
        );
        assert_eq!(entries["__proto"], Serialized::Leaf { value: "Object.prototype".into() });
        assert_eq!(entries["a"], Serialized::Leaf { value: "1".into() });
        assert!(matches!(entries["b"], Serialized::Sequence { handle: Some(_), value: None }));
        assert_eq!(
            entries["size"],
            Serialized::Unrevealed {
                parent_handle: h,
                prop: "size".into()
            }
        );
        assert_eq!(entries["get size"].kind(), "callable");
        assert_eq!(space.refcount(h), Some(1));
    }

    #[test]
    fn test_supertype_rendering() {
        let mut heap = Heap::new();
        let base = heap.new_mapping(Vec::<(String, Value)>::new());
        let child = heap.new_mapping(Vec::<(String, Value)>::new());
        heap.mapping_mut(child).unwrap().supertype = Supertype::Object(base);
        let bare = heap.new_mapping(Vec::<(String, Value)>::new());
        heap.mapping_mut(bare).unwrap().supertype = Supertype::Null;

        let mut space = InspectionSpace::new();
        let proto = |out: Serialized| match out {
            Serialized::Mapping { value: Some(mut v), .. } => v.shift_remove(PROTO_KEY).unwrap(),
            other => panic!("unexpected {other:?}"),
        };
        let p = proto(inspect(&heap, &mut space, &Value::Object(child), true).unwrap());
        assert_eq!(p.handle(), space.handle_of(base));
        let p = proto(inspect(&heap, &mut space, &Value::Object(bare), true).unwrap());
        assert_eq!(p, Serialized::Leaf { value: "null".into() });
    }

    #[test]
    fn test_inspect_handle_does_not_leak_a_ref() {
        let mut heap = Heap::new();
        let root = heap.alloc_json(&json!([{"x": 1}]));
        let mut space = InspectionSpace::new();
        let h = inspect(&heap, &mut space, &root, false).unwrap().handle().unwrap();
        inspect_handle(&heap, &mut space, h).unwrap();
        inspect_handle(&heap, &mut space, h).unwrap();
        assert_eq!(space.refcount(h), Some(1));
        // The child was referenced by each deep rendering.
        let child = heap.sequence(root.as_object().unwrap()).unwrap()[0].as_object().unwrap();
        assert_eq!(space.refcount(space.handle_of(child).unwrap()), Some(2));
    }

    #[test]
    fn test_getter_value_is_evaluated_on_request() {
        let mut heap = Heap::new();
        let root = with_accessor(
            &mut heap,
            Callable::native("get size() { return 2; }", |heap, this| {
                Ok(Value::Number(heap.keys(this).map(|k| k.len()).unwrap_or(0) as f64))
            }),
        );
        let mut space = InspectionSpace::new();
        let h = space.ref_handle(root);
        assert_eq!(
            inspect_getter(&mut heap, &mut space, h, "size").unwrap(),
            Serialized::Leaf { value: "2".into() }
        );
        assert_eq!(
            inspect_getter(&mut heap, &mut space, h, "a").unwrap(),
            Serialized::Leaf { value: "1".into() }
        );
        assert_eq!(
            inspect_getter(&mut heap, &mut space, h, "missing").unwrap(),
            Serialized::Leaf { value: "undefined".into() }
        );
    }

    #[test]
    fn test_getter_throw_is_typed() {
        let mut heap = Heap::new();
        let root = with_accessor(
            &mut heap,
            Callable::native("get size() { throw new RangeError('no'); }", |_, _| {
                Err(Thrown::new("RangeError", "no"))
            }),
        );
        let mut space = InspectionSpace::new();
        let h = space.ref_handle(root);
        assert_eq!(
            inspect_getter(&mut heap, &mut space, h, "size"),
            Err(Error::GetterThrew {
                class_name: "RangeError".into(),
                message: "no".into()
            })
        );
    }

    #[test]
    fn test_getter_without_body_is_type_error() {
        let mut heap = Heap::new();
        let root = with_accessor(&mut heap, Callable::new("get size() {}"));
        let mut space = InspectionSpace::new();
        let h = space.ref_handle(root);
        let err = inspect_getter(&mut heap, &mut space, h, "size").unwrap_err();
        assert!(matches!(err, Error::GetterThrew { ref class_name, .. } if class_name == "TypeError"));
    }

    #[test]
    fn test_getter_found_on_supertype() {
        let mut heap = Heap::new();
        let proto = with_accessor(
            &mut heap,
            Callable::native("get size() {}", |_, _| Ok(Value::from("inherited"))),
        );
        let child = heap.new_mapping(Vec::<(String, Value)>::new());
        heap.mapping_mut(child).unwrap().supertype = Supertype::Object(proto);
        assert_eq!(read_property(&mut heap, child, "size").unwrap(), Value::from("inherited"));
    }

    #[test]
    fn test_spaces_registry() {
        let mut spaces = InspectionSpaces::new();
        spaces.space("repl").ref_handle(ObjId(3));
        assert_eq!(spaces.held(), vec![ObjId(3)]);
        assert!(spaces.drop_space("repl"));
        assert!(!spaces.drop_space("repl"));
        assert!(spaces.held().is_empty());
    }
}
