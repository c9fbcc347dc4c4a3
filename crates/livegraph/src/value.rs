//! Live value model.
//!
//! | Rust type    | Role                                                  |
//! |--------------|-------------------------------------------------------|
//! | [`Value`]    | Any value stored in a container or exposed as a root  |
//! | [`Object`]   | A heap object with identity: mapping/sequence/callable|
//! | [`Mapping`]  | String-keyed entries + accessors + supertype          |
//! | [`Callable`] | Source text plus an optional native body              |
//!
//! Scalars live inline in [`Value`]; everything with identity lives in the
//! [`Heap`](crate::heap::Heap) and is referenced through an [`ObjId`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::heap::Heap;

/// Opaque, stable identity of a heap object. Never reused within a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub(crate) u64);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A regular-expression literal, kept as source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexLiteral {
    pub source: String,
    pub flags: String,
}

impl fmt::Display for RegexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Regex(RegexLiteral),
    Object(ObjId),
}

impl Value {
    pub fn as_object(&self) -> Option<ObjId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjId> for Value {
    fn from(id: ObjId) -> Self {
        Value::Object(id)
    }
}

/// Delegation target of a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supertype {
    /// The plain base mapping type.
    Base,
    /// No delegation at all.
    Null,
    /// Another heap object.
    Object(ObjId),
    /// An exotic host type, by name. Never eagerly serializable.
    Builtin(String),
}

/// A non-enumerable computed property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accessor {
    pub getter: Option<ObjId>,
    pub setter: Option<ObjId>,
}

#[derive(Debug, Clone)]
pub struct Mapping {
    /// Enumerable data entries in native (insertion) order.
    pub entries: IndexMap<String, Value>,
    pub accessors: IndexMap<String, Accessor>,
    pub supertype: Supertype,
}

impl Mapping {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            accessors: IndexMap::new(),
            supertype: Supertype::Base,
        }
    }

    /// Own-property check covering both data entries and accessors.
    pub fn has_own(&self, key: &str) -> bool {
        self.entries.contains_key(key) || self.accessors.contains_key(key)
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::new()
    }
}

/// What a host closure raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    pub class_name: String,
    pub message: String,
}

impl Thrown {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}

/// Native body of a callable. Invoked with the receiver object.
pub type NativeFn = Arc<dyn Fn(&mut Heap, ObjId) -> Result<Value, Thrown> + Send + Sync>;

#[derive(Clone)]
pub struct Callable {
    pub source: String,
    pub body: Option<NativeFn>,
}

impl Callable {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            body: None,
        }
    }

    pub fn native(
        source: impl Into<String>,
        body: impl Fn(&mut Heap, ObjId) -> Result<Value, Thrown> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: source.into(),
            body: Some(Arc::new(body)),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("source", &self.source)
            .field("native", &self.body.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Object {
    Mapping(Mapping),
    Sequence(Vec<Value>),
    Callable(Callable),
}

/// Value classification used by the serializers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Leaf,
    Callable,
    Sequence,
    Mapping,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Leaf => "leaf",
            Kind::Callable => "callable",
            Kind::Sequence => "sequence",
            Kind::Mapping => "mapping",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Kind::Sequence | Kind::Mapping)
    }
}

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Object::Mapping(_) => Kind::Mapping,
            Object::Sequence(_) => Kind::Sequence,
            Object::Callable(_) => Kind::Callable,
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, Object::Callable(_))
    }

    /// Object identities directly referenced by this object.
    pub(crate) fn children(&self) -> Vec<ObjId> {
        match self {
            Object::Mapping(m) => {
                let mut out: Vec<ObjId> = m.entries.values().filter_map(Value::as_object).collect();
                for acc in m.accessors.values() {
                    out.extend(acc.getter);
                    out.extend(acc.setter);
                }
                if let Supertype::Object(id) = m.supertype {
                    out.push(id);
                }
                out
            }
            Object::Sequence(items) => items.iter().filter_map(Value::as_object).collect(),
            Object::Callable(_) => Vec::new(),
        }
    }
}
