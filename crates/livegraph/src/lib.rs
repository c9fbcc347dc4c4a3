//! Live object-graph core.
//!
//! A process holds a tree of live values (mappings, sequences, scalars and
//! callables) and lets a remote client read, edit, reorder and browse it.
//! This crate is everything below the wire:
//!
//! | Module              | Role                                                      |
//! |---------------------|-----------------------------------------------------------|
//! | [`value`], [`heap`] | Value model and the arena that owns every object          |
//! | [`ordered_keys`]    | Per-mapping key order independent of storage order        |
//! | [`address`]         | Resolves positional paths against a module root           |
//! | [`serialize`]       | Eager wire rendering                                      |
//! | [`inspect`]         | Handle-tracked lazy rendering and inspection spaces       |
//! | [`mutation`]        | Replace / rename / insert / move / delete                 |
//! | [`descriptor`]      | Change records sent for persistence, and their replay     |
//! | [`expr`]            | Pluggable evaluator for client-supplied value expressions |
//! | [`project`]         | Projects, modules and the process-wide registry           |
//!
//! # Example
//!
//! ```
//! use livegraph::{mutation, address, Heap, Module, Value};
//! use serde_json::json;
//!
//! let mut heap = Heap::new();
//! let root = heap.alloc_json(&json!({"a": [1, 2, 3], "b": {"x": 1, "y": 2}}));
//! let module = Module::new("m", "main", root.as_object().unwrap());
//!
//! let (new_path, log) = mutation::move_entry(&mut heap, &module, &[0, 1], true).unwrap();
//! assert_eq!(new_path, vec![0, 2]);
//! assert_eq!(log.len(), 2);
//! assert_eq!(address::value_at(&heap, module.root, &[0, 2]).unwrap(), Value::Number(2.0));
//! ```

pub mod address;
pub mod descriptor;
pub mod error;
pub mod expr;
pub mod heap;
pub mod inspect;
pub mod literal;
pub mod mutation;
pub mod ordered_keys;
pub mod project;
pub mod serialize;
pub mod state;
pub mod value;

pub use address::{Key, Location};
pub use descriptor::{Change, Descriptor};
pub use error::{Error, Result};
pub use expr::{Evaluator, ExprEvaluator};
pub use heap::Heap;
pub use inspect::{Handle, InspectionSpace, InspectionSpaces};
pub use livegraph_path::Path;
pub use ordered_keys::OrderedKeys;
pub use project::{Module, Project, Registry};
pub use serialize::Serialized;
pub use state::LiveState;
pub use value::{Accessor, Callable, Kind, Mapping, ObjId, Object, RegexLiteral, Supertype, Thrown, Value};
