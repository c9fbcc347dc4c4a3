//! Error taxonomy for the live graph.
//!
//! Every variant is recoverable: the session layer turns it into a failed
//! response using [`Error::tag`] and [`Error::info`].

use livegraph_path::{Path, PathError};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::inspect::Handle;
use crate::value::ObjId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("Path cannot be empty")]
    EmptyPath,

    #[error("Bad path {path:?}: {reason}")]
    BadPath { path: Path, reason: String },

    #[error("Object/array mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Cannot use {key}: duplicate property name")]
    DuplicateKey { path: Path, key: String },

    #[error("Unknown object id: {0}")]
    UnknownHandle(Handle),

    #[error("Getter threw an exception")]
    GetterThrew { class_name: String, message: String },

    #[error("Evaluation failed: {0}")]
    EvalFailed(String),

    #[error("Cannot serialize objects with non-standard prototype")]
    UnsupportedPrototype,

    #[error("Cannot serialize a cyclic structure")]
    Cycle,

    #[error("Dangling object reference: {0}")]
    Dangling(ObjId),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Cannot add module {id} ({name}): duplicates found")]
    DuplicateModule { id: String, name: String },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn bad_path(path: &[usize], reason: impl Into<String>) -> Self {
        Error::BadPath {
            path: path.to_vec(),
            reason: reason.into(),
        }
    }

    /// Attach `path` to errors raised below the addressing layer, which do
    /// not know where in the tree they happened.
    pub fn at_path(self, path: &[usize]) -> Self {
        match self {
            Error::DuplicateKey { key, .. } => Error::DuplicateKey {
                path: path.to_vec(),
                key,
            },
            other => other,
        }
    }

    /// Wire tag reported in failed responses.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::EmptyPath => "empty_path",
            Error::BadPath { .. } => "bad_path",
            Error::TypeMismatch { .. } => "type_mismatch",
            Error::DuplicateKey { .. } => "duplicate_key",
            Error::UnknownHandle(_) => "unknown_handle",
            Error::GetterThrew { .. } => "getter_threw",
            Error::EvalFailed(_) => "eval_failed",
            Error::UnsupportedPrototype => "unsupported_prototype",
            _ => "generic",
        }
    }

    /// Structured `info` object reported in failed responses. Always carries
    /// a human readable `message`.
    pub fn info(&self) -> Value {
        let mut info = Map::new();
        match self {
            Error::BadPath { path, .. } => {
                info.insert("path".into(), json!(path));
            }
            Error::DuplicateKey { path, key } => {
                info.insert("objPath".into(), json!(path));
                info.insert("duplicatedKey".into(), json!(key));
            }
            Error::UnknownHandle(handle) => {
                info.insert("handle".into(), json!(handle));
            }
            Error::GetterThrew {
                class_name,
                message,
            } => {
                info.insert("excClassName".into(), json!(class_name));
                info.insert("excMessage".into(), json!(message));
            }
            _ => {}
        }
        info.insert("message".into(), json!(self.to_string()));
        Value::Object(info)
    }
}

impl From<PathError> for Error {
    fn from(e: PathError) -> Self {
        match e {
            PathError::NoParent => Error::EmptyPath,
            other => Error::BadPath {
                path: Vec::new(),
                reason: other.to_string(),
            },
        }
    }
}
