//! Positional paths.
//!
//! A [`Path`] names a node in a tree of containers using only positions:
//! each step is the index of an entry inside the container reached by the
//! previous step. For a sequence that is the storage index; for a mapping it
//! is the position of the key in the mapping's key order. An empty path names
//! the root.
//!
//! Paths travel over the wire as plain JSON arrays of integers. This crate
//! also provides a textual form (`/0/2`) used in logs and on the command line.
//!
//! # Example
//!
//! ```
//! use livegraph_path::{parse_path, format_path, split_last, child};
//!
//! let path = parse_path("/1/0").unwrap();
//! assert_eq!(path, vec![1, 0]);
//! assert_eq!(format_path(&path), "/1/0");
//! assert_eq!(split_last(&path).unwrap(), (&[1usize][..], 0));
//! assert_eq!(child(&[1], 3), vec![1, 3]);
//! ```

use thiserror::Error;

pub mod validate;
pub use validate::{validate_path, MAX_PATH_LENGTH};

/// A positional path.
pub type Path = Vec<usize>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("INVALID_INDEX: {0}")]
    InvalidIndex(String),
    #[error("NO_PARENT")]
    NoParent,
    #[error("POINTER_INVALID")]
    PointerInvalid,
    #[error("Path too long")]
    PathTooLong,
}

/// Check if a string is a canonical non-negative integer (no sign, no
/// leading zeros except `"0"` itself).
///
/// ```
/// use livegraph_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("42"));
/// assert!(!is_valid_index("042"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index(""));
/// ```
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|&b| b.is_ascii_digit())
}

/// Parse the textual form of a path.
///
/// The empty string is the root path; otherwise the text must start with
/// `/` and every step must be a canonical index.
pub fn parse_path(text: &str) -> Result<Path, PathError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let rest = text.strip_prefix('/').ok_or(PathError::PointerInvalid)?;
    let mut path = Vec::new();
    for step in rest.split('/') {
        if !is_valid_index(step) {
            return Err(PathError::InvalidIndex(step.to_string()));
        }
        let pos = step
            .parse()
            .map_err(|_| PathError::InvalidIndex(step.to_string()))?;
        path.push(pos);
    }
    validate_path(&path)?;
    Ok(path)
}

/// Format a path into its textual form. The root path formats as `""`.
pub fn format_path(path: &[usize]) -> String {
    let mut out = String::with_capacity(path.len() * 3);
    for pos in path {
        out.push('/');
        out.push_str(&pos.to_string());
    }
    out
}

/// Split a path into its parent path and final position.
pub fn split_last(path: &[usize]) -> Result<(&[usize], usize), PathError> {
    match path.split_last() {
        Some((last, parent)) => Ok((parent, *last)),
        None => Err(PathError::NoParent),
    }
}

/// Extend `parent` by one step.
pub fn child(parent: &[usize], pos: usize) -> Path {
    let mut path = Vec::with_capacity(parent.len() + 1);
    path.extend_from_slice(parent);
    path.push(pos);
    path
}
