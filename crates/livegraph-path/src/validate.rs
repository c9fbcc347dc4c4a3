//! Path validation.

use crate::PathError;

/// Maximum allowed path depth.
pub const MAX_PATH_LENGTH: usize = 256;

/// Validate a path received from a peer.
///
/// # Errors
///
/// Returns [`PathError::PathTooLong`] if the path has more than
/// [`MAX_PATH_LENGTH`] steps.
///
/// # Example
///
/// ```
/// use livegraph_path::validate_path;
///
/// validate_path(&[0, 1, 2]).unwrap();
/// validate_path(&vec![0; 300]).unwrap_err();
/// ```
pub fn validate_path(path: &[usize]) -> Result<(), PathError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(PathError::PathTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_short_path() {
        assert!(validate_path(&[0, 1]).is_ok());
    }

    #[test]
    fn test_validate_long_path() {
        let path: Vec<usize> = (0..300).collect();
        assert!(validate_path(&path).is_err());
    }

    #[test]
    fn test_validate_max_length_path() {
        let path: Vec<usize> = (0..256).collect();
        assert!(validate_path(&path).is_ok());
    }
}
