//! Error types for AMS

use thiserror::Error;

/// AMS error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parallel arrays (or a buffer and its declared length) disagree in size.
    ///
    /// Raised before any buffer is written.
    #[error("Size mismatch in {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Which argument group disagreed.
        what: &'static str,
        /// Required size.
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },

    /// Computation error (collaborator or device failure)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Operation not available in this build or configuration
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_size_mismatch() {
        let err = Error::SizeMismatch { what: "pack arrays", expected: 2, actual: 3 };
        assert_eq!(err.to_string(), "Size mismatch in pack arrays: expected 2, got 3");
    }

    #[test]
    fn display_unsupported() {
        let err = Error::Unsupported("device broker".into());
        assert!(err.to_string().contains("device broker"));
    }

    #[test]
    fn json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
