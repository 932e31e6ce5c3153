//! Unified error type for network modelling and serialization.
//!
//! [`GritError`] carries one variant per failure family the serialization
//! engine distinguishes, plus the generic I/O, parse and configuration
//! buckets shared with the model.
//!
//! # Example
//!
//! ```
//! use grit_core::{GritError, GritResult};
//!
//! fn check(nominal_v: f64) -> GritResult<()> {
//!     if nominal_v <= 0.0 {
//!         return Err(GritError::Validation("nominal voltage must be positive".into()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(-1.0).is_err());
//! ```

use thiserror::Error;

/// Unified error type for all GRIT operations.
#[derive(Error, Debug)]
pub enum GritError {
    /// I/O errors (file access, pipes, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level decoding errors raised by a codec
    #[error("Parse error: {0}")]
    Parse(String),

    /// Document shape does not match the schema (unknown element, bad magic)
    #[error("Structural error: {0}")]
    Structural(String),

    /// A feature is not supported by the target schema version
    #[error("Version incompatibility: {0}")]
    VersionIncompatibility(String),

    /// Missing extension serializer or unsupported extension version
    #[error("Extension error: {0}")]
    ExtensionResolution(String),

    /// Two selected extensions claim the same namespace URI or prefix
    #[error("Namespace collision: {0}")]
    NamespaceCollision(String),

    /// A deferred reference could not be resolved once the document was read
    #[error("Unresolved reference: {0}")]
    ReferenceResolution(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GritError.
pub type GritResult<T> = Result<T, GritError>;

impl GritError {
    /// True when the error is an I/O failure caused by the other end of a pipe going away.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, GritError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for GritError {
    fn from(err: anyhow::Error) -> Self {
        GritError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for GritError {
    fn from(s: String) -> Self {
        GritError::Other(s)
    }
}

impl From<&str> for GritError {
    fn from(s: &str) -> Self {
        GritError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for GritError {
    fn from(err: serde_json::Error) -> Self {
        GritError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GritError::NamespaceCollision("prefix 'apc' already used".into());
        assert!(err.to_string().contains("Namespace collision"));
        assert!(err.to_string().contains("apc"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GritError = io_err.into();
        assert!(matches!(err, GritError::Io(_)));
        assert!(!err.is_broken_pipe());
    }

    #[test]
    fn test_broken_pipe_detection() {
        let err: GritError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(err.is_broken_pipe());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GritResult<()> {
            Err(GritError::Validation("test".into()))
        }

        fn outer() -> GritResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
