//! Error types for cityprep.
//!
//! Library crates use [`CityPrepError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all cityprep operations.
#[derive(Debug, thiserror::Error)]
pub enum CityPrepError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// CSV lookup-table parsing error.
    #[error("lookup table error: {0}")]
    Lookup(String),

    /// XML syntax or structure error in a city-model document.
    #[error("citygml error: {message}")]
    CityGml { message: String },

    /// Weather file parsing or serialization error.
    #[error("weather error: {0}")]
    Weather(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad value, invalid date, schema mismatch).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CityPrepError>;

impl CityPrepError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a citygml error from any displayable message.
    pub fn citygml(msg: impl Into<String>) -> Self {
        Self::CityGml {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CityPrepError::config("missing home directory");
        assert_eq!(err.to_string(), "config error: missing home directory");

        let err = CityPrepError::validation("hour 25 out of range");
        assert!(err.to_string().contains("hour 25"));
    }
}
