//! Error type shared by configuration loading and model construction.
//!
//! Configuration mistakes carry the offending field path so callers can point
//! at the exact key, e.g. `batteries[libat01].soc_initial`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoptError {
    /// I/O errors (config files, time-series files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// A required configuration field is missing or malformed.
    #[error("Configuration error at '{field}': {message}")]
    Config { field: String, message: String },

    /// A required time-series column is absent.
    #[error("Required field: \"{0}\" missing from input")]
    MissingColumn(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Solver/backend errors
    #[error("Solver error: {0}")]
    Solver(String),

    #[error("{0}")]
    Other(String),
}

impl DoptError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        DoptError::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a missing required key.
    pub fn missing(field: impl Into<String>) -> Self {
        DoptError::config(field, "required field is missing")
    }
}

pub type DoptResult<T> = Result<T, DoptError>;

impl From<anyhow::Error> for DoptError {
    fn from(err: anyhow::Error) -> Self {
        DoptError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for DoptError {
    fn from(err: serde_json::Error) -> Self {
        DoptError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for DoptError {
    fn from(err: serde_yaml::Error) -> Self {
        DoptError::Parse(err.to_string())
    }
}
