//! Error types for augur-core

use thiserror::Error;

/// Result type alias for augur-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in augur-core
#[derive(Error, Debug)]
pub enum Error {
    /// Ontology source could not be parsed
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based source line (0 when the input ended early)
        line: usize,
        /// What was expected at that line
        message: String,
    },

    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// IR document lacks a required top-level key
    #[error("IR missing required key: {key}")]
    MissingIrKey {
        /// Name of the absent key
        key: String,
    },

    /// IR document is structurally invalid
    #[error("invalid IR: {message}")]
    InvalidIr {
        /// Description of the structural problem
        message: String,
    },

    /// Version string is not `MAJOR.MINOR.PATCH`
    #[error("invalid semver '{version}'")]
    InvalidSemver {
        /// The offending version string
        version: String,
    },

    /// The builder met a state the validator should have rejected
    #[error("IR build invariant violated: {message}")]
    BuildInvariant {
        /// Description of the violated invariant
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Error::BuildInvariant {
            message: message.into(),
        }
    }
}
