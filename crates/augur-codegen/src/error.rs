//! Error types for code generation

use thiserror::Error;

/// Result type for codegen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during code generation
#[derive(Error, Debug)]
pub enum Error {
    /// Parse, config, or IR failure from the core
    #[error(transparent)]
    Core(#[from] augur_core::Error),

    /// The ontology failed semantic validation
    #[error("validation failed ({} errors):\n{}", errors.len(), errors.join("\n"))]
    ValidationFailed {
        /// Every validation error, in order
        errors: Vec<String>,
    },

    /// The stack is declared in the manifest but has no registered generator
    #[error(
        "Stack '{stack_id}' is declared but no generator implementation is registered. Implemented stacks: {}.",
        if implemented.is_empty() { "none".to_string() } else { implemented.join(", ") }
    )]
    StackNotImplemented {
        /// Requested stack
        stack_id: String,
        /// Sorted ids of stacks with a registered generator
        implemented: Vec<String>,
    },

    /// The stack id is not in the manifest at all
    #[error(
        "Unsupported generation stack '{stack_id}'. Supported stack ids: {}. Set generation.stack.id in augur.yaml.",
        supported.join(", ")
    )]
    UnsupportedStack {
        /// Requested stack
        stack_id: String,
        /// Sorted ids of every declared stack
        supported: Vec<String>,
    },

    /// Stack manifest failed validation
    #[error("{message}")]
    InvalidManifest {
        /// Greppable description naming the offending entry
        message: String,
    },

    /// Requested generation target is not known
    #[error("unknown generation target '{target}'. Allowed values: {}.", allowed.join(", "))]
    UnknownTarget {
        /// Requested target
        target: String,
        /// Known targets
        allowed: Vec<String>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn manifest(message: impl Into<String>) -> Self {
        Error::InvalidManifest {
            message: message.into(),
        }
    }
}
