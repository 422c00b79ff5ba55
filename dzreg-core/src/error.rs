//! Error types for configuration loading and resource-graph assembly.
//!
//! Nothing in this crate talks to a cloud API, so every error here is raised
//! while reading configuration or while assembling the graph. Apply-time
//! failures belong to the provisioning engine and are never modelled.

use thiserror::Error;

/// Main error type for dzreg operations.
#[derive(Debug, Error)]
pub enum DzRegError {
    /// Configuration value missing or invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A dataset descriptor cannot be turned into resources
    #[error("Invalid dataset '{dataset}': {reason}")]
    InvalidDataset { dataset: String, reason: String },

    /// Two declarations share a logical id
    #[error("Duplicate resource declaration: {id}")]
    DuplicateResource { id: String },

    /// An edge or lookup names a resource that was never declared
    #[error("Unknown resource: {id}")]
    UnknownResource { id: String },

    /// The declared ordering edges cannot be satisfied
    #[error("Dependency cycle detected between: {involved:?}")]
    DependencyCycle { involved: Vec<String> },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file is not valid TOML for the expected shape
    #[error("Failed to parse configuration: {context}")]
    ConfigParse {
        context: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Convenience type alias for Results with DzRegError
pub type Result<T> = std::result::Result<T, DzRegError>;

impl DzRegError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid dataset error
    pub fn invalid_dataset(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDataset {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    /// Creates a duplicate resource error
    pub fn duplicate_resource(id: impl Into<String>) -> Self {
        Self::DuplicateResource { id: id.into() }
    }

    /// Creates an unknown resource error
    pub fn unknown_resource(id: impl Into<String>) -> Self {
        Self::UnknownResource { id: id.into() }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}
