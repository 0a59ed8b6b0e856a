//! Error types for the topology builder.

use std::path::PathBuf;

use forge_core::{CoreError, ResourceFailure};
use forge_iac::IacError;
use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can abort a topology run.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{kind} not found: {query}")]
    NotFound { kind: &'static str, query: String },

    #[error("Ambiguous {kind} lookup ({count} matches): {query}")]
    AmbiguousResult {
        kind: &'static str,
        query: String,
        count: usize,
    },

    #[error("Provision error for {resource}: {message}")]
    Provision {
        resource: String,
        message: String,
        /// Resources that were created before the run stopped
        created: Vec<String>,
    },

    #[error("Invalid declaration for {resource}: {message}")]
    InvalidDeclaration { resource: String, message: String },

    #[error("No saved state for stack '{stack}' at {path}")]
    NoState { stack: String, path: PathBuf },

    #[error("Cloud error: {0}")]
    Cloud(IacError),

    #[error("Engine error: {0}")]
    Engine(CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stack settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TopologyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        TopologyError::Configuration(message.into())
    }

    /// Configuration problems, reported before any cloud call.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TopologyError::Configuration(_) | TopologyError::Yaml(_))
    }

    /// A lookup matched nothing or too much.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            TopologyError::NotFound { .. } | TopologyError::AmbiguousResult { .. }
        )
    }

    /// A resource could not be declared, created or deleted.
    pub fn is_provision(&self) -> bool {
        matches!(
            self,
            TopologyError::Provision { .. } | TopologyError::InvalidDeclaration { .. }
        )
    }
}

impl From<IacError> for TopologyError {
    fn from(err: IacError) -> Self {
        match err {
            IacError::NotFound { kind, query } => TopologyError::NotFound { kind, query },
            IacError::Ambiguous { kind, query, count } => {
                TopologyError::AmbiguousResult { kind, query, count }
            }
            other => TopologyError::Cloud(other),
        }
    }
}

fn summarize(failures: &[ResourceFailure]) -> (String, String) {
    let Some((first, rest)) = failures.split_first() else {
        return ("stack".to_string(), "unknown failure".to_string());
    };
    if rest.is_empty() {
        return (first.resource.clone(), first.message.clone());
    }
    let others: Vec<String> = rest.iter().map(|f| f.to_string()).collect();
    (
        first.resource.clone(),
        format!("{} (also failed: {})", first.message, others.join("; ")),
    )
}

impl From<CoreError> for TopologyError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ApplyFailed { failures, created } => {
                let (resource, message) = summarize(&failures);
                TopologyError::Provision {
                    resource,
                    message,
                    created,
                }
            }
            CoreError::DestroyFailed {
                failures,
                remaining,
            } => {
                let (resource, message) = summarize(&failures);
                TopologyError::Provision {
                    resource,
                    message,
                    created: remaining,
                }
            }
            other => TopologyError::Engine(other),
        }
    }
}
