//! Error types for cloud operations.

use thiserror::Error;

/// Result type alias for cloud operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while looking up or provisioning cloud resources.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("{kind} not found: {query}")]
    NotFound { kind: &'static str, query: String },

    #[error("Ambiguous {kind} lookup ({count} matches): {query}")]
    Ambiguous {
        kind: &'static str,
        query: String,
        count: usize,
    },

    #[error("Provision error for {resource}: {message}")]
    Provision { resource: String, message: String },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Missing attribute '{attribute}' on {resource}")]
    MissingAttribute {
        resource: String,
        attribute: &'static str,
    },

    #[error("Resource not ready: {0}")]
    NotReady(String),

    #[error("Resource already exists")]
    AlreadyExists,

    #[error("Rate limit exceeded")]
    Throttled,

    #[error("Resource has dependent objects")]
    DependencyViolation,

    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl IacError {
    pub fn provision(resource: impl Into<String>, message: impl Into<String>) -> Self {
        IacError::Provision {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn missing(resource: impl Into<String>, attribute: &'static str) -> Self {
        IacError::MissingAttribute {
            resource: resource.into(),
            attribute,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, IacError::NotFound { .. })
    }

    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, IacError::AlreadyExists)
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, IacError::Throttled | IacError::DependencyViolation)
    }
}

impl From<forge_core::CoreError> for IacError {
    fn from(err: forge_core::CoreError) -> Self {
        IacError::InvalidReference(err.to_string())
    }
}

/// Treat "not found" as success, for idempotent deletes.
pub fn ignore_not_found<T>(result: IacResult<T>) -> IacResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
