//! Error types for the provisioning engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A single resource that failed to create or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFailure {
    pub resource: String,
    pub message: String,
}

impl ResourceFailure {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

fn join_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while building or executing a resource graph.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Resource already declared: {0}")]
    DuplicateResource(String),

    #[error("Resource '{resource}' depends on undeclared resource '{dependency}'")]
    UnknownDependency { resource: String, dependency: String },

    #[error("Dependency cycle detected among: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Unresolved output: {resource}.{attribute}")]
    UnresolvedOutput { resource: String, attribute: String },

    #[error("Apply failed: {}", join_failures(.failures))]
    ApplyFailed {
        failures: Vec<ResourceFailure>,
        created: Vec<String>,
    },

    #[error("Destroy failed: {}", join_failures(.failures))]
    DestroyFailed {
        failures: Vec<ResourceFailure>,
        remaining: Vec<String>,
    },

    #[error("Provisioning task aborted: {0}")]
    TaskAborted(String),

    #[error("Invalid stack state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Resources that failed, for apply and destroy failures.
    pub fn failures(&self) -> &[ResourceFailure] {
        match self {
            CoreError::ApplyFailed { failures, .. } | CoreError::DestroyFailed { failures, .. } => {
                failures
            }
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_failed_message_lists_resources() {
        let err = CoreError::ApplyFailed {
            failures: vec![
                ResourceFailure::new("ec2", "quota exceeded"),
                ResourceFailure::new("alb", "access denied"),
            ],
            created: vec!["securityGroup".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "Apply failed: ec2: quota exceeded; alb: access denied"
        );
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_cycle_message() {
        let err = CoreError::CycleDetected(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Dependency cycle detected among: a, b");
        assert!(err.failures().is_empty());
    }
}
