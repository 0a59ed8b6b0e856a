//! AWS error classification.
//!
//! SDK errors are mapped onto `IacError` by their error code rather than by
//! matching on formatted messages.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};

use crate::error::IacError;

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidPermission.NotFound",
    "InvalidAMIID.NotFound",
    "LoadBalancerNotFound",
    "TargetGroupNotFound",
    "ListenerNotFound",
    "ResourceNotFoundException",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "InvalidPermission.Duplicate",
    "InvalidGroup.Duplicate",
    "DuplicateLoadBalancerName",
    "DuplicateTargetGroupName",
    "DuplicateListener",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Known AWS error codes for resources that are still in use
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "ResourceInUse"];

/// Classify an AWS error by its code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> IacError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => IacError::NotFound {
            kind: "resource",
            query: message,
        },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => IacError::AlreadyExists,
        Some(c) if THROTTLING_CODES.contains(&c) => IacError::Throttled,
        Some(c) if DEPENDENCY_CODES.contains(&c) => IacError::DependencyViolation,
        _ => IacError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an SDK error raised by `operation`.
///
/// Errors without service metadata (timeouts, dispatch failures) keep the
/// full error chain in the message.
pub fn sdk_error<E>(operation: &str, err: &E) -> IacError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = match err.message() {
        Some(m) => format!("{}: {}", operation, m),
        None => format!("{}: {}", operation, DisplayErrorContext(err)),
    };
    classify_aws_error(err.code(), Some(&message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn already_exists_codes() {
        for code in ALREADY_EXISTS_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(
                err.is_already_exists(),
                "Expected AlreadyExists for code: {code}"
            );
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, IacError::Throttled));
        }
    }

    #[test]
    fn dependency_violation() {
        let err = classify_aws_error(Some("DependencyViolation"), Some("ENI attached"));
        assert!(err.is_retryable());
        assert!(matches!(err, IacError::DependencyViolation));

        let err = classify_aws_error(Some("ResourceInUse"), Some("target group in use"));
        assert!(matches!(err, IacError::DependencyViolation));
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, IacError::Sdk { .. }));

        let err2 = classify_aws_error(None, Some("something failed"));
        assert!(matches!(err2, IacError::Sdk { code: None, .. }));
    }
}
