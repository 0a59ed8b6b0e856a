//! Cleanup of half-created resources.
//!
//! Some creates take several calls: the resource exists after the first one,
//! but rule authorization or the readiness wait can still fail. Nothing
//! records a resource whose create returned an error, so the creating call
//! deletes it before reporting the failure.

use std::future::Future;

use tracing::{error, info, warn};

use crate::error::IacResult;

/// Return `result`, deleting the resource first when it is an error.
///
/// The original error is returned even when the cleanup itself fails.
pub(super) async fn or_rollback<T, F, Fut>(
    kind: &'static str,
    id: &str,
    result: IacResult<T>,
    cleanup: F,
) -> IacResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = IacResult<()>>,
{
    let err = match result {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    warn!(kind, id, error = %err, "Creation did not finish, deleting the partial resource");
    match cleanup().await {
        Ok(()) => info!(kind, id, "Partial resource deleted"),
        Err(cleanup_err) => error!(
            kind,
            id,
            error = %cleanup_err,
            "Could not delete the partial resource; remove it manually"
        ),
    }
    Err(err)
}
