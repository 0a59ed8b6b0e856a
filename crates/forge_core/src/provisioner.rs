//! The seam between the engine and whatever actually creates resources.

use std::fmt::Display;

use async_trait::async_trait;

use crate::graph::Declaration;
use crate::output::{Attributes, ResolvedOutputs};

/// Creates and deletes resources on behalf of the executor.
///
/// `create` receives the outputs of every resource that is already active;
/// the executor guarantees that all of the declaration's dependencies are
/// among them.
#[async_trait]
pub trait Provisioner<D: Declaration>: Send + Sync {
    type Error: Display + Send + Sync + 'static;

    /// Create the resource and return its computed attributes.
    async fn create(
        &self,
        name: &str,
        declaration: &D,
        outputs: &ResolvedOutputs,
    ) -> Result<Attributes, Self::Error>;

    /// Delete a previously created resource.
    async fn delete(
        &self,
        name: &str,
        declaration: &D,
        attributes: &Attributes,
    ) -> Result<(), Self::Error>;
}
