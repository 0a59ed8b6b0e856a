//! Cloud provider seam.
//!
//! `CloudApi` is the narrow surface a stack needs from a cloud: four
//! read-only lookups plus create/delete per resource kind. `CloudProvisioner`
//! adapts any `CloudApi` to the engine's `Provisioner` trait.

use std::sync::Arc;

use async_trait::async_trait;
use forge_core::{Attributes, Provisioner, ResolvedOutputs};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IacError, IacResult};
use crate::lookup::{
    CertificateQuery, CertificateRef, ImageQuery, ImageRef, NetworkRef, SubnetQuery, SubnetSet,
    VpcQuery,
};
use crate::resources::{
    InstanceSpec, ListenerSpec, LoadBalancerSpec, ResolvedSpec, ResourceSpec, SecurityGroupSpec,
    TargetGroupAttachmentSpec, TargetGroupSpec,
};

/// Supported cloud backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudBackend {
    Aws,
    /// In-process simulation, used for previews and tests
    Memory,
}

impl Default for CloudBackend {
    fn default() -> Self {
        Self::Aws
    }
}

impl CloudBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudBackend::Aws => "aws",
            CloudBackend::Memory => "memory",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Some(CloudBackend::Aws),
            "memory" => Some(CloudBackend::Memory),
            _ => None,
        }
    }

    /// Get default region for the backend.
    pub fn default_region(&self) -> &'static str {
        "us-east-1"
    }
}

impl std::fmt::Display for CloudBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operations a stack performs against a cloud.
#[async_trait]
pub trait CloudApi: Send + Sync {
    fn backend(&self) -> CloudBackend;

    async fn find_vpc(&self, query: &VpcQuery) -> IacResult<NetworkRef>;
    async fn find_subnets(&self, query: &SubnetQuery) -> IacResult<SubnetSet>;
    async fn find_image(&self, query: &ImageQuery) -> IacResult<ImageRef>;
    async fn find_certificate(&self, query: &CertificateQuery) -> IacResult<CertificateRef>;

    async fn create_security_group(&self, spec: &SecurityGroupSpec<String>)
        -> IacResult<Attributes>;
    async fn delete_security_group(&self, attributes: &Attributes) -> IacResult<()>;

    async fn create_instance(&self, spec: &InstanceSpec<String>) -> IacResult<Attributes>;
    async fn delete_instance(&self, attributes: &Attributes) -> IacResult<()>;

    async fn create_load_balancer(&self, spec: &LoadBalancerSpec<String>)
        -> IacResult<Attributes>;
    async fn delete_load_balancer(&self, attributes: &Attributes) -> IacResult<()>;

    async fn create_target_group(&self, spec: &TargetGroupSpec<String>) -> IacResult<Attributes>;
    async fn delete_target_group(&self, attributes: &Attributes) -> IacResult<()>;

    async fn attach_target(&self, spec: &TargetGroupAttachmentSpec<String>)
        -> IacResult<Attributes>;
    async fn detach_target(&self, attributes: &Attributes) -> IacResult<()>;

    async fn create_listener(&self, spec: &ListenerSpec<String>) -> IacResult<Attributes>;
    async fn delete_listener(&self, attributes: &Attributes) -> IacResult<()>;
}

/// Read a required attribute of a created resource.
pub fn required_attribute<'a>(
    attributes: &'a Attributes,
    resource: &str,
    attribute: &'static str,
) -> IacResult<&'a str> {
    attributes
        .get(attribute)
        .map(|s| s.as_str())
        .ok_or_else(|| IacError::missing(resource, attribute))
}

/// Drives a `CloudApi` from the graph executor.
pub struct CloudProvisioner {
    api: Arc<dyn CloudApi>,
}

impl CloudProvisioner {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn CloudApi> {
        &self.api
    }
}

#[async_trait]
impl Provisioner<ResourceSpec> for CloudProvisioner {
    type Error = IacError;

    async fn create(
        &self,
        name: &str,
        declaration: &ResourceSpec,
        outputs: &ResolvedOutputs,
    ) -> IacResult<Attributes> {
        let resolved = declaration.resolve(outputs)?;
        debug!("Creating {} on {}: {:?}", name, self.api.backend(), resolved);

        match &resolved {
            ResolvedSpec::SecurityGroup(spec) => self.api.create_security_group(spec).await,
            ResolvedSpec::Instance(spec) => self.api.create_instance(spec).await,
            ResolvedSpec::LoadBalancer(spec) => self.api.create_load_balancer(spec).await,
            ResolvedSpec::TargetGroup(spec) => self.api.create_target_group(spec).await,
            ResolvedSpec::TargetGroupAttachment(spec) => self.api.attach_target(spec).await,
            ResolvedSpec::Listener(spec) => self.api.create_listener(spec).await,
        }
    }

    async fn delete(
        &self,
        name: &str,
        declaration: &ResourceSpec,
        attributes: &Attributes,
    ) -> IacResult<()> {
        debug!("Deleting {} on {}", name, self.api.backend());

        match declaration {
            ResourceSpec::SecurityGroup(_) => self.api.delete_security_group(attributes).await,
            ResourceSpec::Instance(_) => self.api.delete_instance(attributes).await,
            ResourceSpec::LoadBalancer(_) => self.api.delete_load_balancer(attributes).await,
            ResourceSpec::TargetGroup(_) => self.api.delete_target_group(attributes).await,
            ResourceSpec::TargetGroupAttachment(_) => self.api.detach_target(attributes).await,
            ResourceSpec::Listener(_) => self.api.delete_listener(attributes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!(CloudBackend::from_str("AWS"), Some(CloudBackend::Aws));
        assert_eq!(CloudBackend::from_str("memory"), Some(CloudBackend::Memory));
        assert_eq!(CloudBackend::from_str("gcp"), None);
        assert_eq!(CloudBackend::default().to_string(), "aws");
    }

    #[test]
    fn test_required_attribute() {
        let attributes = Attributes::from([("arn".to_string(), "arn:tg".to_string())]);
        assert_eq!(
            required_attribute(&attributes, "target group", "arn").unwrap(),
            "arn:tg"
        );
        assert!(matches!(
            required_attribute(&attributes, "target group", "id"),
            Err(IacError::MissingAttribute { attribute: "id", .. })
        ));
    }
}
