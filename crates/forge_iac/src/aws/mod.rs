//! AWS backend.
//!
//! Lookups go to EC2 and ACM; resources are created through EC2 and
//! Elastic Load Balancing v2. Deletes are idempotent: a resource that is
//! already gone counts as deleted.

mod acm;
mod ec2;
mod elb;
pub mod error;
mod rollback;
pub mod tags;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use forge_core::Attributes;

use crate::error::IacResult;
use crate::lookup::{
    CertificateQuery, CertificateRef, ImageQuery, ImageRef, NetworkRef, SubnetQuery, SubnetSet,
    VpcQuery,
};
use crate::provider::{CloudApi, CloudBackend};
use crate::resources::{
    InstanceSpec, ListenerSpec, LoadBalancerSpec, SecurityGroupSpec, TargetGroupAttachmentSpec,
    TargetGroupSpec,
};

/// `CloudApi` backed by the AWS SDK.
#[derive(Clone)]
pub struct AwsCloud {
    ec2: aws_sdk_ec2::Client,
    elb: aws_sdk_elasticloadbalancingv2::Client,
    acm: aws_sdk_acm::Client,
    region: String,
}

impl AwsCloud {
    /// Load configuration for `region` and create the service clients.
    ///
    /// Credentials come from the environment, config files or instance
    /// roles, as with any other AWS tool.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_config(&config, region)
    }

    /// Create the clients from an already loaded SDK configuration.
    pub fn from_config(config: &SdkConfig, region: &str) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            elb: aws_sdk_elasticloadbalancingv2::Client::new(config),
            acm: aws_sdk_acm::Client::new(config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl std::fmt::Debug for AwsCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCloud")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CloudApi for AwsCloud {
    fn backend(&self) -> CloudBackend {
        CloudBackend::Aws
    }

    async fn find_vpc(&self, query: &VpcQuery) -> IacResult<NetworkRef> {
        self.describe_vpc(query).await
    }

    async fn find_subnets(&self, query: &SubnetQuery) -> IacResult<SubnetSet> {
        self.describe_subnets(query).await
    }

    async fn find_image(&self, query: &ImageQuery) -> IacResult<ImageRef> {
        self.describe_image(query).await
    }

    async fn find_certificate(&self, query: &CertificateQuery) -> IacResult<CertificateRef> {
        self.list_certificate(query).await
    }

    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec<String>,
    ) -> IacResult<Attributes> {
        self.create_group(spec).await
    }

    async fn delete_security_group(&self, attributes: &Attributes) -> IacResult<()> {
        self.delete_group(attributes).await
    }

    async fn create_instance(&self, spec: &InstanceSpec<String>) -> IacResult<Attributes> {
        self.launch_instance(spec).await
    }

    async fn delete_instance(&self, attributes: &Attributes) -> IacResult<()> {
        self.terminate_instance(attributes).await
    }

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerSpec<String>,
    ) -> IacResult<Attributes> {
        self.create_alb(spec).await
    }

    async fn delete_load_balancer(&self, attributes: &Attributes) -> IacResult<()> {
        self.delete_alb(attributes).await
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec<String>) -> IacResult<Attributes> {
        self.create_tg(spec).await
    }

    async fn delete_target_group(&self, attributes: &Attributes) -> IacResult<()> {
        self.delete_tg(attributes).await
    }

    async fn attach_target(
        &self,
        spec: &TargetGroupAttachmentSpec<String>,
    ) -> IacResult<Attributes> {
        self.register_target(spec).await
    }

    async fn detach_target(&self, attributes: &Attributes) -> IacResult<()> {
        self.deregister_target(attributes).await
    }

    async fn create_listener(&self, spec: &ListenerSpec<String>) -> IacResult<Attributes> {
        self.create_elb_listener(spec).await
    }

    async fn delete_listener(&self, attributes: &Attributes) -> IacResult<()> {
        self.delete_elb_listener(attributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_clients_share_region() {
        let cloud = AwsCloud::new("us-east-2").await;
        assert_eq!(cloud.region(), "us-east-2");
        assert_eq!(cloud.backend(), CloudBackend::Aws);
    }
}
