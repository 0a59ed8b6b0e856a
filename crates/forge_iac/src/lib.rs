//! # forge_iac
//!
//! Cloud resource model and provider backends for stackforge.
//!
//! This crate defines the resources a stack can declare, the read-only
//! lookups that run before anything is declared, and the `CloudApi` seam
//! with two implementations.
//!
//! ## Features
//!
//! - Security groups, instances, application load balancers, target groups,
//!   target registrations and listeners as `ResourceSpec` declarations
//! - VPC, subnet, image and certificate lookups with not-found/ambiguous detection
//! - AWS backend on the official SDK, with retry on throttling and dependency violations
//! - In-memory backend that enforces referential constraints, for previews and tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forge_iac::{CloudApi, CloudProvisioner, InMemoryCloud, VpcQuery};
//!
//! # async fn run() -> forge_iac::IacResult<()> {
//! let cloud = InMemoryCloud::new().add_vpc("vpc-1", &[("Name", "custom-default-network")]);
//! let vpc = cloud.find_vpc(&VpcQuery::tagged("Name", "custom-default-network")).await?;
//! assert_eq!(vpc.id, "vpc-1");
//!
//! let provisioner = CloudProvisioner::new(Arc::new(cloud));
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod error;
pub mod lookup;
pub mod memory;
pub mod provider;
pub mod resources;

pub use aws::AwsCloud;
pub use error::{ignore_not_found, IacError, IacResult};
pub use lookup::{
    CertificateQuery, CertificateRef, ImageQuery, ImageRef, NetworkRef, SubnetQuery, SubnetSet,
    Tags, VpcQuery,
};
pub use memory::{CapturedCall, InMemoryCloud};
pub use provider::{CloudApi, CloudBackend, CloudProvisioner};
pub use resources::{
    attrs, InstanceSpec, ListenerAction, ListenerProtocol, ListenerSpec, LoadBalancerSpec,
    LoadBalancerType, RedirectStatus, ResolvedSpec, ResourceSpec, RootVolume, RuleProtocol,
    RuleSource, SecurityGroupSpec, SecurityRule, TargetGroupAttachmentSpec, TargetGroupSpec,
    TargetType, ANYWHERE,
};
