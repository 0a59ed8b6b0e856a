//! # forge_topology
//!
//! Load-balanced single-instance web topology.
//!
//! A run resolves the stack settings, looks up the pre-existing network,
//! public subnets, machine image and TLS certificate, then declares:
//!
//! - a security group open on 22, 80 and 443
//! - one instance in the first public subnet
//! - an internet-facing application load balancer with a target group
//!   holding the instance, an HTTP listener redirecting to HTTPS, and an
//!   HTTPS listener forwarding to the target group
//!
//! The outputs are the public DNS names of the load balancer and the instance.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forge_iac::AwsCloud;
//! use forge_topology::{ConfigSource, TopologyBuilder};
//!
//! let source = ConfigSource::load("forge.prod.yaml")?;
//! let cloud = AwsCloud::new("us-east-1").await;
//! let outputs = TopologyBuilder::new(Arc::new(cloud))
//!     .with_state_dir(".forge/stacks")
//!     .provision(&source, "prod")
//!     .await?;
//! println!("{}", outputs.alb_address);
//! ```

pub mod builder;
pub mod config;
pub mod declare;
pub mod defaults;
pub mod error;
pub mod lookup;
pub mod outputs;
pub mod plan;

pub use builder::{load_state, recorded_outputs, TopologyBuilder, TopologyState};
pub use config::{ConfigSource, StackConfig, PROJECT_KEY, REGION_KEY};
pub use declare::{declare_topology, BalancingHandles, TopologyHandles};
pub use error::{TopologyError, TopologyResult};
pub use lookup::{LookupResolver, ResolvedLookups};
pub use outputs::{StackOutputs, ALB_ADDRESS, EC2_ADDRESS};
pub use plan::{Plan, PlannedResource};
