//! # forge_core
//!
//! Provisioning engine for stackforge.
//!
//! This crate models a deployment as a directed acyclic graph of resource
//! declarations and materializes it through a pluggable `Provisioner`.
//!
//! # Architecture
//!
//! - **Graph**: Named declarations with implicit (output reference) and explicit (`depends_on`) edges
//! - **Executor**: Creates resources concurrently as soon as their dependencies are active, and tears them down in reverse
//! - **State**: Persisted record of created resources, outputs and the lifecycle journal
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forge_core::{GraphExecutor, ResourceGraph, ResourceOptions, StackContext};
//!
//! let mut graph = ResourceGraph::new();
//! let sg = graph.declare("securityGroup", sg_spec, ResourceOptions::new())?;
//! let alb = graph.declare("alb", alb_spec(sg.id()), ResourceOptions::new())?;
//! graph.declare("albTargetGroup", tg_spec, ResourceOptions::new().depends_on(&alb))?;
//!
//! let executor = GraphExecutor::new(Arc::new(provisioner));
//! let state = executor.apply(&graph, StackContext::new("web-app", "prod")).await?;
//! ```

pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod graph;
pub mod output;
pub mod provisioner;
pub mod state;

// Re-export main types for convenience
pub use context::StackContext;
pub use error::{CoreError, CoreResult, ResourceFailure};
pub use event::{sequence_of, ApplyEvent, EventJournal, EventKind, NodeState};
pub use executor::GraphExecutor;
pub use graph::{Declaration, GraphNode, ResourceGraph, ResourceHandle, ResourceOptions};
pub use output::{Attributes, Input, OutputRef, ResolvedOutputs};
pub use provisioner::Provisioner;
pub use state::{ExecutionState, ResourceRecord, StackState};
