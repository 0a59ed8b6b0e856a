//! Persisted stack state.
//!
//! After every apply or destroy the executor writes the stack state as JSON
//! to `<state_dir>/<stack>.json`. The record of created resources is what
//! `destroy` tears down, and what an operator inspects after a failed run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::context::StackContext;
use crate::error::{CoreError, CoreResult};
use crate::event::ApplyEvent;
use crate::graph::{Declaration, GraphNode, ResourceGraph};
use crate::output::{Attributes, ResolvedOutputs};

/// Overall state of a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Nothing applied yet
    Pending,
    /// Apply or destroy in progress
    Running,
    /// Every declared resource is active
    Completed,
    /// At least one resource failed; created resources are still recorded
    Failed,
    /// Every recorded resource was deleted
    Destroyed,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::Pending
    }
}

/// A resource that was created during an apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord<D> {
    pub name: String,
    pub kind: String,
    pub declaration: D,
    pub depends_on: Vec<String>,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
}

/// Persistent stack state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState<D> {
    /// Unique ID of the run that produced this state
    pub run_id: Uuid,
    /// Stack context snapshot
    pub context: StackContext,
    /// Execution state
    pub state: ExecutionState,
    /// Created resources, in creation order
    pub resources: Vec<ResourceRecord<D>>,
    /// Lifecycle journal
    pub events: Vec<ApplyEvent>,
    /// Stack outputs
    pub outputs: BTreeMap<String, String>,
    /// When the run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run completed/failed
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if failed
    pub error: Option<String>,
}

impl<D> StackState<D>
where
    D: Declaration + Serialize + DeserializeOwned,
{
    /// Create an empty state for a new run.
    pub fn new(context: StackContext) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            context,
            state: ExecutionState::Pending,
            resources: Vec::new(),
            events: Vec::new(),
            outputs: BTreeMap::new(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Save the state to disk. A context without a state directory is a no-op.
    pub fn save(&self) -> CoreResult<()> {
        let Some(path) = self.context.state_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        fs::write(&path, json)?;
        debug!("Saved stack state to {:?}", path);
        Ok(())
    }

    /// Load a state file from disk.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceRecord<D>> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Names of recorded resources, in creation order.
    pub fn resource_names(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.name.clone()).collect()
    }

    /// Outputs of every recorded resource.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        let mut outputs = ResolvedOutputs::new();
        for record in &self.resources {
            outputs.insert(record.name.clone(), record.attributes.clone());
        }
        outputs
    }

    /// Rebuild the dependency graph of the recorded resources.
    pub fn graph(&self) -> CoreResult<ResourceGraph<D>> {
        ResourceGraph::from_nodes(
            self.resources
                .iter()
                .map(|r| GraphNode {
                    name: r.name.clone(),
                    declaration: r.declaration.clone(),
                    depends_on: r.depends_on.iter().cloned().collect(),
                })
                .collect(),
        )
    }
}
