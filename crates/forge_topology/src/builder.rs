//! Entry points: preview, provision and destroy a stack.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use forge_core::{GraphExecutor, StackContext, StackState};
use forge_iac::{CloudApi, CloudProvisioner, ResourceSpec};
use tracing::{info, warn};

use crate::config::{ConfigSource, StackConfig};
use crate::declare::declare_topology;
use crate::error::{TopologyError, TopologyResult};
use crate::lookup::LookupResolver;
use crate::outputs::StackOutputs;
use crate::plan::Plan;

pub type TopologyState = StackState<ResourceSpec>;

/// Builds the web topology of one stack against a cloud backend.
pub struct TopologyBuilder {
    cloud: Arc<dyn CloudApi>,
    state_dir: Option<PathBuf>,
}

impl TopologyBuilder {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self {
            cloud,
            state_dir: None,
        }
    }

    /// Persist stack state under `dir`.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    fn executor(&self) -> GraphExecutor<ResourceSpec, CloudProvisioner> {
        GraphExecutor::new(Arc::new(CloudProvisioner::new(Arc::clone(&self.cloud))))
    }

    fn context(&self, config: &StackConfig) -> StackContext {
        let context = StackContext::new(&config.project, &config.environment);
        match &self.state_dir {
            Some(dir) => context.with_state_dir(dir),
            None => context,
        }
    }

    /// Resolve lookups and declare the topology without creating anything.
    pub async fn preview(&self, source: &ConfigSource, environment: &str) -> TopologyResult<Plan> {
        let config = StackConfig::resolve(source, environment)?;
        let lookups = LookupResolver::new(Arc::clone(&self.cloud))
            .resolve(&config)
            .await?;
        let (graph, _) = declare_topology(&config, &lookups)?;
        Plan::new(&config, lookups, &graph)
    }

    /// Create the topology and return its outputs.
    ///
    /// Configuration is validated before the first cloud call, and every
    /// lookup must succeed before anything is declared. When a resource
    /// fails, its dependents are skipped and no outputs are produced.
    pub async fn provision(
        &self,
        source: &ConfigSource,
        environment: &str,
    ) -> TopologyResult<StackOutputs> {
        let config = StackConfig::resolve(source, environment)?;
        info!(
            "Provisioning {} in {} ({} backend)",
            config.resource_name(),
            config.region,
            self.cloud.backend()
        );

        self.ensure_not_live(&config.environment)?;

        let lookups = LookupResolver::new(Arc::clone(&self.cloud))
            .resolve(&config)
            .await?;
        let (graph, _) = declare_topology(&config, &lookups)?;

        let mut state = self.executor().apply(&graph, self.context(&config)).await?;

        let outputs = StackOutputs::from_state(&state)?;
        outputs.record(&mut state);
        state.save()?;

        info!(
            "Stack {} ready: alb={} ec2={}",
            config.resource_name(),
            outputs.alb_address,
            outputs.ec2_address
        );
        Ok(outputs)
    }

    /// Load the saved state of a stack.
    pub fn load_state(&self, stack: &str) -> TopologyResult<TopologyState> {
        load_state(self.state_dir()?, stack)
    }

    /// Outputs recorded by the last successful provision of a stack.
    pub fn outputs(&self, stack: &str) -> TopologyResult<StackOutputs> {
        recorded_outputs(self.state_dir()?, stack)
    }

    /// Delete every resource recorded in the stack state.
    pub async fn destroy(&self, stack: &str) -> TopologyResult<TopologyState> {
        let mut state = self.load_state(stack)?;
        if state.resources.is_empty() {
            warn!("Stack {} has no recorded resources", stack);
        }
        self.executor().destroy(&mut state).await?;
        Ok(state)
    }

    /// Refuse to start over a stack whose saved state still records live
    /// resources. A new run would replace that record.
    fn ensure_not_live(&self, stack: &str) -> TopologyResult<()> {
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        match load_state(dir, stack) {
            Ok(state) if !state.resources.is_empty() => Err(TopologyError::configuration(format!(
                "stack '{}' has {} recorded resources ({:?}); destroy it first",
                stack,
                state.resources.len(),
                state.state
            ))),
            Ok(_) | Err(TopologyError::NoState { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn state_dir(&self) -> TopologyResult<&Path> {
        self.state_dir
            .as_deref()
            .ok_or_else(|| TopologyError::configuration("no state directory configured"))
    }
}

/// Load the saved state of `stack` from `state_dir`.
pub fn load_state(state_dir: &Path, stack: &str) -> TopologyResult<TopologyState> {
    let path = state_dir.join(format!("{}.json", stack));
    if !path.exists() {
        return Err(TopologyError::NoState {
            stack: stack.to_string(),
            path,
        });
    }
    Ok(StackState::load(&path)?)
}

/// Outputs recorded in the saved state of `stack`.
///
/// A stack whose last run failed or that was destroyed has none.
pub fn recorded_outputs(state_dir: &Path, stack: &str) -> TopologyResult<StackOutputs> {
    let state = load_state(state_dir, stack)?;
    StackOutputs::recorded(&state).ok_or_else(|| TopologyError::NoState {
        stack: stack.to_string(),
        path: state_dir.join(format!("{}.json", stack)),
    })
}
