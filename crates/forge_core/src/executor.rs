//! Dependency-ordered graph executor.
//!
//! `apply` starts every resource whose dependencies are all active, so
//! independent resources are created concurrently and ordering follows
//! the graph edges rather than declaration order. A failure stops the
//! failed resource's dependents; unrelated branches keep going.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::StackContext;
use crate::error::{CoreError, CoreResult, ResourceFailure};
use crate::event::{EventJournal, EventKind, NodeState};
use crate::graph::{Declaration, ResourceGraph};
use crate::output::{Attributes, ResolvedOutputs};
use crate::provisioner::Provisioner;
use crate::state::{ExecutionState, ResourceRecord, StackState};

type CreateOutcome = (String, Result<Attributes, String>);

/// Executes resource graphs against a provisioner.
pub struct GraphExecutor<D, P> {
    provisioner: Arc<P>,
    _declaration: PhantomData<fn() -> D>,
}

impl<D, P> GraphExecutor<D, P>
where
    D: Declaration + Serialize + DeserializeOwned,
    P: Provisioner<D> + 'static,
{
    /// Create a new executor with the given provisioner.
    pub fn new(provisioner: Arc<P>) -> Self {
        Self {
            provisioner,
            _declaration: PhantomData,
        }
    }

    /// Create every resource in the graph.
    ///
    /// The stack state is persisted when the run finishes, whether it
    /// succeeded or not.
    pub async fn apply(
        &self,
        graph: &ResourceGraph<D>,
        context: StackContext,
    ) -> CoreResult<StackState<D>> {
        let order: Vec<String> = graph
            .topological_order()?
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut state = StackState::new(context);
        state.state = ExecutionState::Running;
        state.started_at = Some(Utc::now());

        info!(
            "Applying stack {}/{} ({} resources, run {})",
            state.context.project,
            state.context.stack,
            order.len(),
            state.run_id
        );

        let mut nodes: HashMap<String, NodeState> = order
            .iter()
            .map(|name| (name.clone(), NodeState::PendingDependencies))
            .collect();
        let mut outputs = ResolvedOutputs::new();
        let mut journal = EventJournal::new();
        let mut failures = Vec::new();
        let mut tasks: JoinSet<CreateOutcome> = JoinSet::new();

        self.start_ready(graph, &order, &mut nodes, &outputs, &mut journal, &mut tasks);

        while let Some(joined) = tasks.join_next().await {
            let (name, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tasks.abort_all();
                    let err = CoreError::TaskAborted(e.to_string());
                    state.state = ExecutionState::Failed;
                    state.events = journal.into_events();
                    state.completed_at = Some(Utc::now());
                    state.error = Some(err.to_string());
                    state.save()?;
                    error!("{}", err);
                    return Err(err);
                }
            };

            match result {
                Ok(attributes) => {
                    info!("Created {}", name);
                    nodes.insert(name.clone(), NodeState::Active);
                    journal.record(&name, EventKind::Created, None);
                    outputs.insert(name.clone(), attributes.clone());

                    if let Some(node) = graph.get(&name) {
                        state.resources.push(ResourceRecord {
                            name: name.clone(),
                            kind: node.declaration.kind().to_string(),
                            declaration: node.declaration.clone(),
                            depends_on: node.depends_on.iter().cloned().collect(),
                            attributes,
                            created_at: Utc::now(),
                        });
                    }
                }
                Err(message) => {
                    error!("Failed to create {}: {}", name, message);
                    nodes.insert(name.clone(), NodeState::Failed);
                    journal.record(&name, EventKind::Failed, Some(message.clone()));

                    for dependent in graph.transitive_dependents(&name) {
                        if nodes.get(dependent) == Some(&NodeState::PendingDependencies) {
                            warn!("Skipping {}: dependency {} failed", dependent, name);
                            nodes.insert(dependent.to_string(), NodeState::Skipped);
                            journal.record(
                                dependent,
                                EventKind::Skipped,
                                Some(format!("dependency '{}' failed", name)),
                            );
                        }
                    }

                    failures.push(ResourceFailure::new(name, message));
                }
            }

            self.start_ready(graph, &order, &mut nodes, &outputs, &mut journal, &mut tasks);
        }

        state.events = journal.into_events();
        state.completed_at = Some(Utc::now());

        if failures.is_empty() {
            state.state = ExecutionState::Completed;
            state.save()?;
            info!(
                "Stack {}/{} applied ({} resources)",
                state.context.project,
                state.context.stack,
                state.resources.len()
            );
            return Ok(state);
        }

        state.state = ExecutionState::Failed;
        let err = CoreError::ApplyFailed {
            failures,
            created: state.resource_names(),
        };
        state.error = Some(err.to_string());
        state.save()?;
        error!("{}", err);
        Err(err)
    }

    /// Start every pending resource whose dependencies are all active.
    fn start_ready(
        &self,
        graph: &ResourceGraph<D>,
        order: &[String],
        nodes: &mut HashMap<String, NodeState>,
        outputs: &ResolvedOutputs,
        journal: &mut EventJournal,
        tasks: &mut JoinSet<CreateOutcome>,
    ) {
        for name in order {
            if nodes.get(name) != Some(&NodeState::PendingDependencies) {
                continue;
            }
            let Some(node) = graph.get(name) else {
                continue;
            };
            let ready = node
                .depends_on
                .iter()
                .all(|dep| nodes.get(dep) == Some(&NodeState::Active));
            if !ready {
                continue;
            }

            debug!("Starting {} '{}'", node.declaration.kind(), name);
            nodes.insert(name.clone(), NodeState::Creating);
            journal.record(name, EventKind::Started, None);

            let provisioner = Arc::clone(&self.provisioner);
            let declaration = node.declaration.clone();
            let resolved = outputs.clone();
            let name = name.clone();

            tasks.spawn(async move {
                let result = provisioner
                    .create(&name, &declaration, &resolved)
                    .await
                    .map_err(|e| e.to_string());
                (name, result)
            });
        }
    }

    /// Delete every recorded resource, dependents before their dependencies.
    ///
    /// Deleted records are removed from `state`. On failure, resources that
    /// the failed one depends on are left in place.
    pub async fn destroy(&self, state: &mut StackState<D>) -> CoreResult<()> {
        let graph = state.graph()?;
        let layers: Vec<Vec<String>> = graph
            .layers()?
            .into_iter()
            .map(|layer| layer.into_iter().map(str::to_string).collect())
            .collect();

        info!(
            "Destroying stack {}/{} ({} resources)",
            state.context.project,
            state.context.stack,
            state.resources.len()
        );

        state.state = ExecutionState::Running;
        let mut journal = EventJournal::resume(std::mem::take(&mut state.events));
        let mut failures = Vec::new();

        for layer in layers.iter().rev() {
            let deletions = layer.iter().filter_map(|name| {
                let record = state.resource(name)?;
                let provisioner = Arc::clone(&self.provisioner);
                Some(async move {
                    debug!("Deleting {} '{}'", record.kind, record.name);
                    let result = provisioner
                        .delete(&record.name, &record.declaration, &record.attributes)
                        .await
                        .map_err(|e| e.to_string());
                    (record.name.clone(), result)
                })
            });

            let results = join_all(deletions).await;
            for (name, result) in results {
                match result {
                    Ok(()) => {
                        info!("Deleted {}", name);
                        journal.record(&name, EventKind::Deleted, None);
                        state.resources.retain(|r| r.name != name);
                    }
                    Err(message) => {
                        error!("Failed to delete {}: {}", name, message);
                        journal.record(&name, EventKind::DeleteFailed, Some(message.clone()));
                        failures.push(ResourceFailure::new(name, message));
                    }
                }
            }

            if !failures.is_empty() {
                break;
            }
        }

        state.events = journal.into_events();
        state.completed_at = Some(Utc::now());

        if failures.is_empty() {
            state.state = ExecutionState::Destroyed;
            state.outputs.clear();
            state.error = None;
            state.save()?;
            info!("Stack {}/{} destroyed", state.context.project, state.context.stack);
            return Ok(());
        }

        state.state = ExecutionState::Failed;
        let err = CoreError::DestroyFailed {
            failures,
            remaining: state.resource_names(),
        };
        state.error = Some(err.to_string());
        state.save()?;
        Err(err)
    }
}
