//! Preview of what a run would create.

use std::fmt;

use forge_core::{Declaration, ResourceGraph};
use forge_iac::ResourceSpec;
use serde::{Deserialize, Serialize};

use crate::config::StackConfig;
use crate::error::TopologyResult;
use crate::lookup::ResolvedLookups;

/// One resource of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedResource {
    pub name: String,
    pub kind: String,
    pub depends_on: Vec<String>,
    pub declaration: ResourceSpec,
}

/// Resolved lookups and the resources that would be created, in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub project: String,
    pub environment: String,
    pub region: String,
    pub lookups: ResolvedLookups,
    pub resources: Vec<PlannedResource>,
}

impl Plan {
    pub fn new(
        config: &StackConfig,
        lookups: ResolvedLookups,
        graph: &ResourceGraph<ResourceSpec>,
    ) -> TopologyResult<Self> {
        let mut resources = Vec::with_capacity(graph.len());
        for name in graph.topological_order()? {
            let Some(node) = graph.get(name) else {
                continue;
            };
            resources.push(PlannedResource {
                name: node.name.clone(),
                kind: node.declaration.kind().to_string(),
                depends_on: graph
                    .dependencies_of(name)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                declaration: node.declaration.clone(),
            });
        }

        Ok(Self {
            project: config.project.clone(),
            environment: config.environment.clone(),
            region: config.region.clone(),
            lookups,
            resources,
        })
    }

    pub fn resource(&self, name: &str) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Position of a resource in creation order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.name == name)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Stack {}-{} ({})",
            self.project, self.environment, self.region
        )?;
        writeln!(f, "  vpc:         {}", self.lookups.network.id)?;
        writeln!(f, "  subnets:     {}", self.lookups.subnets.ids.join(", "))?;
        writeln!(f, "  image:       {}", self.lookups.image.id)?;
        writeln!(f, "  certificate: {}", self.lookups.certificate.arn)?;
        writeln!(f)?;
        for resource in &self.resources {
            if resource.depends_on.is_empty() {
                writeln!(f, "  + {} ({})", resource.name, resource.kind)?;
            } else {
                writeln!(
                    f,
                    "  + {} ({}) after {}",
                    resource.name,
                    resource.kind,
                    resource.depends_on.join(", ")
                )?;
            }
        }
        Ok(())
    }
}
