//! Resource graph: named declarations connected by dependency edges.
//!
//! A resource's inbound edges are the union of the outputs it references
//! (implicit) and the resources listed in `ResourceOptions::depends_on`
//! (explicit). Resources must be declared after everything they depend on,
//! so a graph built through `declare` is acyclic by construction; graphs
//! rebuilt from persisted state are checked by `topological_order`.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Debug;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::output::OutputRef;

/// A resource description the engine can schedule.
pub trait Declaration: Clone + Debug + Send + Sync + 'static {
    /// Resource type category (e.g. "security_group", "listener").
    fn kind(&self) -> &'static str;

    /// Outputs of other resources this declaration consumes.
    fn references(&self) -> Vec<&OutputRef>;
}

/// Options applied when declaring a resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    /// Resources that must be active before this one is created.
    pub depends_on: Vec<String>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depends_on(mut self, resource: &ResourceHandle) -> Self {
        self.depends_on.push(resource.name().to_string());
        self
    }
}

/// Handle to a declared resource, used to reference its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    name: String,
}

impl ResourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self, attribute: impl Into<String>) -> OutputRef {
        OutputRef::new(self.name.clone(), attribute)
    }

    pub fn id(&self) -> OutputRef {
        self.output("id")
    }

    pub fn arn(&self) -> OutputRef {
        self.output("arn")
    }
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct GraphNode<D> {
    pub name: String,
    pub declaration: D,
    pub depends_on: BTreeSet<String>,
}

/// Directed acyclic graph of resource declarations.
#[derive(Debug, Clone)]
pub struct ResourceGraph<D> {
    nodes: Vec<GraphNode<D>>,
    index: HashMap<String, usize>,
}

impl<D: Declaration> Default for ResourceGraph<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Declaration> ResourceGraph<D> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild a graph from existing nodes (e.g. persisted stack state).
    ///
    /// Unlike `declare`, nodes may appear in any order; edges are checked
    /// once every node is known.
    pub fn from_nodes(nodes: Vec<GraphNode<D>>) -> CoreResult<Self> {
        let mut index = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(CoreError::DuplicateResource(node.name.clone()));
            }
        }
        for node in &nodes {
            if let Some(dep) = node.depends_on.iter().find(|d| !index.contains_key(*d)) {
                return Err(CoreError::UnknownDependency {
                    resource: node.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let graph = Self { nodes, index };
        graph.topological_order()?;
        Ok(graph)
    }

    /// Declare a resource.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        declaration: D,
        options: ResourceOptions,
    ) -> CoreResult<ResourceHandle> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(CoreError::DuplicateResource(name));
        }

        let mut depends_on: BTreeSet<String> = declaration
            .references()
            .into_iter()
            .map(|r| r.resource.clone())
            .collect();
        depends_on.extend(options.depends_on);

        if let Some(dep) = depends_on.iter().find(|d| !self.index.contains_key(*d)) {
            return Err(CoreError::UnknownDependency {
                resource: name,
                dependency: dep.clone(),
            });
        }

        debug!(
            "Declaring {} '{}' (depends on: {:?})",
            declaration.kind(),
            name,
            depends_on
        );

        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(GraphNode {
            name: name.clone(),
            declaration,
            depends_on,
        });

        Ok(ResourceHandle { name })
    }

    pub fn get(&self, name: &str) -> Option<&GraphNode<D>> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[GraphNode<D>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of a resource.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|n| n.depends_on.iter().map(|d| d.as_str()).collect())
            .unwrap_or_default()
    }

    /// Resources with a direct edge to `name`, in declaration order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.contains(name))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// Whether `name` depends on `ancestor`, directly or through other resources.
    pub fn depends_on_transitively(&self, name: &str, ancestor: &str) -> bool {
        let mut stack: Vec<&str> = self.dependencies_of(name);
        let mut seen = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.dependencies_of(current));
            }
        }
        false
    }

    /// Every resource that depends on `name`, directly or transitively.
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let mut result = Vec::new();
        let mut queue: VecDeque<&str> = self.dependents_of(name).into();
        let mut seen = BTreeSet::new();

        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                result.push(current);
                queue.extend(self.dependents_of(current));
            }
        }
        result
    }

    /// Resources ordered so that every dependency precedes its dependents.
    ///
    /// Ties are broken by declaration order.
    pub fn topological_order(&self) -> CoreResult<Vec<&str>> {
        Ok(self.layers()?.into_iter().flatten().collect())
    }

    /// Resources grouped into layers; every resource in a layer depends only
    /// on resources in earlier layers.
    pub fn layers(&self) -> CoreResult<Vec<Vec<&str>>> {
        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.name.as_str(), n.depends_on.len()))
            .collect();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let layer: Vec<&str> = self
                .nodes
                .iter()
                .map(|n| n.name.as_str())
                .filter(|name| remaining.get(name) == Some(&0))
                .collect();

            if layer.is_empty() {
                let mut stuck: Vec<String> = remaining.keys().map(|k| k.to_string()).collect();
                stuck.sort();
                return Err(CoreError::CycleDetected(stuck));
            }

            for name in &layer {
                remaining.remove(name);
                for dependent in self.dependents_of(name) {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                    }
                }
            }
            layers.push(layer);
        }

        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Input;

    #[derive(Debug, Clone)]
    struct Node {
        inputs: Vec<Input>,
    }

    impl Node {
        fn plain() -> Self {
            Self { inputs: Vec::new() }
        }

        fn referencing(outputs: Vec<OutputRef>) -> Self {
            Self {
                inputs: outputs.into_iter().map(Input::from).collect(),
            }
        }
    }

    impl Declaration for Node {
        fn kind(&self) -> &'static str {
            "node"
        }

        fn references(&self) -> Vec<&OutputRef> {
            self.inputs.iter().filter_map(|i| i.output_ref()).collect()
        }
    }

    fn node(name: &str, deps: &[&str]) -> GraphNode<Node> {
        GraphNode {
            name: name.to_string(),
            declaration: Node::plain(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_implicit_and_explicit_edges() {
        let mut graph = ResourceGraph::new();
        let a = graph.declare("a", Node::plain(), ResourceOptions::new()).unwrap();
        let b = graph
            .declare("b", Node::referencing(vec![a.id()]), ResourceOptions::new())
            .unwrap();
        graph
            .declare("c", Node::plain(), ResourceOptions::new().depends_on(&b))
            .unwrap();

        assert_eq!(graph.dependencies_of("b"), vec!["a"]);
        assert_eq!(graph.dependencies_of("c"), vec!["b"]);
        assert_eq!(graph.dependents_of("a"), vec!["b"]);
        assert!(graph.depends_on_transitively("c", "a"));
        assert!(!graph.depends_on_transitively("a", "c"));
        assert_eq!(graph.transitive_dependents("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut graph = ResourceGraph::new();
        graph.declare("a", Node::plain(), ResourceOptions::new()).unwrap();

        let dup = graph.declare("a", Node::plain(), ResourceOptions::new());
        assert!(matches!(dup, Err(CoreError::DuplicateResource(ref n)) if n == "a"));

        let unknown = graph.declare(
            "b",
            Node::referencing(vec![OutputRef::new("missing", "id")]),
            ResourceOptions::new(),
        );
        assert!(matches!(
            unknown,
            Err(CoreError::UnknownDependency { ref dependency, .. }) if dependency == "missing"
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_layers_follow_dependencies() {
        let graph = ResourceGraph::from_nodes(vec![
            node("listener", &["alb", "tg"]),
            node("alb", &["sg"]),
            node("sg", &[]),
            node("tg", &["alb"]),
            node("image", &[]),
        ])
        .unwrap();

        let layers = graph.layers().unwrap();
        assert_eq!(
            layers,
            vec![vec!["sg", "image"], vec!["alb"], vec!["tg"], vec!["listener"]]
        );
        assert_eq!(
            graph.topological_order().unwrap(),
            vec!["sg", "image", "alb", "tg", "listener"]
        );
    }

    #[test]
    fn test_from_nodes_detects_cycle() {
        let result = ResourceGraph::from_nodes(vec![
            node("a", &["b"]),
            node("b", &["a"]),
            node("c", &[]),
        ]);

        match result {
            Err(CoreError::CycleDetected(names)) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("expected cycle, got {:?}", other.map(|g| g.len())),
        }
    }

    #[test]
    fn test_from_nodes_rejects_dangling_edge() {
        let result = ResourceGraph::from_nodes(vec![node("a", &["ghost"])]);
        assert!(matches!(result, Err(CoreError::UnknownDependency { .. })));
    }
}
