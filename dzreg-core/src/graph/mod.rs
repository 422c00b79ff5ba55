//! Typed resource graph with explicit dependency edges.
//!
//! Every declaration made by the component assemblers lands here as a
//! [`Node`]. Relationships between declarations are never implied by
//! declaration order: a property that points at another node produces a
//! [`EdgeKind::Reference`] edge when the node is added, and an explicit
//! depends-on annotation produces an [`EdgeKind::Ordering`] edge. The
//! provisioning adapter (see [`crate::template`]) walks the result.

use crate::error::{DzRegError, Result};
use crate::resources::Resource;
use serde_json::{Value, json};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Identifier of a declaration, unique within one graph.
///
/// Only ASCII alphanumerics are allowed, which keeps ids usable as template
/// logical ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    /// Wraps an already well-formed identifier.
    ///
    /// # Errors
    /// Returns a configuration error when `raw` is empty or contains
    /// anything other than ASCII letters and digits.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DzRegError::configuration(format!(
                "logical id '{}' must be non-empty and alphanumeric",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// Builds an id from free-form parts.
    ///
    /// Each part is split on non-alphanumeric characters and every chunk is
    /// capitalised, so `["sales-eu", "GlueDatabase"]` becomes
    /// `SalesEuGlueDatabase`.
    ///
    /// # Errors
    /// Returns a configuration error when nothing alphanumeric remains.
    pub fn derive(parts: &[&str]) -> Result<Self> {
        let mut id = String::new();
        for chunk in parts
            .iter()
            .flat_map(|part| part.split(|c: char| !c.is_ascii_alphanumeric()))
        {
            let mut chars = chunk.chars();
            if let Some(first) = chars.next() {
                id.push(first.to_ascii_uppercase());
                id.extend(chars);
            }
        }
        Self::new(id)
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A property value that may point at another declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A value known at graph-build time
    Literal(String),
    /// The primary identifier of another node (its name for most kinds)
    Ref(LogicalId),
    /// A named attribute of another node, resolved by the provisioning engine
    GetAtt { id: LogicalId, attribute: String },
}

impl Expr {
    /// Creates a literal value
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a reference to another node
    pub fn reference(id: &LogicalId) -> Self {
        Self::Ref(id.clone())
    }

    /// Creates a reference to the `Arn` attribute of another node
    pub fn arn_of(id: &LogicalId) -> Self {
        Self::GetAtt {
            id: id.clone(),
            attribute: "Arn".to_string(),
        }
    }

    /// The node this value depends on, if any
    pub fn referenced_id(&self) -> Option<&LogicalId> {
        match self {
            Self::Literal(_) => None,
            Self::Ref(id) | Self::GetAtt { id, .. } => Some(id),
        }
    }

    /// The literal value, if the expression is resolved at build time
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Renders the value in template intrinsic-function form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(value) => Value::String(value.clone()),
            Self::Ref(id) => json!({ "Ref": id.as_str() }),
            Self::GetAtt { id, attribute } => json!({ "Fn::GetAtt": [id.as_str(), attribute] }),
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::literal(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Assembler that declared a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    /// Deployment-wide encryption key
    Encryption,
    /// Registration artifact bucket
    Storage,
    /// Catalog-domain roles, registration function and its trigger
    Registration,
    /// Governed-access settings
    Governance,
    /// Per-dataset discovery resources
    Processing,
    /// Resources owned by the top-level assembler itself
    Root,
}

impl Component {
    /// Stable lowercase name used in rendered metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encryption => "encryption",
            Self::Storage => "storage",
            Self::Registration => "registration",
            Self::Governance => "governance",
            Self::Processing => "processing",
            Self::Root => "root",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one node must be applied after another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    /// A property of `from` reads a value of `to`
    Reference,
    /// An explicit depends-on annotation
    Ordering,
}

/// Directed edge: `from` is applied strictly after `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: LogicalId,
    pub to: LogicalId,
    pub kind: EdgeKind,
}

/// A single declaration in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: LogicalId,
    pub component: Component,
    pub resource: Resource,
}

/// Declarations plus the edges that order them.
///
/// Nodes live in a `petgraph` digraph whose edges point from the dependent
/// node to the node it waits for. Node indices follow declaration order,
/// which is also the tie-break of [`ResourceGraph::deployment_order`].
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<Node, EdgeKind>,
    index_map: HashMap<LogicalId, NodeIndex>,
}

impl ResourceGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a resource and records a reference edge for every node its
    /// properties point at.
    ///
    /// # Errors
    /// Returns `DuplicateResource` when `id` is taken and `UnknownResource`
    /// when a property references a node that has not been declared yet.
    pub fn add(
        &mut self,
        component: Component,
        id: LogicalId,
        resource: Resource,
    ) -> Result<LogicalId> {
        if self.index_map.contains_key(&id) {
            return Err(DzRegError::duplicate_resource(id.as_str()));
        }

        let references = resource
            .references()
            .into_iter()
            .map(|target| self.require(target))
            .collect::<Result<BTreeSet<NodeIndex>>>()?;

        tracing::debug!(
            "Declared {} {} ({})",
            resource.type_name(),
            id,
            component
        );

        let idx = self.graph.add_node(Node {
            id: id.clone(),
            component,
            resource,
        });
        self.index_map.insert(id.clone(), idx);
        for target in references {
            self.connect(idx, target, EdgeKind::Reference);
        }
        Ok(id)
    }

    /// Records that `from` must not be applied before `to` exists.
    ///
    /// # Errors
    /// Returns `UnknownResource` if either end is undeclared, or a
    /// configuration error for a self edge.
    pub fn depends_on(&mut self, from: &LogicalId, to: &LogicalId) -> Result<()> {
        let from_idx = self.require(from)?;
        let to_idx = self.require(to)?;
        if from_idx == to_idx {
            return Err(DzRegError::configuration(format!(
                "resource {} cannot depend on itself",
                from
            )));
        }
        self.connect(from_idx, to_idx, EdgeKind::Ordering);
        Ok(())
    }

    /// Orders every node of `component` after `to`.
    ///
    /// # Errors
    /// Returns `UnknownResource` if `to` is undeclared.
    pub fn depend_component_on(&mut self, component: Component, to: &LogicalId) -> Result<()> {
        let to_idx = self.require(to)?;
        let members: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| idx != to_idx && self.graph[idx].component == component)
            .collect();
        for from_idx in members {
            self.connect(from_idx, to_idx, EdgeKind::Ordering);
        }
        Ok(())
    }

    /// Adds an edge unless one of the same kind already joins the pair.
    fn connect(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|edge| *edge.weight() == kind);
        if !exists {
            self.graph.add_edge(from, to, kind);
        }
    }

    fn require(&self, id: &LogicalId) -> Result<NodeIndex> {
        self.index_map
            .get(id)
            .copied()
            .ok_or_else(|| DzRegError::unknown_resource(id.as_str()))
    }

    /// Looks up a node by id
    pub fn get(&self, id: &LogicalId) -> Option<&Node> {
        self.index_map
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Looks up a node by its raw id string
    pub fn find(&self, id: &str) -> Option<&Node> {
        self.nodes().find(|node| node.id.as_str() == id)
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// All edges, sorted
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .graph
            .edge_references()
            .map(|edge| Edge {
                from: self.graph[edge.source()].id.clone(),
                to: self.graph[edge.target()].id.clone(),
                kind: *edge.weight(),
            })
            .collect();
        edges.sort();
        edges
    }

    /// Nodes declared by one component, in declaration order
    pub fn nodes_in(&self, component: Component) -> impl Iterator<Item = &Node> {
        self.nodes().filter(move |node| node.component == component)
    }

    fn outgoing(&self, id: &LogicalId, kind: Option<EdgeKind>) -> BTreeSet<&LogicalId> {
        let Some(&idx) = self.index_map.get(id) else {
            return BTreeSet::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| kind.is_none_or(|kind| *edge.weight() == kind))
            .map(|edge| &self.graph[edge.target()].id)
            .collect()
    }

    /// Every node `id` must follow, regardless of edge kind
    pub fn dependencies_of(&self, id: &LogicalId) -> BTreeSet<&LogicalId> {
        self.outgoing(id, None)
    }

    /// Nodes `id` follows because of explicit depends-on annotations only
    pub fn ordering_dependencies_of(&self, id: &LogicalId) -> BTreeSet<&LogicalId> {
        self.outgoing(id, Some(EdgeKind::Ordering))
    }

    /// Whether an explicit ordering edge `from -> to` exists
    pub fn has_ordering_edge(&self, from: &LogicalId, to: &LogicalId) -> bool {
        match (self.index_map.get(from), self.index_map.get(to)) {
            (Some(&from), Some(&to)) => self
                .graph
                .edges_connecting(from, to)
                .any(|edge| *edge.weight() == EdgeKind::Ordering),
            _ => false,
        }
    }

    /// Number of declared nodes
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether nothing has been declared
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the nodes in an order that satisfies every edge.
    ///
    /// Uses Kahn's algorithm. Ties are broken by declaration order, so the
    /// result is stable for a given graph.
    ///
    /// # Errors
    /// Returns `DependencyCycle` naming every node that could not be placed.
    pub fn deployment_order(&self) -> Result<Vec<&Node>> {
        let node_count = self.graph.node_count();

        // Parallel edges of different kinds between the same pair count once.
        let mut pending: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let waits_on: BTreeSet<NodeIndex> = self
                    .graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .collect();
                (idx, waits_on.len())
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending
            .iter()
            .filter(|(_, waiting)| **waiting == 0)
            .map(|(&idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(node_count);
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(&self.graph[idx]);
            let dependents: BTreeSet<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            for dependent in dependents {
                if let Some(waiting) = pending.get_mut(&dependent) {
                    *waiting = waiting.saturating_sub(1);
                    if *waiting == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        if order.len() != node_count {
            let involved = self
                .graph
                .node_indices()
                .filter(|idx| pending.get(idx).is_some_and(|waiting| *waiting > 0))
                .map(|idx| self.graph[idx].id.to_string())
                .collect();
            return Err(DzRegError::DependencyCycle { involved });
        }

        Ok(order)
    }

    /// Checks that the edges admit a deployment order.
    ///
    /// Edge endpoints are resolved when the edge is recorded, so only cycles
    /// remain to be found here.
    ///
    /// # Errors
    /// Returns `DependencyCycle`.
    pub fn validate(&self) -> Result<()> {
        self.deployment_order().map(|_| ())
    }
}
