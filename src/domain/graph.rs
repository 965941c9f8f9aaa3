//! Strategy graph model.
//!
//! `StrategyGraph` is the single mutable owner of a builder session's nodes and
//! edges. Compilation never reads it directly; it works on a `GraphSnapshot`.

use crate::domain::error::StratflowError;
use crate::domain::node::{AttrValue, Node, NodeData, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

/// Edit commands dispatched by the builder UI.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCommand {
    AddNode {
        kind: NodeKind,
        attributes: Vec<(String, AttrValue)>,
    },
    UpdateAttribute {
        node: NodeId,
        key: String,
        value: AttrValue,
    },
    ClearAttribute {
        node: NodeId,
        key: String,
    },
    RemoveNode(NodeId),
    AddEdge {
        source: NodeId,
        target: NodeId,
    },
    RemoveEdge(EdgeId),
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    NodeAdded(NodeId),
    EdgeAdded(EdgeId),
    Updated,
    Removed,
    Reset,
}

#[derive(Debug, Clone, Default)]
pub struct StrategyGraph {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    edges: Vec<Edge>,
    next_node: u64,
    next_edge: u64,
}

impl StrategyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn add_node<K, I>(&mut self, kind: NodeKind, attributes: I) -> Result<NodeId, StratflowError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, AttrValue)>,
    {
        let mut data = NodeData::with_defaults(kind);
        for (key, value) in attributes {
            data.set(key.as_ref(), &value)?;
        }
        let id = self.fresh_node_id();
        self.insert_node(Node::new(id.clone(), data));
        debug!(node = %id, %kind, "node added");
        Ok(id)
    }

    pub fn update_node_attribute(
        &mut self,
        id: &NodeId,
        key: &str,
        value: AttrValue,
    ) -> Result<(), StratflowError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StratflowError::node_not_found(id.as_str()))?;
        node.set_attribute(key, &value)
    }

    pub fn clear_node_attribute(&mut self, id: &NodeId, key: &str) -> Result<(), StratflowError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StratflowError::node_not_found(id.as_str()))?;
        node.clear_attribute(key)
    }

    /// Removes the node and every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(), StratflowError> {
        if self.nodes.remove(id).is_none() {
            return Err(StratflowError::node_not_found(id.as_str()));
        }
        self.order.retain(|n| n != id);
        let before = self.edges.len();
        self.edges.retain(|e| &e.source != id && &e.target != id);
        debug!(node = %id, cascaded = before - self.edges.len(), "node removed");
        Ok(())
    }

    /// Duplicate edges are allowed; the compiler collapses them.
    pub fn add_edge(&mut self, source: &NodeId, target: &NodeId) -> Result<EdgeId, StratflowError> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(StratflowError::UnknownNode {
                    id: endpoint.to_string(),
                });
            }
        }
        let id = self.fresh_edge_id();
        self.edges.push(Edge {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
        });
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Result<(), StratflowError> {
        let pos = self
            .edges
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| StratflowError::edge_not_found(id.as_str()))?;
        self.edges.remove(pos);
        Ok(())
    }

    /// Discards every node and edge. Id counters keep running so stale ids from
    /// the previous session never resolve to new nodes.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.order.clear();
        self.edges.clear();
    }

    pub fn apply(&mut self, command: GraphCommand) -> Result<CommandOutcome, StratflowError> {
        match command {
            GraphCommand::AddNode { kind, attributes } => {
                self.add_node(kind, attributes).map(CommandOutcome::NodeAdded)
            }
            GraphCommand::UpdateAttribute { node, key, value } => {
                self.update_node_attribute(&node, &key, value)?;
                Ok(CommandOutcome::Updated)
            }
            GraphCommand::ClearAttribute { node, key } => {
                self.clear_node_attribute(&node, &key)?;
                Ok(CommandOutcome::Updated)
            }
            GraphCommand::RemoveNode(id) => {
                self.remove_node(&id)?;
                Ok(CommandOutcome::Removed)
            }
            GraphCommand::AddEdge { source, target } => {
                self.add_edge(&source, &target).map(CommandOutcome::EdgeAdded)
            }
            GraphCommand::RemoveEdge(id) => {
                self.remove_edge(&id)?;
                Ok(CommandOutcome::Removed)
            }
            GraphCommand::Reset => {
                self.reset();
                Ok(CommandOutcome::Reset)
            }
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self.nodes().cloned().collect();
        GraphSnapshot::assemble(nodes, self.edges.clone())
    }

    /// Builds a graph from already-identified parts, enforcing referential integrity.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, StratflowError> {
        let mut graph = StrategyGraph::new();
        for node in nodes {
            if graph.nodes.contains_key(node.id()) {
                return Err(StratflowError::MalformedGraph {
                    reason: format!("duplicate node id '{}'", node.id()),
                });
            }
            graph.insert_node(node);
        }
        let mut seen = HashSet::new();
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                if !graph.nodes.contains_key(endpoint) {
                    return Err(StratflowError::MalformedGraph {
                        reason: format!(
                            "edge '{}' references missing node '{}'",
                            edge.id, endpoint
                        ),
                    });
                }
            }
            if !seen.insert(edge.id.clone()) {
                return Err(StratflowError::MalformedGraph {
                    reason: format!("duplicate edge id '{}'", edge.id),
                });
            }
            graph.edges.push(edge);
        }
        Ok(graph)
    }

    fn insert_node(&mut self, node: Node) {
        self.order.push(node.id().clone());
        self.nodes.insert(node.id().clone(), node);
    }

    fn fresh_node_id(&mut self) -> NodeId {
        loop {
            self.next_node += 1;
            let id = NodeId::new(format!("node_{}", self.next_node));
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    fn fresh_edge_id(&mut self) -> EdgeId {
        loop {
            self.next_edge += 1;
            let id = EdgeId::new(format!("edge_{}", self.next_edge));
            if !self.edges.iter().any(|e| e.id == id) {
                return id;
            }
        }
    }
}

/// Read-only copy of a graph with an inbound-edge index.
///
/// A snapshot may also be assembled from an untrusted document, so it does not
/// assume referential integrity; see [`GraphSnapshot::check_integrity`].
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    edges: Vec<Edge>,
    inbound: HashMap<NodeId, Vec<usize>>,
}

impl GraphSnapshot {
    /// Later nodes with an id already seen are dropped from the order so that
    /// every id resolves to exactly one node.
    pub fn assemble(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut map = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());
        for node in nodes {
            if map.contains_key(node.id()) {
                continue;
            }
            order.push(node.id().clone());
            map.insert(node.id().clone(), node);
        }
        let mut inbound: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            inbound.entry(edge.target.clone()).or_default().push(i);
        }
        Self {
            nodes: map,
            order,
            edges,
            inbound,
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges ending at `target`, in insertion order.
    pub fn inbound(&self, target: &NodeId) -> impl Iterator<Item = &Edge> {
        self.inbound
            .get(target)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    pub fn execution_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.kind() == NodeKind::Execution)
    }

    pub fn check_integrity(&self) -> Result<(), StratflowError> {
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(StratflowError::MalformedGraph {
                        reason: format!(
                            "edge '{}' references missing node '{}'",
                            edge.id, endpoint
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
