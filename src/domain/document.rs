//! Serialized graph form.
//!
//! Documents use the builder's storage shape: every node carries its kind in
//! `data.nodeType`, its display label in `data.label`, and its attributes as
//! further keys of `data`. Fields the builder keeps for layout (`type`,
//! `position`, edge styling) are ignored on load.
//!
//! Loading starts each node from no attributes at all, so anything a document
//! leaves out shows up as `MissingRequiredAttribute` instead of a default.

use crate::domain::error::StratflowError;
use crate::domain::graph::{Edge, EdgeId, GraphSnapshot, StrategyGraph};
use crate::domain::node::{AttrValue, Node, NodeData, NodeId, NodeKind, LABEL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: NodeId,
    pub data: NodeDataDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDataDocument {
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EdgeId>,
    pub source: NodeId,
    pub target: NodeId,
}

const ASSET_PLACEHOLDER: &str = "Asset/Market Selector";

impl GraphDocument {
    pub fn from_json(text: &str) -> Result<Self, StratflowError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, StratflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes nodes and edges without checking referential integrity.
    ///
    /// Attribute errors and reused node or edge ids fail the load; dangling
    /// edges are left for the validator to report and the compiler to reject.
    pub fn to_snapshot(&self) -> Result<GraphSnapshot, StratflowError> {
        let (nodes, edges) = self.decode()?;
        Ok(GraphSnapshot::assemble(nodes, edges))
    }

    fn decode(&self) -> Result<(Vec<Node>, Vec<Edge>), StratflowError> {
        let nodes = self
            .nodes
            .iter()
            .map(NodeDocument::to_node)
            .collect::<Result<Vec<_>, _>>()?;

        let mut node_ids: HashSet<NodeId> = HashSet::with_capacity(nodes.len());
        if let Some(node) = nodes.iter().find(|n| !node_ids.insert(n.id().clone())) {
            return Err(StratflowError::MalformedGraph {
                reason: format!("duplicate node id '{}'", node.id()),
            });
        }

        let mut used: HashSet<EdgeId> = HashSet::with_capacity(self.edges.len());
        if let Some(id) = self
            .edges
            .iter()
            .filter_map(|e| e.id.as_ref())
            .find(|id| !used.insert((*id).clone()))
        {
            return Err(StratflowError::MalformedGraph {
                reason: format!("duplicate edge id '{}'", id),
            });
        }
        let mut counter = 0u64;
        let edges = self
            .edges
            .iter()
            .map(|e| {
                let id = match &e.id {
                    Some(id) => id.clone(),
                    None => loop {
                        counter += 1;
                        let candidate = EdgeId::new(format!("edge_{}", counter));
                        if used.insert(candidate.clone()) {
                            break candidate;
                        }
                    },
                };
                Edge {
                    id,
                    source: e.source.clone(),
                    target: e.target.clone(),
                }
            })
            .collect();

        Ok((nodes, edges))
    }
}

impl NodeDocument {
    fn to_node(&self) -> Result<Node, StratflowError> {
        let kind = NodeKind::parse(&self.data.node_type).ok_or_else(|| StratflowError::MalformedGraph {
            reason: format!(
                "node '{}' has unknown nodeType '{}'",
                self.id, self.data.node_type
            ),
        })?;

        let mut data = NodeData::empty(kind);
        for (key, value) in &self.data.attributes {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(f) => AttrValue::Number(f),
                    None => return Err(invalid(kind, key, "number out of range")),
                },
                serde_json::Value::String(s) => AttrValue::Text(s.clone()),
                _ => return Err(invalid(kind, key, "expected a string or a number")),
            };
            data.set(key, &value)?;
        }

        // The stored label is derived, except for a bare asset whose label is
        // its literal token.
        let bare_asset = matches!(data, NodeData::Asset { symbol: None, .. });
        if let Some(label) = self
            .data
            .label
            .as_deref()
            .filter(|l| bare_asset && *l != ASSET_PLACEHOLDER)
        {
            if data.set(LABEL, &AttrValue::from(label)).is_err() {
                debug!(node = %self.id, label, "asset label is not a usable token, ignored");
            }
        }

        Ok(Node::new(self.id.clone(), data))
    }

    fn from_node(node: &Node) -> Self {
        let mut attributes: BTreeMap<String, serde_json::Value> = node
            .data()
            .attributes()
            .into_iter()
            .map(|(key, value)| {
                let json = match value {
                    AttrValue::Text(s) => serde_json::Value::String(s),
                    AttrValue::Number(n) => serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null),
                };
                (key, json)
            })
            .collect();
        // `label` is written once, as the display label.
        attributes.remove(LABEL);

        NodeDocument {
            id: node.id().clone(),
            data: NodeDataDocument {
                node_type: node.kind().to_string(),
                label: Some(node.label().to_string()),
                attributes,
            },
        }
    }
}

fn invalid(kind: NodeKind, key: &str, reason: &str) -> StratflowError {
    StratflowError::InvalidAttribute {
        kind: kind.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl StrategyGraph {
    /// Loads a document, rejecting edges that reference missing nodes.
    pub fn from_document(doc: &GraphDocument) -> Result<Self, StratflowError> {
        let (nodes, edges) = doc.decode()?;
        StrategyGraph::from_parts(nodes, edges)
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes().map(NodeDocument::from_node).collect(),
            edges: self
                .edges()
                .iter()
                .map(|e| EdgeDocument {
                    id: Some(e.id.clone()),
                    source: e.source.clone(),
                    target: e.target.clone(),
                })
                .collect(),
        }
    }
}
