use crate::definition::Channel;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type EdgeId = Uuid;

/// Value bound to a constant/hybrid parameter: either a literal or a
/// reference expression resolved at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Literal(Value),
    Expression(String),
}

impl ParamValue {
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            ParamValue::Literal(v) => Some(v),
            ParamValue::Expression(_) => None,
        }
    }
}

/// One node instance in the authoring graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub values: HashMap<String, ParamValue>,
    /// Caller-visible hook identifier for kinds that require one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_id: Option<String>,
    /// Opaque presentation payload (canvas position etc.), pass-through only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<serde_json::Value>,
}

impl FlowNode {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            label: None,
            values: HashMap::new(),
            hook_id: None,
            ui: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values
            .insert(param.into(), ParamValue::Literal(value.into()));
        self
    }

    pub fn with_expression(mut self, param: impl Into<String>, expr: impl Into<String>) -> Self {
        self.values
            .insert(param.into(), ParamValue::Expression(expr.into()));
        self
    }

    /// Display name used by label-based expression lookup
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// One endpoint of an edge: a port on a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: String,
}

impl PortRef {
    pub fn new(node: NodeId, port: impl Into<String>) -> Self {
        Self {
            node,
            port: port.into(),
        }
    }
}

/// Connection between two ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: EdgeId,
    pub source: PortRef,
    pub target: PortRef,
    pub channel: Channel,
}

impl FlowEdge {
    pub fn new(source: PortRef, target: PortRef, channel: Channel) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            channel,
        }
    }
}

/// The authoring graph: plain structural state, serializable losslessly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: FlowNode) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn find_node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: NodeId) -> Option<&mut FlowNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Edges arriving at a node, optionally filtered by channel and port
    pub fn incoming<'a>(
        &'a self,
        node: NodeId,
        channel: Option<Channel>,
        port: Option<&'a str>,
    ) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| {
            e.target.node == node
                && channel.map(|c| e.channel == c).unwrap_or(true)
                && port.map(|p| e.target.port == p).unwrap_or(true)
        })
    }

    /// Edges leaving a node, optionally filtered by channel and port
    pub fn outgoing<'a>(
        &'a self,
        node: NodeId,
        channel: Option<Channel>,
        port: Option<&'a str>,
    ) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| {
            e.source.node == node
                && channel.map(|c| e.channel == c).unwrap_or(true)
                && port.map(|p| e.source.port == p).unwrap_or(true)
        })
    }

    /// Is any edge connected to this port (either endpoint)?
    pub fn port_connected(&self, node: NodeId, port: &str) -> bool {
        self.edges.iter().any(|e| {
            (e.target.node == node && e.target.port == port)
                || (e.source.node == node && e.source.port == port)
        })
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<FlowEdge> {
        let index = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(index))
    }

    /// Display-label -> node-id map for expression resolution. Duplicate
    /// labels resolve to the last node bearing the label.
    pub fn labels(&self) -> HashMap<String, NodeId> {
        let mut labels = HashMap::new();
        for node in &self.nodes {
            if let Some(prior) = labels.insert(node.display_label(), node.id) {
                if prior != node.id {
                    tracing::warn!(
                        label = %node.display_label(),
                        "duplicate node label; label-based expressions may be ambiguous"
                    );
                }
            }
        }
        labels
    }
}
