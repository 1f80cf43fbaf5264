use crate::graph::NodeId;
use crate::value::DataValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use uuid::Uuid;

pub type RunId = Uuid;

/// Per-run execution status of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Running,
    Completed,
    Error,
    Skipped,
}

/// Why a node ended in the Error status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeFailure {
    Runtime { message: String },
    Expression { message: String },
    Cancelled,
}

impl NodeFailure {
    pub fn message(&self) -> String {
        match self {
            NodeFailure::Runtime { message } | NodeFailure::Expression { message } => {
                message.clone()
            }
            NodeFailure::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Recorded status and captured outputs of one node for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub status: NodeStatus,
    /// Output-port id -> captured value with its inferred type tag
    #[serde(default)]
    pub outputs: HashMap<String, DataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
}

impl NodeSnapshot {
    fn idle() -> Self {
        Self {
            status: NodeStatus::Idle,
            outputs: HashMap::new(),
            error: None,
        }
    }
}

/// All node snapshots for a single run. Created fresh per run and
/// superseded by the next run; a finished run's table is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// The original invocation payload of the run's trigger node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<DataValue>,
    pub nodes: HashMap<NodeId, NodeSnapshot>,
}

impl RunSnapshot {
    pub fn new(trigger: Option<DataValue>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            trigger,
            nodes: HashMap::new(),
        }
    }

    pub fn status(&self, node: NodeId) -> NodeStatus {
        self.nodes
            .get(&node)
            .map(|s| s.status)
            .unwrap_or(NodeStatus::Idle)
    }

    pub fn outputs(&self, node: NodeId) -> Option<&HashMap<String, DataValue>> {
        self.nodes.get(&node).map(|s| &s.outputs)
    }

    /// The node's primary data output: `output`, falling back to the
    /// conditional branch ports.
    pub fn data_output(&self, node: NodeId) -> Option<&DataValue> {
        let outputs = self.outputs(node)?;
        outputs
            .get("output")
            .or_else(|| outputs.get("true"))
            .or_else(|| outputs.get("false"))
    }
}

/// Shared handle to the active run's snapshot table.
///
/// Every write holds the lock for the whole mutation, so a downstream
/// reader observes a node's output map only after the full capture.
#[derive(Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<RunSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: RunSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, RunSnapshot> {
        self.inner.read().await
    }

    pub async fn set_status(&self, node: NodeId, status: NodeStatus) {
        let mut guard = self.inner.write().await;
        guard
            .nodes
            .entry(node)
            .or_insert_with(NodeSnapshot::idle)
            .status = status;
    }

    /// Atomically capture a node's full output map and mark it Completed.
    pub async fn record_outputs(&self, node: NodeId, outputs: HashMap<String, DataValue>) {
        let mut guard = self.inner.write().await;
        let entry = guard.nodes.entry(node).or_insert_with(NodeSnapshot::idle);
        entry.outputs = outputs;
        entry.status = NodeStatus::Completed;
    }

    pub async fn record_failure(&self, node: NodeId, failure: NodeFailure) {
        let mut guard = self.inner.write().await;
        let entry = guard.nodes.entry(node).or_insert_with(NodeSnapshot::idle);
        entry.status = NodeStatus::Error;
        entry.error = Some(failure);
    }

    pub async fn mark_skipped(&self, node: NodeId) {
        self.set_status(node, NodeStatus::Skipped).await;
    }

    /// Progressive update of one output port while the node is still
    /// Running. Consumers must treat the value as provisional until the
    /// status becomes Completed.
    pub async fn apply_partial(&self, node: NodeId, port: impl Into<String>, value: DataValue) {
        let mut guard = self.inner.write().await;
        let entry = guard.nodes.entry(node).or_insert_with(NodeSnapshot::idle);
        entry.outputs.insert(port.into(), value);
    }

    /// Copy a node's snapshot from a prior run (partial-run seeding).
    pub async fn seed_from(&self, prior: &RunSnapshot, node: NodeId) {
        if let Some(snapshot) = prior.nodes.get(&node) {
            let mut guard = self.inner.write().await;
            guard.nodes.insert(node, snapshot.clone());
        }
    }

    pub async fn finish(&self) -> RunSnapshot {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::socket_types;

    #[tokio::test]
    async fn output_capture_is_all_or_nothing() {
        let handle = SnapshotHandle::new(RunSnapshot::new(None));
        let node = Uuid::new_v4();

        handle.set_status(node, NodeStatus::Running).await;
        assert_eq!(handle.read().await.status(node), NodeStatus::Running);

        let outputs = HashMap::from([(
            "output".to_string(),
            DataValue::new(socket_types::STRING, "done"),
        )]);
        handle.record_outputs(node, outputs).await;

        let guard = handle.read().await;
        assert_eq!(guard.status(node), NodeStatus::Completed);
        assert!(guard.outputs(node).unwrap().contains_key("output"));
    }

    #[tokio::test]
    async fn partial_values_do_not_advance_status() {
        let handle = SnapshotHandle::new(RunSnapshot::new(None));
        let node = Uuid::new_v4();

        handle.set_status(node, NodeStatus::Running).await;
        handle
            .apply_partial(node, "output", DataValue::new(socket_types::TEXT, "par"))
            .await;

        let guard = handle.read().await;
        assert_eq!(guard.status(node), NodeStatus::Running);
        assert!(guard.outputs(node).unwrap().contains_key("output"));
    }
}
