use crate::error::NodeError;
use crate::events::EventEmitter;
use crate::graph::NodeId;
use crate::snapshot::SnapshotHandle;
use crate::value::{DataValue, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// One materialized structural contribution: what a provider node yields
/// when its link-channel output is resolved during the build phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub provider: NodeId,
    /// Capability classification (e.g. "tool", "agent")
    pub kind: String,
    pub payload: Value,
}

/// Frozen result of the build phase: (consumer node, port) -> ordered
/// capabilities resolved from its link-channel providers.
pub type CapabilityMap = HashMap<NodeId, HashMap<String, Vec<Capability>>>;

/// Runtime contract every node kind supplies.
///
/// The engine only assembles inputs and tracks outputs; what a kind
/// actually does (model call, code eval) lives behind this trait.
#[async_trait]
pub trait Behavior: Send + Sync {
    /// Kind id this behavior implements
    fn kind(&self) -> &str;

    /// Flow-phase execution: given resolved inputs and field values,
    /// return a mapping of output-port id to value. Structural-only
    /// kinds never get called here.
    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let _ = ctx;
        Err(NodeError::NotExecutable(self.kind().to_string()))
    }

    /// Build-phase contribution: resolve this node into a capability for
    /// a consuming link port. Flow-only kinds never get called here.
    async fn materialize(&self, ctx: MaterializeContext) -> Result<Capability, NodeError> {
        let _ = ctx;
        Err(NodeError::NotStructural(self.kind().to_string()))
    }
}

/// Execution context passed to a behavior during the flow phase
pub struct BehaviorContext {
    pub node_id: NodeId,
    /// Values gathered from connected flow ports, already coerced
    pub inputs: HashMap<String, DataValue>,
    /// Resolved constant/hybrid field values (expressions evaluated)
    pub values: HashMap<String, Value>,
    /// Link capabilities attached to this node, keyed by port
    pub capabilities: HashMap<String, Vec<Capability>>,
    /// The run's trigger payload
    pub trigger: Option<DataValue>,
    pub events: EventEmitter,
    pub cancellation: CancellationToken,
    snapshot: SnapshotHandle,
}

impl BehaviorContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: NodeId,
        inputs: HashMap<String, DataValue>,
        values: HashMap<String, Value>,
        capabilities: HashMap<String, Vec<Capability>>,
        trigger: Option<DataValue>,
        events: EventEmitter,
        cancellation: CancellationToken,
        snapshot: SnapshotHandle,
    ) -> Self {
        Self {
            node_id,
            inputs,
            values,
            capabilities,
            trigger,
            events,
            cancellation,
            snapshot,
        }
    }

    /// Get required input or return error
    pub fn require_input(&self, port: &str) -> Result<&DataValue, NodeError> {
        self.inputs
            .get(port)
            .ok_or_else(|| NodeError::MissingInput(port.to_string()))
    }

    /// Get a resolved field value with a fallback
    pub fn value_or(&self, param: &str, default: Value) -> Value {
        self.values.get(param).cloned().unwrap_or(default)
    }

    /// Capabilities attached to a link port, empty when unconnected
    pub fn capabilities_on(&self, port: &str) -> &[Capability] {
        self.capabilities
            .get(port)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Publish a provisional value on an output port while still running.
    /// Updates the run snapshot and broadcasts a PortData event.
    pub async fn emit_partial(&self, port: impl Into<String>, value: DataValue) {
        let port = port.into();
        self.snapshot
            .apply_partial(self.node_id, port.clone(), value.clone())
            .await;
        self.events.port_data(port, value);
    }
}

/// Context for the build-phase materialize hook
pub struct MaterializeContext {
    pub node_id: NodeId,
    /// Literal constant/hybrid field values (expressions are a flow-phase
    /// concern and are not resolved at build time)
    pub values: HashMap<String, Value>,
    /// Capabilities this provider itself consumes (chained providers)
    pub capabilities: HashMap<String, Vec<Capability>>,
    /// The link output port being resolved
    pub output_port: String,
}

impl MaterializeContext {
    pub fn capabilities_on(&self, port: &str) -> &[Capability] {
        self.capabilities
            .get(port)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Output from flow-phase execution
#[derive(Debug, Clone, Default)]
pub struct BehaviorOutput {
    pub outputs: HashMap<String, DataValue>,
}

impl BehaviorOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, port: impl Into<String>, value: DataValue) -> Self {
        self.outputs.insert(port.into(), value);
        self
    }
}
