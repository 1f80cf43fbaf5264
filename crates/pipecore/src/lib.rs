//! Core abstractions for the pipeline graph engine
//!
//! This crate provides the typed node-graph model that all other
//! components depend on: socket types and their coercion rules, node
//! definitions, the authoring graph, run snapshots, and the behavior
//! contract that concrete node kinds implement.

mod behavior;
mod definition;
mod error;
mod events;
mod graph;
mod snapshot;
mod socket;
mod value;

pub use behavior::{
    Behavior, BehaviorContext, BehaviorOutput, Capability, CapabilityMap, MaterializeContext,
};
pub use definition::{
    Channel, ExecutionPhase, NodeDefinition, OnExceedMax, ParamMode, Parameter, SocketSpec,
    VisibleWhen,
};
pub use error::{
    BuildError, DefinitionError, ExpressionError, GraphError, NodeError, PipelineError,
    ValidationError,
};
pub use events::{EventBus, EventEmitter, RunEvent};
pub use graph::{EdgeId, FlowEdge, FlowNode, Graph, NodeId, ParamValue, PortRef};
pub use snapshot::{NodeFailure, NodeSnapshot, NodeStatus, RunId, RunSnapshot, SnapshotHandle};
pub use socket::{socket_types, SocketRegistry, SocketType};
pub use value::{DataValue, PathStep, Value};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
