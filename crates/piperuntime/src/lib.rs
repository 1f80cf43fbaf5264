//! Pipeline execution runtime
//!
//! This crate provides the definition registry, the graph validator, the
//! build-phase assembler, the flow executor with its expression resolver,
//! and the `PipelineRuntime` facade tying them together.

mod assembly;
mod executor;
mod expression;
mod registry;
mod runtime;
mod validator;

pub use assembly::assemble;
pub use executor::{FlowExecutor, RunMode, RunOutcome};
pub use expression::{
    eval, parse_reference, resolve_param, resolve_template, Reference, ResolveContext,
};
pub use registry::{BehaviorRegistry, DefinitionRegistry};
pub use runtime::{PipelineRuntime, RunHandle, RuntimeConfig};
pub use validator::{compatible_ports, connect, validate, CompatibleGroup, CompatiblePort};
