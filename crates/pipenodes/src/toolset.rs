use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, Capability, Channel, ExecutionPhase, MaterializeContext,
    NodeDefinition, NodeError, Parameter, SocketSpec, Value,
};
use std::collections::HashMap;

/// Structural-only provider: names a bundle of tools for an agent to
/// carry. Never scheduled in the flow phase.
pub fn toolset_definition() -> NodeDefinition {
    NodeDefinition::new("toolset", "Toolset", "tools", ExecutionPhase::Structural)
        .param(Parameter::constant("toolset", ""))
        .param(Parameter::constant("config", Value::Object(HashMap::new())))
        .param(Parameter::output(
            "tools",
            SocketSpec::new(socket_types::TOOLS, Channel::Link),
        ))
}

pub struct ToolsetBehavior;

#[async_trait]
impl Behavior for ToolsetBehavior {
    fn kind(&self) -> &str {
        "toolset"
    }

    async fn materialize(&self, ctx: MaterializeContext) -> Result<Capability, NodeError> {
        let name = ctx
            .values
            .get("toolset")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NodeError::MissingValue("toolset".to_string()))?
            .to_string();
        let config = ctx
            .values
            .get("config")
            .cloned()
            .unwrap_or(Value::Object(HashMap::new()));

        Ok(Capability {
            provider: ctx.node_id,
            kind: "tool".to_string(),
            payload: Value::Object(HashMap::from([
                ("toolset".to_string(), Value::String(name)),
                ("config".to_string(), config),
            ])),
        })
    }
}
