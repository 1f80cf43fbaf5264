use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, BehaviorContext, BehaviorOutput, Capability, Channel, DataValue,
    ExecutionPhase, MaterializeContext, NodeDefinition, NodeError, OnExceedMax, Parameter,
    SocketSpec, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolved description of an agent at call time: its fields plus the
/// tool capabilities composed onto it during the build phase.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<Capability>,
}

/// Seam between the engine and whatever actually runs the model.
///
/// The engine never talks to a provider; it hands the resolved spec and
/// the incoming message to this trait and records whatever comes back.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, spec: &AgentSpec, message: &Value) -> Result<Value, NodeError>;
}

/// Deterministic invoker for tests and offline runs: echoes the message
/// content back prefixed with the agent name.
pub struct EchoInvoker;

#[async_trait]
impl AgentInvoker for EchoInvoker {
    async fn invoke(&self, spec: &AgentSpec, message: &Value) -> Result<Value, NodeError> {
        let content = match message {
            Value::Object(map) => map.get("content").cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        Ok(Value::String(format!("{}: {}", spec.name, content.render())))
    }
}

/// Hybrid kind: runs in the flow phase against its wired input, and
/// materializes as an `agent` capability when its link output is
/// consumed (so one agent can serve as another agent's tool).
pub fn agent_definition() -> NodeDefinition {
    NodeDefinition::new("agent", "Agent", "agents", ExecutionPhase::Hybrid)
        .param(Parameter::constant("name", "Agent"))
        .param(Parameter::constant("model", "gpt-4o-mini"))
        .param(Parameter::constant("instructions", ""))
        .param(Parameter::input(
            "input",
            SocketSpec::new(socket_types::MESSAGE, Channel::Flow)
                .accepts(socket_types::TEXT)
                .accepts(socket_types::STRING),
        ))
        .param(Parameter::output(
            "output",
            SocketSpec::new(socket_types::MESSAGE, Channel::Flow),
        ))
        .param(Parameter::input(
            "tools",
            SocketSpec::new(socket_types::TOOLS, Channel::Link).multiple(),
        ))
        .param(Parameter::output(
            "agent",
            SocketSpec::new(socket_types::AGENT, Channel::Link)
                .max_connections(1, OnExceedMax::Replace),
        ))
}

pub struct AgentBehavior {
    invoker: Arc<dyn AgentInvoker>,
}

impl AgentBehavior {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { invoker }
    }

    fn spec_from(values: &HashMap<String, Value>, tools: &[Capability]) -> AgentSpec {
        let field = |id: &str| {
            values
                .get(id)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        AgentSpec {
            name: field("name"),
            model: field("model"),
            instructions: field("instructions"),
            tools: tools.to_vec(),
        }
    }
}

#[async_trait]
impl Behavior for AgentBehavior {
    fn kind(&self) -> &str {
        "agent"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let spec = Self::spec_from(&ctx.values, ctx.capabilities_on("tools"));
        let message = match ctx.inputs.get("input") {
            Some(wired) => wired.value.clone(),
            None => ctx.trigger.clone().map(|t| t.value).unwrap_or(Value::Null),
        };

        let reply = self.invoker.invoke(&spec, &message).await?;
        let output = Value::Object(HashMap::from([
            ("role".to_string(), Value::String("assistant".into())),
            ("content".to_string(), reply),
        ]));

        Ok(BehaviorOutput::new()
            .with_output("output", DataValue::new(socket_types::MESSAGE, output)))
    }

    async fn materialize(&self, ctx: MaterializeContext) -> Result<Capability, NodeError> {
        let spec = Self::spec_from(&ctx.values, ctx.capabilities_on("tools"));
        let tools = spec
            .tools
            .iter()
            .map(|c| c.payload.clone())
            .collect::<Vec<_>>();

        Ok(Capability {
            provider: ctx.node_id,
            kind: "agent".to_string(),
            payload: Value::Object(HashMap::from([
                ("name".to_string(), Value::String(spec.name)),
                ("model".to_string(), Value::String(spec.model)),
                (
                    "instructions".to_string(),
                    Value::String(spec.instructions),
                ),
                ("tools".to_string(), Value::Array(tools)),
            ])),
        })
    }
}
