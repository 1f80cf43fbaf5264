use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, BehaviorContext, BehaviorOutput, Channel, DataValue, ExecutionPhase,
    NodeDefinition, NodeError, Parameter, SocketSpec, Value,
};

/// Conversational entry point. Seeds a full run with the user message.
pub fn chat_start_definition() -> NodeDefinition {
    NodeDefinition::new("chat-start", "Chat Start", "triggers", ExecutionPhase::Flow)
        .trigger()
        .param(Parameter::output(
            "output",
            SocketSpec::new(socket_types::MESSAGE, Channel::Flow),
        ))
        .param(Parameter::input(
            "agent",
            SocketSpec::new(socket_types::AGENT, Channel::Link),
        ))
}

pub struct ChatStartBehavior;

#[async_trait]
impl Behavior for ChatStartBehavior {
    fn kind(&self) -> &str {
        "chat-start"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let message = match ctx.trigger.clone() {
            Some(payload) => DataValue::new(socket_types::MESSAGE, as_message(payload.value)),
            None => DataValue::new(socket_types::MESSAGE, Value::Null),
        };
        Ok(BehaviorOutput::new().with_output("output", message))
    }
}

/// HTTP entry point. The definition requires a hook id so callers have a
/// stable address for the instance; the payload passes through as json.
pub fn webhook_trigger_definition() -> NodeDefinition {
    NodeDefinition::new(
        "webhook-trigger",
        "Webhook Trigger",
        "triggers",
        ExecutionPhase::Flow,
    )
    .trigger()
    .requires_hook_id()
    .param(Parameter::output(
        "output",
        SocketSpec::new(socket_types::JSON, Channel::Flow),
    ))
    .param(Parameter::input(
        "agent",
        SocketSpec::new(socket_types::AGENT, Channel::Link),
    ))
}

pub struct WebhookTriggerBehavior;

#[async_trait]
impl Behavior for WebhookTriggerBehavior {
    fn kind(&self) -> &str {
        "webhook-trigger"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let payload = ctx
            .trigger
            .clone()
            .map(|t| t.value)
            .unwrap_or(Value::Null);
        Ok(BehaviorOutput::new().with_output("output", DataValue::new(socket_types::JSON, payload)))
    }
}

/// Wrap a bare trigger payload into message shape; objects are assumed
/// to already carry a `content` field.
fn as_message(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => Value::Object(std::collections::HashMap::from([(
            "content".to_string(),
            other,
        )])),
    }
}
