use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, BehaviorContext, BehaviorOutput, Channel, ExecutionPhase,
    NodeDefinition, NodeError, Parameter, SocketSpec, Value,
};

/// Routes its input to exactly one of two outputs. The untaken branch
/// gets no value, so everything reachable only through it is skipped.
pub fn conditional_definition() -> NodeDefinition {
    NodeDefinition::new("conditional", "Conditional", "logic", ExecutionPhase::Flow)
        .param(Parameter::input(
            "input",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
        .param(Parameter::hybrid(
            "condition",
            SocketSpec::new(socket_types::BOOLEAN, Channel::Flow),
            true,
        ))
        .param(Parameter::constant("negate", false).visible_when("condition", true))
        .param(Parameter::output(
            "true",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
        .param(Parameter::output(
            "false",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
}

pub struct ConditionalBehavior;

#[async_trait]
impl Behavior for ConditionalBehavior {
    fn kind(&self) -> &str {
        "conditional"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let input = ctx.require_input("input")?.clone();

        // Wired condition wins over the field value
        let mut verdict = match ctx.inputs.get("condition") {
            Some(wired) => wired.value.is_truthy(),
            None => ctx.value_or("condition", Value::Bool(true)).is_truthy(),
        };
        if ctx.value_or("negate", Value::Bool(false)).is_truthy() {
            verdict = !verdict;
        }

        let port = if verdict { "true" } else { "false" };
        Ok(BehaviorOutput::new().with_output(port, input))
    }
}
