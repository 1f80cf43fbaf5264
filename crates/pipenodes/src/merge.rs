use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, BehaviorContext, BehaviorOutput, Channel, DataValue, ExecutionPhase,
    NodeDefinition, NodeError, Parameter, SocketSpec, Value,
};

/// Joins two branches. With `first` the earlier-declared present input
/// wins, which makes it the natural join after a conditional; `concat`
/// renders both to text.
pub fn merge_definition() -> NodeDefinition {
    NodeDefinition::new("merge", "Merge", "logic", ExecutionPhase::Flow)
        .param(Parameter::input(
            "a",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
        .param(Parameter::input(
            "b",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
        .param(Parameter::constant("strategy", "first"))
        .param(Parameter::output(
            "output",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
}

pub struct MergeBehavior;

#[async_trait]
impl Behavior for MergeBehavior {
    fn kind(&self) -> &str {
        "merge"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let a = ctx.inputs.get("a");
        let b = ctx.inputs.get("b");

        let strategy = ctx.value_or("strategy", Value::String("first".into()));
        let merged = match strategy.as_str().unwrap_or("first") {
            "concat" => {
                let mut parts = Vec::new();
                for present in [a, b].into_iter().flatten() {
                    parts.push(present.value.render());
                }
                DataValue::new(socket_types::TEXT, parts.join("\n"))
            }
            _ => a
                .or(b)
                .cloned()
                .ok_or_else(|| NodeError::MissingInput("a".to_string()))?,
        };

        Ok(BehaviorOutput::new().with_output("output", merged))
    }
}
