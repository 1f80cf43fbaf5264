use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, BehaviorContext, BehaviorOutput, Channel, DataValue, ExecutionPhase,
    NodeDefinition, NodeError, Parameter, SocketSpec,
};

/// Emits its `template` field as text. Reference expressions inside the
/// field are already resolved by the time the behavior runs, so this is
/// the catalog's string-building node.
pub fn template_definition() -> NodeDefinition {
    NodeDefinition::new("template", "Template", "data", ExecutionPhase::Flow)
        .param(Parameter::input(
            "input",
            SocketSpec::new(socket_types::ANY, Channel::Flow),
        ))
        .param(Parameter::hybrid(
            "template",
            SocketSpec::new(socket_types::TEXT, Channel::Flow),
            "",
        ))
        .param(Parameter::output(
            "output",
            SocketSpec::new(socket_types::TEXT, Channel::Flow),
        ))
}

pub struct TemplateBehavior;

#[async_trait]
impl Behavior for TemplateBehavior {
    fn kind(&self) -> &str {
        "template"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let rendered = match ctx.inputs.get("template") {
            Some(wired) => wired.value.render(),
            None => ctx
                .values
                .get("template")
                .map(|v| v.render())
                .unwrap_or_default(),
        };
        Ok(BehaviorOutput::new()
            .with_output("output", DataValue::new(socket_types::TEXT, rendered)))
    }
}
