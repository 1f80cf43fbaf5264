//! Built-in node kinds
//!
//! Each kind pairs a `NodeDefinition` (its typed parameter surface) with
//! a `Behavior` (its runtime contribution). Model calls stay behind the
//! `AgentInvoker` seam; nothing here talks to a provider directly.

mod agent;
mod conditional;
mod merge;
mod template;
mod toolset;
mod triggers;

pub use agent::{AgentBehavior, AgentInvoker, AgentSpec, EchoInvoker};
pub use conditional::ConditionalBehavior;
pub use merge::MergeBehavior;
pub use template::TemplateBehavior;
pub use toolset::ToolsetBehavior;
pub use triggers::{ChatStartBehavior, WebhookTriggerBehavior};

use pipecore::DefinitionError;
use piperuntime::{BehaviorRegistry, DefinitionRegistry};
use std::sync::Arc;

/// Register the built-in catalog. Called once at process start.
pub fn register_builtin(
    definitions: &mut DefinitionRegistry,
    behaviors: &mut BehaviorRegistry,
    invoker: Arc<dyn AgentInvoker>,
) -> Result<(), DefinitionError> {
    definitions.register(triggers::chat_start_definition())?;
    definitions.register(triggers::webhook_trigger_definition())?;
    definitions.register(agent::agent_definition())?;
    definitions.register(toolset::toolset_definition())?;
    definitions.register(conditional::conditional_definition())?;
    definitions.register(template::template_definition())?;
    definitions.register(merge::merge_definition())?;

    behaviors.register(Arc::new(ChatStartBehavior));
    behaviors.register(Arc::new(WebhookTriggerBehavior));
    behaviors.register(Arc::new(AgentBehavior::new(invoker)));
    behaviors.register(Arc::new(ToolsetBehavior));
    behaviors.register(Arc::new(ConditionalBehavior));
    behaviors.register(Arc::new(TemplateBehavior));
    behaviors.register(Arc::new(MergeBehavior));

    Ok(())
}
