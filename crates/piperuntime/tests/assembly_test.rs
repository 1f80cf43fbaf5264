use async_trait::async_trait;
use pipecore::{
    socket_types, Behavior, BehaviorContext, BehaviorOutput, BuildError, Capability, Channel,
    DataValue, ExecutionPhase, FlowNode, Graph, MaterializeContext, NodeDefinition, NodeError,
    Parameter, PortRef, SocketRegistry, SocketSpec, Value,
};
use piperuntime::{assemble, BehaviorRegistry, DefinitionRegistry, PipelineRuntime};
use std::collections::HashMap;
use std::sync::Arc;

/// Leaf provider: materializes a named tool capability.
struct ToolBehavior;

#[async_trait]
impl Behavior for ToolBehavior {
    fn kind(&self) -> &str {
        "tool"
    }

    async fn materialize(&self, ctx: MaterializeContext) -> Result<Capability, NodeError> {
        Ok(Capability {
            provider: ctx.node_id,
            kind: "tool".to_string(),
            payload: ctx.values.get("name").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Chained provider: wraps its own tool capabilities into an agent
/// capability, and in the flow phase reports how many it carries.
struct WrapBehavior;

#[async_trait]
impl Behavior for WrapBehavior {
    fn kind(&self) -> &str {
        "wrap"
    }

    async fn execute(&self, ctx: BehaviorContext) -> Result<BehaviorOutput, NodeError> {
        let count = ctx.capabilities_on("tools").len() as i64;
        Ok(BehaviorOutput::new().with_output("output", DataValue::new(socket_types::INT, count)))
    }

    async fn materialize(&self, ctx: MaterializeContext) -> Result<Capability, NodeError> {
        let tools: Vec<Value> = ctx
            .capabilities_on("tools")
            .iter()
            .map(|c| c.payload.clone())
            .collect();
        Ok(Capability {
            provider: ctx.node_id,
            kind: "agent".to_string(),
            payload: Value::Object(HashMap::from([("tools".to_string(), Value::Array(tools))])),
        })
    }
}

fn catalog() -> (DefinitionRegistry, BehaviorRegistry) {
    let mut definitions = DefinitionRegistry::new();
    definitions
        .register(
            NodeDefinition::new("tool", "Tool", "tools", ExecutionPhase::Structural)
                .param(Parameter::constant("name", ""))
                .param(Parameter::output(
                    "tools",
                    SocketSpec::new(socket_types::TOOLS, Channel::Link),
                )),
        )
        .unwrap();
    definitions
        .register(
            NodeDefinition::new("wrap", "Wrap", "agents", ExecutionPhase::Hybrid)
                .param(Parameter::input(
                    "tools",
                    SocketSpec::new(socket_types::TOOLS, Channel::Link).multiple(),
                ))
                .param(Parameter::output(
                    "agent",
                    SocketSpec::new(socket_types::AGENT, Channel::Link),
                ))
                .param(Parameter::output(
                    "output",
                    SocketSpec::new(socket_types::INT, Channel::Flow),
                )),
        )
        .unwrap();

    let mut behaviors = BehaviorRegistry::new();
    behaviors.register(Arc::new(ToolBehavior));
    behaviors.register(Arc::new(WrapBehavior));
    (definitions, behaviors)
}

fn link(
    definitions: &DefinitionRegistry,
    graph: &mut Graph,
    source: (pipecore::NodeId, &str),
    target: (pipecore::NodeId, &str),
) {
    let sockets = SocketRegistry::new();
    piperuntime::connect(
        definitions,
        &sockets,
        graph,
        PortRef::new(source.0, source.1),
        PortRef::new(target.0, target.1),
    )
    .unwrap();
}

#[tokio::test]
async fn chained_providers_resolve_depth_first() {
    let (definitions, behaviors) = catalog();

    let mut graph = Graph::new();
    let tool = graph.add_node(FlowNode::new("tool").with_value("name", "search"));
    let inner = graph.add_node(FlowNode::new("wrap"));
    let outer = graph.add_node(FlowNode::new("wrap"));
    link(&definitions, &mut graph, (tool, "tools"), (inner, "tools"));
    // agent -> tools rides the one-directional coercion
    link(&definitions, &mut graph, (inner, "agent"), (outer, "tools"));

    let map = assemble(&graph, &definitions, &behaviors).await.unwrap();

    let attached = &map[&outer]["tools"];
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].kind, "agent");
    assert_eq!(attached[0].provider, inner);

    // The inner wrap brought its own tool along
    match &attached[0].payload {
        Value::Object(payload) => match payload.get("tools") {
            Some(Value::Array(tools)) => {
                assert_eq!(tools, &vec![Value::String("search".into())]);
            }
            other => panic!("expected nested tools array, got {other:?}"),
        },
        other => panic!("expected object payload, got {other:?}"),
    }
}

#[tokio::test]
async fn circular_composition_fails_the_build() {
    let (definitions, behaviors) = catalog();

    let mut graph = Graph::new();
    let a = graph.add_node(FlowNode::new("wrap"));
    let b = graph.add_node(FlowNode::new("wrap"));
    link(&definitions, &mut graph, (a, "agent"), (b, "tools"));
    link(&definitions, &mut graph, (b, "agent"), (a, "tools"));

    let result = assemble(&graph, &definitions, &behaviors).await;
    assert!(matches!(result, Err(BuildError::CircularComposition(_))));
}

#[tokio::test]
async fn capabilities_reach_flow_execution() {
    let (definitions, behaviors) = catalog();

    let mut graph = Graph::new();
    let tool = graph.add_node(FlowNode::new("tool").with_value("name", "search"));
    let tool2 = graph.add_node(FlowNode::new("tool").with_value("name", "calc"));
    let wrap = graph.add_node(FlowNode::new("wrap"));
    link(&definitions, &mut graph, (tool, "tools"), (wrap, "tools"));
    link(&definitions, &mut graph, (tool2, "tools"), (wrap, "tools"));

    let runtime = PipelineRuntime::new(definitions, behaviors);
    let outcome = runtime.run(&graph, None).await.unwrap();

    assert!(outcome.success);
    assert_eq!(
        outcome.snapshot.data_output(wrap).unwrap().value,
        Value::Int(2)
    );
}
