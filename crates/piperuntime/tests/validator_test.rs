use pipecore::{
    socket_types, Channel, ExecutionPhase, FlowNode, Graph, GraphError, NodeDefinition,
    OnExceedMax, Parameter, PortRef, SocketRegistry, SocketSpec, ValidationError,
};
use piperuntime::{compatible_ports, connect, validate, DefinitionRegistry};

fn catalog() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    registry
        .register(
            NodeDefinition::new("producer", "Producer", "sources", ExecutionPhase::Flow)
                .param(Parameter::output(
                    "out",
                    SocketSpec::new(socket_types::STRING, Channel::Flow),
                ))
                .param(Parameter::output(
                    "json_out",
                    SocketSpec::new(socket_types::JSON, Channel::Flow),
                ))
                .param(Parameter::output(
                    "capped",
                    SocketSpec::new(socket_types::STRING, Channel::Flow)
                        .max_connections(1, OnExceedMax::Reject),
                ))
                .param(Parameter::output(
                    "swapping",
                    SocketSpec::new(socket_types::STRING, Channel::Flow)
                        .max_connections(1, OnExceedMax::Replace),
                )),
        )
        .unwrap();
    registry
        .register(
            NodeDefinition::new("consumer", "Consumer", "sinks", ExecutionPhase::Flow)
                .param(Parameter::input(
                    "in",
                    SocketSpec::new(socket_types::STRING, Channel::Flow),
                ))
                .param(Parameter::input(
                    "many",
                    SocketSpec::new(socket_types::STRING, Channel::Flow).multiple(),
                ))
                .param(Parameter::input(
                    "flag",
                    SocketSpec::new(socket_types::BOOLEAN, Channel::Flow),
                ))
                .param(Parameter::output(
                    "out",
                    SocketSpec::new(socket_types::STRING, Channel::Flow),
                )),
        )
        .unwrap();
    registry
        .register(
            NodeDefinition::new("attach", "Attach", "composition", ExecutionPhase::Structural)
                .param(Parameter::input(
                    "tools",
                    SocketSpec::new(socket_types::TOOLS, Channel::Link).multiple(),
                ))
                .param(Parameter::hybrid(
                    "agent",
                    SocketSpec::new(socket_types::AGENT, Channel::Flow).bidirectional(),
                    pipecore::Value::Null,
                )),
        )
        .unwrap();
    registry
}

fn pair(graph: &mut Graph) -> (pipecore::NodeId, pipecore::NodeId) {
    let p = graph.add_node(FlowNode::new("producer"));
    let c = graph.add_node(FlowNode::new("consumer"));
    (p, c)
}

fn rejection(result: Result<Channel, GraphError>) -> ValidationError {
    match result {
        Err(GraphError::Rejected(e)) => e,
        other => panic!("expected a validation rejection, got {other:?}"),
    }
}

#[test]
fn input_port_cannot_be_a_source() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);

    let err = rejection(validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(c, "in"),
        &PortRef::new(p, "out"),
    ));
    assert!(matches!(err, ValidationError::NotSourceCapable { .. }));
}

#[test]
fn output_port_cannot_be_a_target() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);

    let err = rejection(validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(p, "out"),
        &PortRef::new(c, "out"),
    ));
    assert!(matches!(err, ValidationError::NotTargetCapable { .. }));
}

#[test]
fn flow_and_link_channels_do_not_mix() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let p = graph.add_node(FlowNode::new("producer"));
    let a = graph.add_node(FlowNode::new("attach"));

    let err = rejection(validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(p, "out"),
        &PortRef::new(a, "tools"),
    ));
    assert!(matches!(err, ValidationError::ChannelMismatch { .. }));
}

#[test]
fn bidirectional_port_bridges_into_the_link_channel() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let a = graph.add_node(FlowNode::new("attach"));
    let b = graph.add_node(FlowNode::new("attach"));

    // agent (flow, bidirectional) -> tools (link): admitted on link
    let channel = validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(a, "agent"),
        &PortRef::new(b, "tools"),
    )
    .unwrap();
    assert_eq!(channel, Channel::Link);
}

#[test]
fn incompatible_types_are_rejected() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);

    let err = rejection(validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(p, "json_out"),
        &PortRef::new(c, "flag"),
    ));
    assert!(matches!(err, ValidationError::TypeMismatch { .. }));
}

#[test]
fn single_input_rejects_a_second_edge() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);
    let p2 = graph.add_node(FlowNode::new("producer"));

    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p, "out"),
        PortRef::new(c, "in"),
    )
    .unwrap();

    let err = rejection(validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(p2, "out"),
        &PortRef::new(c, "in"),
    ));
    assert!(matches!(err, ValidationError::TargetOccupied { .. }));

    // A multiple-input port keeps accepting
    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p, "out"),
        PortRef::new(c, "many"),
    )
    .unwrap();
    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p2, "out"),
        PortRef::new(c, "many"),
    )
    .unwrap();
}

#[test]
fn capped_source_rejects_past_its_limit() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);
    let c2 = graph.add_node(FlowNode::new("consumer"));

    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p, "capped"),
        PortRef::new(c, "in"),
    )
    .unwrap();

    let err = rejection(validate(
        &registry,
        &sockets,
        &graph,
        &PortRef::new(p, "capped"),
        &PortRef::new(c2, "in"),
    ));
    assert!(matches!(err, ValidationError::SourceAtCapacity { .. }));
    assert_eq!(graph.edges.len(), 1, "rejection leaves the graph unchanged");
}

#[test]
fn replacing_source_swaps_the_prior_edge() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);
    let c2 = graph.add_node(FlowNode::new("consumer"));

    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p, "swapping"),
        PortRef::new(c, "in"),
    )
    .unwrap();
    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p, "swapping"),
        PortRef::new(c2, "in"),
    )
    .unwrap();

    let outgoing: Vec<_> = graph.outgoing(p, None, Some("swapping")).collect();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].target.node, c2);
}

#[test]
fn serialized_graph_reconstructs_with_identical_admission() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let (p, c) = pair(&mut graph);
    connect(
        &registry,
        &sockets,
        &mut graph,
        PortRef::new(p, "out"),
        PortRef::new(c, "in"),
    )
    .unwrap();

    let json = serde_json::to_string(&graph).unwrap();
    let restored: Graph = serde_json::from_str(&json).unwrap();

    // Same rejection after the round trip
    let err = rejection(validate(
        &registry,
        &sockets,
        &restored,
        &PortRef::new(p, "out"),
        &PortRef::new(c, "in"),
    ));
    assert!(matches!(err, ValidationError::TargetOccupied { .. }));

    // And the same admissions
    let channel = validate(
        &registry,
        &sockets,
        &restored,
        &PortRef::new(p, "out"),
        &PortRef::new(c, "many"),
    )
    .unwrap();
    assert_eq!(channel, Channel::Flow);
}

#[test]
fn compatible_ports_group_by_category() {
    let registry = catalog();
    let sockets = SocketRegistry::new();
    let mut graph = Graph::new();
    let p = graph.add_node(FlowNode::new("producer"));

    let groups = compatible_ports(&registry, &sockets, &graph, &PortRef::new(p, "out")).unwrap();

    // string reaches the consumer's string inputs, not its boolean flag
    let sinks = groups
        .iter()
        .find(|g| g.category == "sinks")
        .expect("consumer ports offered");
    let ports: Vec<&str> = sinks.ports.iter().map(|p| p.param.as_str()).collect();
    assert!(ports.contains(&"in"));
    assert!(ports.contains(&"many"));
    assert!(!ports.contains(&"flag"));
    assert!(!groups.iter().any(|g| g.category == "composition"));
}

#[test]
fn instantiate_fills_defaults_and_fresh_ids() {
    let mut registry = catalog();
    registry
        .register(
            NodeDefinition::new("hooked", "Hooked", "sources", ExecutionPhase::Flow)
                .trigger()
                .requires_hook_id()
                .param(Parameter::constant("greeting", "hello"))
                .param(Parameter::output(
                    "output",
                    SocketSpec::new(socket_types::JSON, Channel::Flow),
                )),
        )
        .unwrap();

    let first = registry.instantiate("hooked", None).unwrap();
    let second = registry.instantiate("hooked", None).unwrap();

    assert_ne!(first.id, second.id);
    assert!(first.hook_id.is_some());
    assert_ne!(first.hook_id, second.hook_id);

    // Instances come out unlabelled; a second instance of a kind must not
    // shadow the first in display-label lookup
    assert_eq!(first.label, None);
    assert_ne!(first.display_label(), second.display_label());
    assert_eq!(
        first.values.get("greeting").and_then(|v| v.as_literal()),
        Some(&pipecore::Value::String("hello".into()))
    );

    assert!(matches!(
        registry.instantiate("nonexistent", None),
        Err(pipecore::DefinitionError::UnknownKind(_))
    ));
}

#[test]
fn catalog_registration_is_strict() {
    let mut registry = catalog();

    let dup = NodeDefinition::new("producer", "Again", "sources", ExecutionPhase::Flow);
    assert!(matches!(
        registry.register(dup),
        Err(pipecore::DefinitionError::DuplicateKind(_))
    ));

    let twice = NodeDefinition::new("twice", "Twice", "sinks", ExecutionPhase::Flow)
        .param(Parameter::constant("x", 1i64))
        .param(Parameter::constant("x", 2i64));
    assert!(matches!(
        registry.register(twice),
        Err(pipecore::DefinitionError::DuplicateParameter { .. })
    ));

    let socketless = NodeDefinition::new("socketless", "Socketless", "sinks", ExecutionPhase::Flow)
        .param(Parameter {
            id: "in".to_string(),
            mode: pipecore::ParamMode::Input,
            socket: None,
            default: None,
            visible_when: None,
        });
    assert!(matches!(
        registry.register(socketless),
        Err(pipecore::DefinitionError::MissingSocket { .. })
    ));
}
