use pipecore::{
    socket_types, Behavior, BehaviorContext, Capability, DataValue, EventBus, MaterializeContext,
    NodeError, RunSnapshot, SnapshotHandle, Value,
};
use pipenodes::{
    AgentBehavior, ChatStartBehavior, ConditionalBehavior, EchoInvoker, MergeBehavior,
    TemplateBehavior, ToolsetBehavior,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn builtin_catalog_registers_cleanly() {
    let mut definitions = piperuntime::DefinitionRegistry::new();
    let mut behaviors = piperuntime::BehaviorRegistry::new();
    pipenodes::register_builtin(&mut definitions, &mut behaviors, Arc::new(EchoInvoker)).unwrap();

    for kind in [
        "chat-start",
        "webhook-trigger",
        "agent",
        "toolset",
        "conditional",
        "template",
        "merge",
    ] {
        assert!(definitions.get(kind).is_some(), "{kind} missing");
        assert!(behaviors.get(kind).is_some(), "{kind} behavior missing");
    }

    let webhook = definitions.instantiate("webhook-trigger", None).unwrap();
    assert!(webhook.hook_id.is_some());

    let chat = definitions.instantiate("chat-start", None).unwrap();
    assert!(chat.hook_id.is_none());
}

fn test_context(
    inputs: HashMap<String, DataValue>,
    values: HashMap<String, Value>,
    capabilities: HashMap<String, Vec<Capability>>,
    trigger: Option<DataValue>,
) -> BehaviorContext {
    let event_bus = EventBus::new(100);
    let run_id = Uuid::new_v4();
    let node_id = Uuid::new_v4();

    BehaviorContext::new(
        node_id,
        inputs,
        values,
        capabilities,
        trigger,
        event_bus.create_emitter(run_id, node_id),
        tokio_util::sync::CancellationToken::new(),
        SnapshotHandle::new(RunSnapshot::new(None)),
    )
}

fn message(content: &str) -> Value {
    Value::Object(HashMap::from([(
        "content".to_string(),
        Value::String(content.into()),
    )]))
}

#[tokio::test]
async fn chat_start_wraps_bare_trigger_payload() {
    let trigger = DataValue::new(socket_types::STRING, "hello");
    let ctx = test_context(HashMap::new(), HashMap::new(), HashMap::new(), Some(trigger));

    let output = ChatStartBehavior.execute(ctx).await.unwrap();
    let out = output.outputs.get("output").unwrap();

    assert_eq!(out.ty.as_str(), socket_types::MESSAGE);
    match &out.value {
        Value::Object(map) => assert_eq!(map.get("content"), Some(&Value::String("hello".into()))),
        other => panic!("expected message object, got {other:?}"),
    }
}

#[tokio::test]
async fn agent_prefers_wired_input_over_trigger() {
    let behavior = AgentBehavior::new(Arc::new(EchoInvoker));
    let inputs = HashMap::from([(
        "input".to_string(),
        DataValue::new(socket_types::MESSAGE, message("from wire")),
    )]);
    let values = HashMap::from([("name".to_string(), Value::String("Echo".into()))]);
    let trigger = DataValue::new(socket_types::MESSAGE, message("from trigger"));

    let ctx = test_context(inputs, values, HashMap::new(), Some(trigger));
    let output = behavior.execute(ctx).await.unwrap();

    let reply = output.outputs.get("output").unwrap();
    match &reply.value {
        Value::Object(map) => assert_eq!(
            map.get("content"),
            Some(&Value::String("Echo: from wire".into()))
        ),
        other => panic!("expected message object, got {other:?}"),
    }
}

#[tokio::test]
async fn agent_materializes_with_nested_tool_payloads() {
    let behavior = AgentBehavior::new(Arc::new(EchoInvoker));
    let tool = Capability {
        provider: Uuid::new_v4(),
        kind: "tool".to_string(),
        payload: Value::Object(HashMap::from([(
            "toolset".to_string(),
            Value::String("search".into()),
        )])),
    };

    let ctx = MaterializeContext {
        node_id: Uuid::new_v4(),
        values: HashMap::from([("name".to_string(), Value::String("Researcher".into()))]),
        capabilities: HashMap::from([("tools".to_string(), vec![tool])]),
        output_port: "agent".to_string(),
    };

    let capability = behavior.materialize(ctx).await.unwrap();
    assert_eq!(capability.kind, "agent");
    match &capability.payload {
        Value::Object(map) => {
            assert_eq!(map.get("name"), Some(&Value::String("Researcher".into())));
            match map.get("tools") {
                Some(Value::Array(tools)) => assert_eq!(tools.len(), 1),
                other => panic!("expected tools array, got {other:?}"),
            }
        }
        other => panic!("expected object payload, got {other:?}"),
    }
}

#[tokio::test]
async fn toolset_requires_a_name() {
    let ctx = MaterializeContext {
        node_id: Uuid::new_v4(),
        values: HashMap::from([("toolset".to_string(), Value::String(String::new()))]),
        capabilities: HashMap::new(),
        output_port: "tools".to_string(),
    };

    let result = ToolsetBehavior.materialize(ctx).await;
    assert!(matches!(result, Err(NodeError::MissingValue(_))));
}

#[tokio::test]
async fn toolset_has_no_flow_phase() {
    let ctx = test_context(HashMap::new(), HashMap::new(), HashMap::new(), None);
    let result = ToolsetBehavior.execute(ctx).await;
    assert!(matches!(result, Err(NodeError::NotExecutable(_))));
}

#[tokio::test]
async fn conditional_routes_to_exactly_one_branch() {
    let inputs = HashMap::from([(
        "input".to_string(),
        DataValue::new(socket_types::STRING, "payload"),
    )]);
    let values = HashMap::from([("condition".to_string(), Value::Bool(false))]);

    let ctx = test_context(inputs, values, HashMap::new(), None);
    let output = ConditionalBehavior.execute(ctx).await.unwrap();

    assert!(output.outputs.contains_key("false"));
    assert!(!output.outputs.contains_key("true"));
}

#[tokio::test]
async fn conditional_wired_condition_wins_over_field() {
    let inputs = HashMap::from([
        (
            "input".to_string(),
            DataValue::new(socket_types::STRING, "payload"),
        ),
        (
            "condition".to_string(),
            DataValue::new(socket_types::BOOLEAN, true),
        ),
    ]);
    let values = HashMap::from([("condition".to_string(), Value::Bool(false))]);

    let ctx = test_context(inputs, values, HashMap::new(), None);
    let output = ConditionalBehavior.execute(ctx).await.unwrap();

    assert!(output.outputs.contains_key("true"));
}

#[tokio::test]
async fn template_prefers_wired_template() {
    let inputs = HashMap::from([(
        "template".to_string(),
        DataValue::new(socket_types::TEXT, "wired"),
    )]);
    let values = HashMap::from([("template".to_string(), Value::String("field".into()))]);

    let ctx = test_context(inputs, values, HashMap::new(), None);
    let output = TemplateBehavior.execute(ctx).await.unwrap();

    assert_eq!(
        output.outputs.get("output").unwrap().value,
        Value::String("wired".into())
    );
}

#[tokio::test]
async fn merge_first_takes_the_present_branch() {
    let inputs = HashMap::from([(
        "b".to_string(),
        DataValue::new(socket_types::STRING, "only b arrived"),
    )]);
    let values = HashMap::from([("strategy".to_string(), Value::String("first".into()))]);

    let ctx = test_context(inputs, values, HashMap::new(), None);
    let output = MergeBehavior.execute(ctx).await.unwrap();

    assert_eq!(
        output.outputs.get("output").unwrap().value,
        Value::String("only b arrived".into())
    );
}

#[tokio::test]
async fn merge_concat_joins_both() {
    let inputs = HashMap::from([
        ("a".to_string(), DataValue::new(socket_types::STRING, "one")),
        ("b".to_string(), DataValue::new(socket_types::STRING, "two")),
    ]);
    let values = HashMap::from([("strategy".to_string(), Value::String("concat".into()))]);

    let ctx = test_context(inputs, values, HashMap::new(), None);
    let output = MergeBehavior.execute(ctx).await.unwrap();

    assert_eq!(
        output.outputs.get("output").unwrap().value,
        Value::String("one\ntwo".into())
    );
}

#[tokio::test]
async fn merge_with_no_inputs_is_an_error() {
    let ctx = test_context(HashMap::new(), HashMap::new(), HashMap::new(), None);
    let result = MergeBehavior.execute(ctx).await;
    assert!(matches!(result, Err(NodeError::MissingInput(_))));
}
