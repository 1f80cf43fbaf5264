use crate::registry::{BehaviorRegistry, DefinitionRegistry};
use futures::future::BoxFuture;
use futures::FutureExt;
use pipecore::{
    BuildError, Capability, CapabilityMap, Channel, Graph, MaterializeContext, NodeId, ParamValue,
    Value,
};
use std::collections::HashMap;

/// Build phase: resolve every link-channel edge into a static capability
/// structure before any flow step runs.
///
/// Runs to completion or fails for the whole run; it never re-runs
/// mid-execution, so composition topology is frozen for the run's
/// duration. Providers chain depth-first (an agent wired as a tool brings
/// its own tools along); cycles are a build failure.
pub async fn assemble(
    graph: &Graph,
    registry: &DefinitionRegistry,
    behaviors: &BehaviorRegistry,
) -> Result<CapabilityMap, BuildError> {
    let mut map: CapabilityMap = HashMap::new();

    for edge in &graph.edges {
        if edge.channel != Channel::Link {
            continue;
        }

        let mut visiting = Vec::new();
        let capability = resolve_provider(
            graph,
            registry,
            behaviors,
            edge.source.node,
            edge.source.port.clone(),
            &mut visiting,
        )
        .await?;

        map.entry(edge.target.node)
            .or_default()
            .entry(edge.target.port.clone())
            .or_default()
            .push(capability);
    }

    tracing::debug!(consumers = map.len(), "build phase complete");
    Ok(map)
}

fn resolve_provider<'a>(
    graph: &'a Graph,
    registry: &'a DefinitionRegistry,
    behaviors: &'a BehaviorRegistry,
    provider: NodeId,
    output_port: String,
    visiting: &'a mut Vec<NodeId>,
) -> BoxFuture<'a, Result<Capability, BuildError>> {
    async move {
        if visiting.contains(&provider) {
            return Err(BuildError::CircularComposition(provider.to_string()));
        }
        visiting.push(provider);

        let node = graph
            .find_node(provider)
            .ok_or_else(|| BuildError::MissingNode(provider.to_string()))?;
        registry.definition(&node.kind)?;
        let behavior = behaviors
            .get(&node.kind)
            .ok_or_else(|| BuildError::NoBehavior(node.kind.clone()))?;

        // Resolve the provider's own link inputs first (chained providers)
        let mut capabilities: HashMap<String, Vec<Capability>> = HashMap::new();
        let incoming: Vec<_> = graph
            .incoming(provider, Some(Channel::Link), None)
            .cloned()
            .collect();
        for edge in incoming {
            let nested = resolve_provider(
                graph,
                registry,
                behaviors,
                edge.source.node,
                edge.source.port.clone(),
                visiting,
            )
            .await?;
            capabilities
                .entry(edge.target.port.clone())
                .or_default()
                .push(nested);
        }

        let capability = behavior
            .materialize(MaterializeContext {
                node_id: provider,
                values: literal_values(node),
                capabilities,
                output_port,
            })
            .await
            .map_err(|source| BuildError::Materialize {
                node: provider.to_string(),
                source,
            })?;

        visiting.pop();
        Ok(capability)
    }
    .boxed()
}

/// Literal constant/hybrid values only; expression-valued fields belong
/// to the flow phase and are absent here.
fn literal_values(node: &pipecore::FlowNode) -> HashMap<String, Value> {
    node.values
        .iter()
        .filter_map(|(id, value)| match value {
            ParamValue::Literal(v) => Some((id.clone(), v.clone())),
            ParamValue::Expression(_) => None,
        })
        .collect()
}
