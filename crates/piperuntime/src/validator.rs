use crate::registry::DefinitionRegistry;
use pipecore::{
    Channel, EdgeId, FlowEdge, Graph, GraphError, NodeDefinition, OnExceedMax, Parameter, PortRef,
    SocketRegistry, SocketSpec, ValidationError,
};

/// How a validated edge will be admitted into the graph
struct Admission {
    channel: Channel,
    /// Edge to remove first when the source port replaces on overflow
    replace: Option<EdgeId>,
}

fn port_param<'a>(
    registry: &'a DefinitionRegistry,
    graph: &Graph,
    port: &PortRef,
) -> Result<(&'a NodeDefinition, &'a Parameter, &'a SocketSpec), GraphError> {
    let node = graph
        .find_node(port.node)
        .ok_or_else(|| GraphError::NodeNotFound(port.node.to_string()))?;
    let definition = registry.definition(&node.kind)?;
    let param = definition
        .find_param(&port.port)
        .ok_or_else(|| GraphError::UnknownPort {
            kind: node.kind.clone(),
            port: port.port.clone(),
        })?;
    let socket = param.socket.as_ref().ok_or_else(|| GraphError::UnknownPort {
        kind: node.kind.clone(),
        port: port.port.clone(),
    })?;
    Ok((definition, param, socket))
}

fn check(
    registry: &DefinitionRegistry,
    sockets: &SocketRegistry,
    graph: &Graph,
    source: &PortRef,
    target: &PortRef,
) -> Result<Admission, GraphError> {
    let (src_def, src_param, src_socket) = port_param(registry, graph, source)?;
    let (tgt_def, tgt_param, tgt_socket) = port_param(registry, graph, target)?;

    // 1. source capability
    if !src_param.can_source() {
        return Err(ValidationError::NotSourceCapable {
            kind: src_def.kind.clone(),
            port: src_param.id.clone(),
        }
        .into());
    }

    // 2. target capability
    if !tgt_param.can_target() {
        return Err(ValidationError::NotTargetCapable {
            kind: tgt_def.kind.clone(),
            port: tgt_param.id.clone(),
        }
        .into());
    }

    // 3. channel compatibility: flow and link never mix except through an
    // explicitly bidirectional (dual-channel) port
    let channel = if src_socket.channel == tgt_socket.channel {
        src_socket.channel
    } else if src_socket.bidirectional {
        tgt_socket.channel
    } else if tgt_socket.bidirectional {
        src_socket.channel
    } else {
        return Err(ValidationError::ChannelMismatch {
            from: src_socket.channel,
            to: tgt_socket.channel,
        }
        .into());
    };

    // 4. type compatibility
    if !sockets.can_connect(&src_socket.ty, tgt_socket) {
        return Err(ValidationError::TypeMismatch {
            from: src_socket.ty.to_string(),
            to: tgt_socket.ty.to_string(),
        }
        .into());
    }

    // 5. target multiplicity
    if !tgt_socket.multiple
        && graph
            .incoming(target.node, None, Some(&target.port))
            .next()
            .is_some()
    {
        return Err(ValidationError::TargetOccupied {
            port: tgt_param.id.clone(),
        }
        .into());
    }

    // 6. source multiplicity
    let mut replace = None;
    if let Some(max) = src_socket.max_connections {
        let existing: Vec<&FlowEdge> = graph
            .outgoing(source.node, None, Some(&source.port))
            .collect();
        if existing.len() >= max as usize {
            match src_socket.on_exceed_max {
                OnExceedMax::Reject => {
                    return Err(ValidationError::SourceAtCapacity {
                        port: src_param.id.clone(),
                    }
                    .into());
                }
                OnExceedMax::Replace => {
                    // Swap out the oldest outgoing edge from this port
                    replace = existing.first().map(|e| e.id);
                }
            }
        }
    }

    Ok(Admission { channel, replace })
}

/// Validate a proposed edge without mutating the graph. Returns the
/// channel the edge would carry.
pub fn validate(
    registry: &DefinitionRegistry,
    sockets: &SocketRegistry,
    graph: &Graph,
    source: &PortRef,
    target: &PortRef,
) -> Result<Channel, GraphError> {
    check(registry, sockets, graph, source, target).map(|a| a.channel)
}

/// Validate and insert an edge. A rejection leaves the graph untouched;
/// a replace-on-overflow removes the prior edge and inserts the new one
/// in one mutation, so a capped port never observably holds both.
pub fn connect(
    registry: &DefinitionRegistry,
    sockets: &SocketRegistry,
    graph: &mut Graph,
    source: PortRef,
    target: PortRef,
) -> Result<EdgeId, GraphError> {
    let admission = check(registry, sockets, graph, &source, &target)?;

    if let Some(prior) = admission.replace {
        graph.remove_edge(prior);
        tracing::debug!(edge = %prior, "replaced prior edge on capped source port");
    }

    let edge = FlowEdge::new(source, target, admission.channel);
    let id = edge.id;
    graph.edges.push(edge);
    Ok(id)
}

/// One offerable counterpart for a pending dangling port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatiblePort {
    pub kind: String,
    pub param: String,
}

/// Compatible ports grouped by palette category, declaration order
#[derive(Debug, Clone)]
pub struct CompatibleGroup {
    pub category: String,
    pub ports: Vec<CompatiblePort>,
}

/// Reverse compatibility query: every (kind, port) pair across all
/// definitions that could be the other endpoint of an edge from the
/// pending port. Capability, channel, and type checks apply; multiplicity
/// cannot, since the counterpart node does not exist yet.
pub fn compatible_ports(
    registry: &DefinitionRegistry,
    sockets: &SocketRegistry,
    graph: &Graph,
    pending: &PortRef,
) -> Result<Vec<CompatibleGroup>, GraphError> {
    let (_, pending_param, pending_socket) = port_param(registry, graph, pending)?;

    let mut matches: Vec<(usize, usize)> = Vec::new();

    if pending_param.can_source() {
        // Dragging from an output: offer target-capable ports
        for (ty, ports) in registry.target_index() {
            if !sockets.can_coerce(&pending_socket.ty, ty) && ty != &pending_socket.ty {
                continue;
            }
            for &(def_index, param_index) in ports {
                let candidate = &registry.by_index(def_index).params[param_index];
                let Some(socket) = candidate.socket.as_ref() else {
                    continue;
                };
                if channels_compatible(pending_socket, socket)
                    && sockets.can_connect(&pending_socket.ty, socket)
                {
                    matches.push((def_index, param_index));
                }
            }
        }
    } else if pending_param.can_target() {
        // Dragging from an input: offer source-capable ports whose type
        // can reach this input
        for (ty, ports) in registry.source_index() {
            for &(def_index, param_index) in ports {
                let candidate = &registry.by_index(def_index).params[param_index];
                let Some(socket) = candidate.socket.as_ref() else {
                    continue;
                };
                if channels_compatible(socket, pending_socket)
                    && sockets.can_connect(ty, pending_socket)
                {
                    matches.push((def_index, param_index));
                }
            }
        }
    }

    matches.sort_unstable();
    matches.dedup();

    let mut groups: Vec<CompatibleGroup> = Vec::new();
    for (def_index, param_index) in matches {
        let definition = registry.by_index(def_index);
        let port = CompatiblePort {
            kind: definition.kind.clone(),
            param: definition.params[param_index].id.clone(),
        };
        match groups.iter_mut().find(|g| g.category == definition.category) {
            Some(group) => group.ports.push(port),
            None => groups.push(CompatibleGroup {
                category: definition.category.clone(),
                ports: vec![port],
            }),
        }
    }

    Ok(groups)
}

fn channels_compatible(source: &SocketSpec, target: &SocketSpec) -> bool {
    source.channel == target.channel || source.bidirectional || target.bidirectional
}
