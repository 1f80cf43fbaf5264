use crate::assembly;
use crate::expression::{self, ResolveContext};
use crate::registry::{BehaviorRegistry, DefinitionRegistry};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use pipecore::{
    socket_types, BehaviorContext, CapabilityMap, Channel, DataValue, EventBus, Graph, GraphError,
    NodeError, NodeFailure, NodeId, NodeStatus, ParamMode, ParamValue, PipelineError, RunEvent,
    RunSnapshot, SnapshotHandle, SocketRegistry, Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a run is seeded
pub enum RunMode {
    /// Start from trigger-kind nodes, run to topological completion
    Full,
    /// Re-run from one node down; ancestors are seeded from a prior
    /// run's snapshot table instead of re-executing
    FromNode { start: NodeId, prior: RunSnapshot },
    /// Execute one node only, resolving its direct inputs from a prior
    /// run's snapshot table
    Single { node: NodeId, prior: RunSnapshot },
}

/// Final state of one run
pub struct RunOutcome {
    pub snapshot: RunSnapshot,
    pub success: bool,
}

/// Executes the flow phase of a graph: breadth-first over flow-channel
/// edges, branch-parallel, against a topology frozen at run start.
pub struct FlowExecutor {
    max_parallel: usize,
}

type NodeResult = (NodeId, Result<pipecore::BehaviorOutput, NodeError>, u64);

enum Prepared {
    Task(JoinHandle<NodeResult>),
    /// Terminal without spawning (dead branch, resolution failure, ...)
    Settled,
}

impl FlowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self { max_parallel }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        graph: &Graph,
        registry: &DefinitionRegistry,
        sockets: &SocketRegistry,
        behaviors: &BehaviorRegistry,
        bus: &EventBus,
        mode: RunMode,
        trigger: Option<DataValue>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        // Topology snapshot: authoring edits after this point never
        // perturb the run.
        let graph = graph.clone();
        let start_time = Instant::now();

        // Build phase must finish before any flow-phase side effect.
        let capabilities = assembly::assemble(&graph, registry, behaviors).await?;

        let flow_nodes: HashSet<NodeId> = graph
            .nodes
            .iter()
            .filter(|n| {
                registry
                    .get(&n.kind)
                    .map(|d| {
                        matches!(
                            d.phase,
                            pipecore::ExecutionPhase::Flow | pipecore::ExecutionPhase::Hybrid
                        )
                    })
                    .unwrap_or(false)
            })
            .map(|n| n.id)
            .collect();

        let flow_edges: Vec<_> = graph
            .edges
            .iter()
            .filter(|e| {
                e.channel == Channel::Flow
                    && flow_nodes.contains(&e.source.node)
                    && flow_nodes.contains(&e.target.node)
            })
            .cloned()
            .collect();

        let (active, trigger, prior) = match mode {
            RunMode::Full => (
                full_run_scope(&graph, registry, &flow_nodes, &flow_edges),
                trigger,
                None,
            ),
            RunMode::FromNode { start, prior } => {
                let mut active = HashSet::from([start]);
                descendants(start, &flow_edges, &mut active);
                let trigger = trigger.or_else(|| prior.trigger.clone());
                (active, trigger, Some(prior))
            }
            RunMode::Single { node, prior } => {
                let trigger = trigger.or_else(|| prior.trigger.clone());
                (HashSet::from([node]), trigger, Some(prior))
            }
        };

        // Cycle check over the active flow subgraph
        check_acyclic(&active, &flow_edges)?;

        let snapshot = SnapshotHandle::new(RunSnapshot::new(trigger.clone()));
        if let Some(prior) = &prior {
            for node in &flow_nodes {
                if !active.contains(node) {
                    snapshot.seed_from(prior, *node).await;
                }
            }
        }
        let run_id = snapshot.read().await.run_id;
        let labels = graph.labels();

        bus.emit(RunEvent::RunStarted {
            run_id,
            timestamp: Utc::now(),
        });
        tracing::info!(%run_id, nodes = active.len(), "starting flow run");

        let capabilities = Arc::new(capabilities);
        let mut done: HashSet<NodeId> = HashSet::new();
        let mut scheduled: HashSet<NodeId> = HashSet::new();
        let mut running: FuturesUnordered<BoxFuture<'static, NodeResult>> =
            FuturesUnordered::new();

        loop {
            let mut progressed = false;

            if !cancel.is_cancelled() {
                for node_id in find_ready(&active, &flow_edges, &done, &scheduled) {
                    if running.len() >= self.max_parallel {
                        break;
                    }
                    scheduled.insert(node_id);
                    progressed = true;

                    let prepared = self
                        .prepare_node(
                            node_id,
                            &graph,
                            registry,
                            sockets,
                            behaviors,
                            bus,
                            &snapshot,
                            run_id,
                            &labels,
                            &capabilities,
                            &trigger,
                            &cancel,
                        )
                        .await;

                    match prepared {
                        Prepared::Task(handle) => {
                            // A panicked behavior settles as that node's
                            // failure, never as a silently dropped result.
                            running.push(Box::pin(async move {
                                match handle.await {
                                    Ok(result) => result,
                                    Err(e) => (
                                        node_id,
                                        Err(NodeError::Execution(format!(
                                            "behavior task failed: {e}"
                                        ))),
                                        0,
                                    ),
                                }
                            }));
                        }
                        Prepared::Settled => {
                            done.insert(node_id);
                        }
                    }
                }
            }

            if running.is_empty() {
                if !progressed {
                    break;
                }
                continue;
            }

            if let Some((node_id, result, duration_ms)) = running.next().await {
                match result {
                    Ok(output) => {
                        tracing::info!(node = %node_id, duration_ms, "node completed");
                        snapshot.record_outputs(node_id, output.outputs.clone()).await;
                        bus.emit(RunEvent::NodeCompleted {
                            run_id,
                            node_id,
                            outputs: output.outputs,
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                    }
                    Err(error) => {
                        tracing::warn!(node = %node_id, %error, "node failed");
                        let failure = match &error {
                            NodeError::Cancelled => NodeFailure::Cancelled,
                            NodeError::Expression(e) => NodeFailure::Expression {
                                message: e.to_string(),
                            },
                            other => NodeFailure::Runtime {
                                message: other.to_string(),
                            },
                        };
                        snapshot.record_failure(node_id, failure).await;
                        bus.emit(RunEvent::NodeFailed {
                            run_id,
                            node_id,
                            error: error.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                }
                done.insert(node_id);
            }
        }

        // Whatever never got to run is skipped, not silently missing.
        for node_id in &active {
            if !done.contains(node_id) {
                snapshot.mark_skipped(*node_id).await;
                bus.emit(RunEvent::NodeSkipped {
                    run_id,
                    node_id: *node_id,
                    timestamp: Utc::now(),
                });
            }
        }

        let final_snapshot = snapshot.finish().await;
        let success = !cancel.is_cancelled()
            && !final_snapshot
                .nodes
                .values()
                .any(|s| s.status == NodeStatus::Error);

        bus.emit(RunEvent::RunCompleted {
            run_id,
            success,
            duration_ms: start_time.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        Ok(RunOutcome {
            snapshot: final_snapshot,
            success,
        })
    }

    /// Gather a node's inputs and field values and spawn its behavior, or
    /// settle it immediately (skipped dead branch, resolution failure).
    #[allow(clippy::too_many_arguments)]
    async fn prepare_node(
        &self,
        node_id: NodeId,
        graph: &Graph,
        registry: &DefinitionRegistry,
        sockets: &SocketRegistry,
        behaviors: &BehaviorRegistry,
        bus: &EventBus,
        snapshot: &SnapshotHandle,
        run_id: pipecore::RunId,
        labels: &HashMap<String, NodeId>,
        capabilities: &Arc<CapabilityMap>,
        trigger: &Option<DataValue>,
        cancel: &CancellationToken,
    ) -> Prepared {
        let fail = |failure: NodeFailure, message: String| async move {
            snapshot.record_failure(node_id, failure).await;
            bus.emit(RunEvent::NodeFailed {
                run_id,
                node_id,
                error: message,
                timestamp: Utc::now(),
            });
            Prepared::Settled
        };

        let Some(node) = graph.find_node(node_id) else {
            return fail(
                NodeFailure::Runtime {
                    message: "node missing from topology snapshot".to_string(),
                },
                "node missing from topology snapshot".to_string(),
            )
            .await;
        };
        let definition = match registry.definition(&node.kind) {
            Ok(d) => d,
            Err(e) => return fail(
                NodeFailure::Runtime {
                    message: e.to_string(),
                },
                e.to_string(),
            )
            .await,
        };
        let Some(behavior) = behaviors.get(&node.kind) else {
            let message = format!("no behavior registered for kind '{}'", node.kind);
            return fail(
                NodeFailure::Runtime {
                    message: message.clone(),
                },
                message,
            )
            .await;
        };

        // Gather connected inputs, coercing to the declared port type.
        // The untyped data spine passes through unconverted.
        let mut inputs: HashMap<String, DataValue> = HashMap::new();
        let mut has_flow_inputs = false;
        {
            let guard = snapshot.read().await;
            for edge in graph.incoming(node_id, Some(Channel::Flow), None) {
                has_flow_inputs = true;
                let Some(value) = guard
                    .outputs(edge.source.node)
                    .and_then(|outputs| outputs.get(&edge.source.port))
                else {
                    continue;
                };

                let declared = definition
                    .find_param(&edge.target.port)
                    .and_then(|p| p.socket.as_ref())
                    .map(|s| s.ty.clone());
                let value = match declared {
                    Some(ty)
                        if ty.as_str() != socket_types::DATA
                            && value.ty.as_str() != socket_types::DATA =>
                    {
                        sockets
                            .coerce(value.clone(), &ty)
                            .unwrap_or_else(|_| value.clone())
                    }
                    _ => value.clone(),
                };
                inputs.insert(edge.target.port.clone(), value);
            }
        }

        // Dead branch: upstream produced nothing for this node this run
        if has_flow_inputs && inputs.is_empty() && !definition.trigger {
            snapshot.mark_skipped(node_id).await;
            bus.emit(RunEvent::NodeSkipped {
                run_id,
                node_id,
                timestamp: Utc::now(),
            });
            return Prepared::Settled;
        }

        // Resolve constant/hybrid field values. A connected hybrid port is
        // satisfied by its wire; expression and inline values come after.
        let resolved_snapshot = snapshot.finish().await;
        let ctx = ResolveContext {
            snapshot: &resolved_snapshot,
            labels,
            direct_input: inputs.get("input"),
            trigger: trigger.as_ref(),
        };

        let mut values: HashMap<String, Value> = HashMap::new();
        for param in &definition.params {
            if !matches!(param.mode, ParamMode::Constant | ParamMode::Hybrid) {
                continue;
            }
            if param.mode == ParamMode::Hybrid && inputs.contains_key(&param.id) {
                continue;
            }
            let bound = node
                .values
                .get(&param.id)
                .cloned()
                .or_else(|| param.default.clone().map(ParamValue::Literal));
            let Some(bound) = bound else { continue };

            match expression::resolve_param(&bound, &ctx) {
                Ok(value) => {
                    values.insert(param.id.clone(), value);
                }
                Err(e) => {
                    return fail(
                        NodeFailure::Expression {
                            message: e.to_string(),
                        },
                        e.to_string(),
                    )
                    .await;
                }
            }
        }

        snapshot.set_status(node_id, NodeStatus::Running).await;
        bus.emit(RunEvent::NodeStarted {
            run_id,
            node_id,
            kind: node.kind.clone(),
            timestamp: Utc::now(),
        });

        let ctx = BehaviorContext::new(
            node_id,
            inputs,
            values,
            capabilities.get(&node_id).cloned().unwrap_or_default(),
            trigger.clone(),
            bus.create_emitter(run_id, node_id),
            cancel.child_token(),
            snapshot.clone(),
        );

        Prepared::Task(tokio::spawn(async move {
            let start = Instant::now();
            let result = behavior.execute(ctx).await;
            (node_id, result, start.elapsed().as_millis() as u64)
        }))
    }
}

/// Full-run scope: the flow component(s) reachable from trigger-kind
/// nodes, so structurally attached islands never execute as independent
/// roots. With no trigger kinds the whole flow subgraph runs.
fn full_run_scope(
    graph: &Graph,
    registry: &DefinitionRegistry,
    flow_nodes: &HashSet<NodeId>,
    flow_edges: &[pipecore::FlowEdge],
) -> HashSet<NodeId> {
    let trigger_ids: Vec<NodeId> = graph
        .nodes
        .iter()
        .filter(|n| {
            flow_nodes.contains(&n.id)
                && registry.get(&n.kind).map(|d| d.trigger).unwrap_or(false)
        })
        .map(|n| n.id)
        .collect();

    if trigger_ids.is_empty() {
        return flow_nodes.clone();
    }

    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in flow_edges {
        adjacency
            .entry(edge.source.node)
            .or_default()
            .push(edge.target.node);
        adjacency
            .entry(edge.target.node)
            .or_default()
            .push(edge.source.node);
    }

    let mut active = HashSet::new();
    let mut queue: Vec<NodeId> = trigger_ids;
    while let Some(node) = queue.pop() {
        if !active.insert(node) {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&node) {
            for neighbor in neighbors {
                if !active.contains(neighbor) {
                    queue.push(*neighbor);
                }
            }
        }
    }
    active
}

fn descendants(start: NodeId, flow_edges: &[pipecore::FlowEdge], out: &mut HashSet<NodeId>) {
    let mut queue = vec![start];
    while let Some(node) = queue.pop() {
        for edge in flow_edges.iter().filter(|e| e.source.node == node) {
            if out.insert(edge.target.node) {
                queue.push(edge.target.node);
            }
        }
    }
}

fn check_acyclic(
    active: &HashSet<NodeId>,
    flow_edges: &[pipecore::FlowEdge],
) -> Result<(), GraphError> {
    let mut dag: DiGraph<NodeId, ()> = DiGraph::new();
    let mut indices = HashMap::new();
    for node in active {
        indices.insert(*node, dag.add_node(*node));
    }
    for edge in flow_edges {
        if let (Some(from), Some(to)) = (
            indices.get(&edge.source.node),
            indices.get(&edge.target.node),
        ) {
            dag.add_edge(*from, *to, ());
        }
    }
    toposort(&dag, None).map(|_| ()).map_err(|_| GraphError::Cycle)
}

/// Nodes whose in-scope predecessors have all reached a terminal state.
/// Seeded ancestors (outside the active set) count as satisfied.
fn find_ready(
    active: &HashSet<NodeId>,
    flow_edges: &[pipecore::FlowEdge],
    done: &HashSet<NodeId>,
    scheduled: &HashSet<NodeId>,
) -> Vec<NodeId> {
    let mut ready = Vec::new();
    for node in active {
        if scheduled.contains(node) {
            continue;
        }
        let blocked = flow_edges.iter().any(|e| {
            e.target.node == *node && active.contains(&e.source.node) && !done.contains(&e.source.node)
        });
        if !blocked {
            ready.push(*node);
        }
    }
    ready.sort_unstable();
    ready
}
