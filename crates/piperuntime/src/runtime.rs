use crate::executor::{FlowExecutor, RunMode, RunOutcome};
use crate::registry::{BehaviorRegistry, DefinitionRegistry};
use crate::validator;
use pipecore::{
    DataValue, EdgeId, EventBus, Graph, GraphError, NodeId, PipelineError, PortRef, RunEvent,
    RunSnapshot, SocketRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Main entry point: registries plus executor plus the shared authoring
/// graph store. Registries are read-only once the runtime is built.
pub struct PipelineRuntime {
    definitions: Arc<DefinitionRegistry>,
    behaviors: Arc<BehaviorRegistry>,
    sockets: Arc<SocketRegistry>,
    executor: Arc<FlowExecutor>,
    event_bus: Arc<EventBus>,
    graphs: Arc<RwLock<HashMap<Uuid, Graph>>>,
}

impl PipelineRuntime {
    pub fn new(definitions: DefinitionRegistry, behaviors: BehaviorRegistry) -> Self {
        Self::with_config(definitions, behaviors, RuntimeConfig::default())
    }

    pub fn with_config(
        definitions: DefinitionRegistry,
        behaviors: BehaviorRegistry,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            definitions: Arc::new(definitions),
            behaviors: Arc::new(behaviors),
            sockets: Arc::new(SocketRegistry::new()),
            executor: Arc::new(FlowExecutor::new(config.max_parallel_nodes)),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            graphs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn definitions(&self) -> &Arc<DefinitionRegistry> {
        &self.definitions
    }

    pub fn sockets(&self) -> &Arc<SocketRegistry> {
        &self.sockets
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Store an authoring graph under an id
    pub async fn register_graph(&self, graph: Graph) -> Uuid {
        let id = Uuid::new_v4();
        self.graphs.write().await.insert(id, graph);
        id
    }

    pub async fn graph(&self, id: Uuid) -> Option<Graph> {
        self.graphs.read().await.get(&id).cloned()
    }

    /// Validated edge mutation on a stored graph. Rejection leaves the
    /// graph unchanged; an in-flight run is never affected since runs
    /// execute against their own topology snapshot.
    pub async fn connect(
        &self,
        graph_id: Uuid,
        source: PortRef,
        target: PortRef,
    ) -> Result<EdgeId, GraphError> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(&graph_id)
            .ok_or_else(|| GraphError::GraphNotFound(graph_id.to_string()))?;
        validator::connect(&self.definitions, &self.sockets, graph, source, target)
    }

    /// Full run to topological completion
    pub async fn run(
        &self,
        graph: &Graph,
        trigger: Option<DataValue>,
    ) -> Result<RunOutcome, PipelineError> {
        self.execute(graph, RunMode::Full, trigger, CancellationToken::new())
            .await
    }

    /// Partial run from one node down, ancestors seeded from a prior run
    pub async fn run_from(
        &self,
        graph: &Graph,
        start: NodeId,
        prior: RunSnapshot,
    ) -> Result<RunOutcome, PipelineError> {
        self.execute(
            graph,
            RunMode::FromNode { start, prior },
            None,
            CancellationToken::new(),
        )
        .await
    }

    /// Execute a single node against a prior run's inputs
    pub async fn run_single(
        &self,
        graph: &Graph,
        node: NodeId,
        prior: RunSnapshot,
    ) -> Result<RunOutcome, PipelineError> {
        self.execute(
            graph,
            RunMode::Single { node, prior },
            None,
            CancellationToken::new(),
        )
        .await
    }

    async fn execute(
        &self,
        graph: &Graph,
        mode: RunMode,
        trigger: Option<DataValue>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.executor
            .execute(
                graph,
                &self.definitions,
                &self.sockets,
                &self.behaviors,
                &self.event_bus,
                mode,
                trigger,
                cancel,
            )
            .await
    }

    /// Spawn a full run in the background with a cancellation handle
    pub fn start(&self, graph: Graph, trigger: Option<DataValue>) -> RunHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let definitions = self.definitions.clone();
        let behaviors = self.behaviors.clone();
        let sockets = self.sockets.clone();
        let executor = self.executor.clone();
        let event_bus = self.event_bus.clone();

        let task = tokio::spawn(async move {
            executor
                .execute(
                    &graph,
                    &definitions,
                    &sockets,
                    &behaviors,
                    &event_bus,
                    RunMode::Full,
                    trigger,
                    token,
                )
                .await
        });

        RunHandle { cancel, task }
    }
}

/// Handle for a background run
pub struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome, PipelineError>>,
}

impl RunHandle {
    /// Stop scheduling new nodes; in-flight behaviors finish or abort
    /// cooperatively via their context token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<RunOutcome, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Node(pipecore::NodeError::Execution(e.to_string())))?
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 10,
            event_buffer_size: 1000,
        }
    }
}
