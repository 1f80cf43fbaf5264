use thiserror::Error;

/// Top-level error for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("build phase failed: {0}")]
    Build(#[from] BuildError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Registration-time failures. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("node kind already registered: {0}")]
    DuplicateKind(String),

    #[error("duplicate parameter '{param}' on kind '{kind}'")]
    DuplicateParameter { kind: String, param: String },

    #[error("parameter '{param}' on kind '{kind}' has mode input/output but no socket")]
    MissingSocket { kind: String, param: String },

    #[error("unknown node kind: {0}")]
    UnknownKind(String),
}

/// Why a proposed edge was refused. Checks apply in this order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("port '{port}' on kind '{kind}' cannot act as a source")]
    NotSourceCapable { kind: String, port: String },

    #[error("port '{port}' on kind '{kind}' cannot act as a target")]
    NotTargetCapable { kind: String, port: String },

    #[error("channel mismatch: {from:?} source cannot feed {to:?} target")]
    ChannelMismatch {
        from: crate::definition::Channel,
        to: crate::definition::Channel,
    },

    #[error("type '{from}' is not connectable to '{to}'")]
    TypeMismatch { from: String, to: String },

    #[error("target port '{port}' already has an incoming edge")]
    TargetOccupied { port: String },

    #[error("source port '{port}' is at its connection cap")]
    SourceAtCapacity { port: String },
}

/// Graph mutation and lookup failures. Mutations are refused with the
/// prior state unchanged.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("connection rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("graph not found: {0}")]
    GraphNotFound(String),

    #[error("unknown port '{port}' on kind '{kind}'")]
    UnknownPort { kind: String, port: String },

    #[error("cycle detected in flow graph")]
    Cycle,

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Build-phase (link resolution) failures. Fatal to that run only,
/// reported before any flow-phase side effect.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("link edge references missing node: {0}")]
    MissingNode(String),

    #[error("no behavior registered for kind: {0}")]
    NoBehavior(String),

    #[error("circular composition through node: {0}")]
    CircularComposition(String),

    #[error("materialize failed on node {node}: {source}")]
    Materialize {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Runtime failure of one node, confined to it and its dependents
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("missing required field: {0}")]
    MissingValue(String),

    #[error("no implicit coercion from '{from}' to '{to}'")]
    Coercion { from: String, to: String },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("kind '{0}' has no flow-phase behavior")]
    NotExecutable(String),

    #[error("kind '{0}' has no build-phase contribution")]
    NotStructural(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("cancelled")]
    Cancelled,
}

/// Failure while resolving a reference expression. Treated as the
/// consuming node's runtime error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("no node labelled '{0}' in this graph")]
    NodeNotFound(String),

    #[error("node '{0}' has not executed in this run")]
    NotExecuted(String),

    #[error("path '{path}' not present in output of '{reference}'")]
    PathNotPresent { reference: String, path: String },

    #[error("malformed expression: {0}")]
    Parse(String),
}
