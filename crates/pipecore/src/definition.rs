use crate::socket::SocketType;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// How a parameter takes its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    /// Fixed field value, never connectable
    Constant,
    /// Literal value or live connected value, chosen by connection presence
    Hybrid,
    /// Connected input port
    Input,
    /// Connected output port
    Output,
}

/// Edge classification: flow drives execution order, link is structural
/// composition resolved once before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Flow,
    Link,
}

/// Which execution phases a node kind contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Build phase only (e.g. a toolset provider)
    Structural,
    /// Flow phase only
    Flow,
    /// Both phases (e.g. an agent usable as a tool and in a pipeline)
    Hybrid,
}

/// What happens when a new edge would exceed a source port's cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExceedMax {
    Reject,
    Replace,
}

/// Typed attachment point on a parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketSpec {
    #[serde(rename = "type")]
    pub ty: SocketType,
    pub channel: Channel,
    /// Port participates in both channels (e.g. an agent port that is
    /// wired structurally but also carries pipeline data)
    #[serde(default)]
    pub bidirectional: bool,
    /// Target side: accept more than one incoming edge
    #[serde(default)]
    pub multiple: bool,
    /// Source side: cap on outgoing edges (None = unlimited)
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default = "OnExceedMax::reject")]
    pub on_exceed_max: OnExceedMax,
    /// Extra producer types accepted besides `ty` and its coercions
    #[serde(default)]
    pub accepts: Vec<SocketType>,
    /// Opaque presentation metadata (shape, color); never interpreted here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<serde_json::Value>,
}

impl OnExceedMax {
    fn reject() -> Self {
        OnExceedMax::Reject
    }
}

impl SocketSpec {
    pub fn new(ty: impl Into<SocketType>, channel: Channel) -> Self {
        Self {
            ty: ty.into(),
            channel,
            bidirectional: false,
            multiple: false,
            max_connections: None,
            on_exceed_max: OnExceedMax::Reject,
            accepts: Vec::new(),
            ui: None,
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn max_connections(mut self, max: u32, on_exceed: OnExceedMax) -> Self {
        self.max_connections = Some(max);
        self.on_exceed_max = on_exceed;
        self
    }

    pub fn accepts(mut self, ty: impl Into<SocketType>) -> Self {
        self.accepts.push(ty.into());
        self
    }
}

/// Visibility condition keyed on another parameter's connection state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibleWhen {
    pub param: String,
    pub connected: bool,
}

/// One field of a node kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub mode: ParamMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<SocketSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<VisibleWhen>,
}

impl Parameter {
    pub fn constant(id: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            mode: ParamMode::Constant,
            socket: None,
            default: Some(default.into()),
            visible_when: None,
        }
    }

    pub fn hybrid(id: impl Into<String>, socket: SocketSpec, default: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            mode: ParamMode::Hybrid,
            socket: Some(socket),
            default: Some(default.into()),
            visible_when: None,
        }
    }

    pub fn input(id: impl Into<String>, socket: SocketSpec) -> Self {
        Self {
            id: id.into(),
            mode: ParamMode::Input,
            socket: Some(socket),
            default: None,
            visible_when: None,
        }
    }

    pub fn output(id: impl Into<String>, socket: SocketSpec) -> Self {
        Self {
            id: id.into(),
            mode: ParamMode::Output,
            socket: Some(socket),
            default: None,
            visible_when: None,
        }
    }

    pub fn visible_when(mut self, param: impl Into<String>, connected: bool) -> Self {
        self.visible_when = Some(VisibleWhen {
            param: param.into(),
            connected,
        });
        self
    }

    /// Can this port be the source endpoint of an edge?
    pub fn can_source(&self) -> bool {
        match self.mode {
            ParamMode::Output => true,
            ParamMode::Hybrid => self
                .socket
                .as_ref()
                .map(|s| s.bidirectional)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Can this port be the target endpoint of an edge?
    pub fn can_target(&self) -> bool {
        match self.mode {
            ParamMode::Input => true,
            ParamMode::Hybrid => self.socket.is_some(),
            _ => false,
        }
    }
}

/// Immutable description of a node kind: ordered parameters plus its
/// execution-phase classification. Registered once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub kind: String,
    pub label: String,
    pub category: String,
    pub phase: ExecutionPhase,
    pub params: Vec<Parameter>,
    /// Trigger kinds seed a full run and receive the invocation payload
    #[serde(default)]
    pub trigger: bool,
    /// Kind needs a caller-visible hook identifier (e.g. webhook path)
    #[serde(default)]
    pub requires_hook_id: bool,
}

impl NodeDefinition {
    pub fn new(
        kind: impl Into<String>,
        label: impl Into<String>,
        category: impl Into<String>,
        phase: ExecutionPhase,
    ) -> Self {
        Self {
            kind: kind.into(),
            label: label.into(),
            category: category.into(),
            phase,
            params: Vec::new(),
            trigger: false,
            requires_hook_id: false,
        }
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    pub fn requires_hook_id(mut self) -> Self {
        self.requires_hook_id = true;
        self
    }

    pub fn find_param(&self, id: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.id == id)
    }
}
