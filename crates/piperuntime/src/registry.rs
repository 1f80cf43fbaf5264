use pipecore::{
    Behavior, DefinitionError, FlowNode, NodeDefinition, NodeId, ParamValue, SocketType,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Immutable catalog of node kinds. Populated once at startup, read-only
/// afterwards behind an `Arc`.
pub struct DefinitionRegistry {
    definitions: Vec<NodeDefinition>,
    by_kind: HashMap<String, usize>,
    /// Declared/accepted type -> (definition index, parameter index) of
    /// every target-capable port. Precomputed so the reverse-compatibility
    /// search never scans the whole catalog per interaction.
    target_index: HashMap<SocketType, Vec<(usize, usize)>>,
    /// Declared type -> source-capable ports, for the "drag from an
    /// input" direction of the same search.
    source_index: HashMap<SocketType, Vec<(usize, usize)>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            by_kind: HashMap::new(),
            target_index: HashMap::new(),
            source_index: HashMap::new(),
        }
    }

    /// Register a node kind. Fails when the kind id already exists, a
    /// parameter id repeats, or an input/output parameter has no socket.
    pub fn register(&mut self, definition: NodeDefinition) -> Result<(), DefinitionError> {
        if self.by_kind.contains_key(&definition.kind) {
            return Err(DefinitionError::DuplicateKind(definition.kind));
        }

        let mut seen = std::collections::HashSet::new();
        for param in &definition.params {
            if !seen.insert(param.id.as_str()) {
                return Err(DefinitionError::DuplicateParameter {
                    kind: definition.kind.clone(),
                    param: param.id.clone(),
                });
            }
            let connectable = matches!(
                param.mode,
                pipecore::ParamMode::Input | pipecore::ParamMode::Output
            );
            if connectable && param.socket.is_none() {
                return Err(DefinitionError::MissingSocket {
                    kind: definition.kind.clone(),
                    param: param.id.clone(),
                });
            }
        }

        tracing::info!(kind = %definition.kind, "registering node kind");

        let def_index = self.definitions.len();
        for (param_index, param) in definition.params.iter().enumerate() {
            let Some(socket) = &param.socket else {
                continue;
            };
            if param.can_target() {
                self.target_index
                    .entry(socket.ty.clone())
                    .or_default()
                    .push((def_index, param_index));
                for extra in &socket.accepts {
                    self.target_index
                        .entry(extra.clone())
                        .or_default()
                        .push((def_index, param_index));
                }
            }
            if param.can_source() {
                self.source_index
                    .entry(socket.ty.clone())
                    .or_default()
                    .push((def_index, param_index));
            }
        }

        self.by_kind.insert(definition.kind.clone(), def_index);
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&NodeDefinition> {
        self.by_kind.get(kind).map(|i| &self.definitions[*i])
    }

    pub fn definition(&self, kind: &str) -> Result<&NodeDefinition, DefinitionError> {
        self.get(kind)
            .ok_or_else(|| DefinitionError::UnknownKind(kind.to_string()))
    }

    /// Build a FlowNode of the given kind with every declared default
    /// populated. Generates a fresh node id (and a hook id for kinds that
    /// require one) when none is supplied. The instance stays unlabelled
    /// so two nodes of one kind never shadow each other in label lookup;
    /// naming is the caller's concern.
    pub fn instantiate(&self, kind: &str, id: Option<NodeId>) -> Result<FlowNode, DefinitionError> {
        let definition = self.definition(kind)?;

        let mut node = FlowNode::new(kind);
        if let Some(id) = id {
            node.id = id;
        }

        for param in &definition.params {
            if let Some(default) = &param.default {
                node.values
                    .insert(param.id.clone(), ParamValue::Literal(default.clone()));
            }
        }

        if definition.requires_hook_id && node.hook_id.is_none() {
            node.hook_id = Some(Uuid::new_v4().simple().to_string());
        }

        Ok(node)
    }

    /// Declaration-order listing for one palette category
    pub fn list_by_category(&self, category: &str) -> Vec<&NodeDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Categories in declaration order, deduplicated
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.definitions
            .iter()
            .filter(|d| seen.insert(d.category.as_str()))
            .map(|d| d.category.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.definitions.iter()
    }

    pub(crate) fn target_index(&self) -> &HashMap<SocketType, Vec<(usize, usize)>> {
        &self.target_index
    }

    pub(crate) fn source_index(&self) -> &HashMap<SocketType, Vec<(usize, usize)>> {
        &self.source_index
    }

    pub(crate) fn by_index(&self, index: usize) -> &NodeDefinition {
        &self.definitions[index]
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime behaviors keyed by kind id, supplied once at startup
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Arc<dyn Behavior>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
        }
    }

    pub fn register(&mut self, behavior: Arc<dyn Behavior>) {
        let kind = behavior.kind().to_string();
        tracing::info!(%kind, "registering behavior");
        self.behaviors.insert(kind, behavior);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Behavior>> {
        self.behaviors.get(kind).cloned()
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
