use crate::definition::SocketSpec;
use crate::error::NodeError;
use crate::value::{DataValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a socket type (e.g. "string", "message", "tools")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketType(String);

impl SocketType {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The wildcard type connects in both directions without conversion.
    pub fn is_any(&self) -> bool {
        self.0 == socket_types::ANY
    }
}

impl From<&str> for SocketType {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SocketType {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known socket type ids
pub mod socket_types {
    pub const ANY: &str = "any";
    pub const DATA: &str = "data";
    pub const STRING: &str = "string";
    pub const TEXT: &str = "text";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const BOOLEAN: &str = "boolean";
    pub const JSON: &str = "json";
    pub const MESSAGE: &str = "message";
    pub const DOCUMENT: &str = "document";
    pub const AGENT: &str = "agent";
    pub const TOOLS: &str = "tools";
    pub const ERROR: &str = "error";
}

type Coercer = fn(&Value) -> Value;

/// Registry of implicit coercions between socket types.
///
/// The relation is asymmetric: registering int -> float says nothing
/// about float -> int. The same table gates editor-time connection
/// legality and performs the runtime conversion when a value arrives at
/// a port declared with a different type.
pub struct SocketRegistry {
    coercions: HashMap<(SocketType, SocketType), Coercer>,
}

impl SocketRegistry {
    /// Empty registry, no coercions beyond identity and `any`.
    pub fn empty() -> Self {
        Self {
            coercions: HashMap::new(),
        }
    }

    /// Registry seeded with the built-in coercion table.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Numeric widening
        registry.register(socket_types::INT, socket_types::FLOAT, int_to_float);
        // Primitives -> string
        registry.register(socket_types::INT, socket_types::STRING, scalar_to_string);
        registry.register(socket_types::FLOAT, socket_types::STRING, scalar_to_string);
        registry.register(socket_types::BOOLEAN, socket_types::STRING, scalar_to_string);
        // string <-> text (identity, retype only)
        registry.register(socket_types::STRING, socket_types::TEXT, identity);
        registry.register(socket_types::TEXT, socket_types::STRING, identity);
        // Structured -> string/text
        registry.register(socket_types::JSON, socket_types::STRING, json_compact);
        registry.register(socket_types::JSON, socket_types::TEXT, json_pretty);
        // Message unpacking
        registry.register(socket_types::MESSAGE, socket_types::TEXT, content_field);
        registry.register(socket_types::MESSAGE, socket_types::STRING, content_field);
        registry.register(socket_types::MESSAGE, socket_types::JSON, identity);
        // Document unpacking
        registry.register(socket_types::DOCUMENT, socket_types::TEXT, text_field);
        registry.register(socket_types::DOCUMENT, socket_types::JSON, identity);
        // An agent may be attached where tools are expected, never the reverse
        registry.register(socket_types::AGENT, socket_types::TOOLS, identity);

        registry
    }

    pub fn register(
        &mut self,
        from: impl Into<SocketType>,
        to: impl Into<SocketType>,
        converter: Coercer,
    ) {
        self.coercions.insert((from.into(), to.into()), converter);
    }

    /// The asymmetric coercion relation. Total and deterministic;
    /// unregistered pairs are simply not coercible.
    pub fn can_coerce(&self, from: &SocketType, to: &SocketType) -> bool {
        if from == to || from.is_any() || to.is_any() {
            return true;
        }
        self.coercions.contains_key(&(from.clone(), to.clone()))
    }

    /// True iff a producer of `producer` may connect to an input declared
    /// by `spec`: declared-type equality, the explicit extra-accepted
    /// list, or a registered coercion. Fails closed for unknown types.
    pub fn can_connect(&self, producer: &SocketType, spec: &SocketSpec) -> bool {
        if spec.accepts.iter().any(|accepted| accepted == producer) {
            return true;
        }
        self.can_coerce(producer, &spec.ty)
    }

    /// Convert a value to the target type. Returns the original when the
    /// types already match; errors when no coercion path exists.
    pub fn coerce(&self, value: DataValue, target: &SocketType) -> Result<DataValue, NodeError> {
        if &value.ty == target || target.is_any() {
            return Ok(value);
        }
        if value.ty.is_any() {
            return Ok(DataValue {
                ty: target.clone(),
                value: value.value,
            });
        }

        let converter = self
            .coercions
            .get(&(value.ty.clone(), target.clone()))
            .ok_or_else(|| NodeError::Coercion {
                from: value.ty.to_string(),
                to: target.to_string(),
            })?;

        Ok(DataValue {
            ty: target.clone(),
            value: converter(&value.value),
        })
    }
}

impl Default for SocketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Converters assume the source type is correct; the table only maps
// valid pairs.

fn identity(value: &Value) -> Value {
    value.clone()
}

fn int_to_float(value: &Value) -> Value {
    match value {
        Value::Int(n) => Value::Float(*n as f64),
        other => other.clone(),
    }
}

fn scalar_to_string(value: &Value) -> Value {
    Value::String(value.render())
}

fn json_compact(value: &Value) -> Value {
    Value::String(serde_json::to_string(value).unwrap_or_default())
}

fn json_pretty(value: &Value) -> Value {
    Value::String(serde_json::to_string_pretty(value).unwrap_or_default())
}

fn content_field(value: &Value) -> Value {
    match value {
        Value::Object(map) => map.get("content").cloned().unwrap_or(Value::Null),
        other => Value::String(other.render()),
    }
}

fn text_field(value: &Value) -> Value {
    match value {
        Value::Object(map) => map.get("text").cloned().unwrap_or(Value::Null),
        other => Value::String(other.render()),
    }
}
