use pipecore::{
    DataValue, ExpressionError, NodeId, NodeStatus, ParamValue, PathStep, RunSnapshot, Value,
};
use std::collections::HashMap;

/// A parsed reference expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `$('Node Label').path` — an upstream node's captured output
    Node { label: String, path: Vec<PathStep> },
    /// `input.path` — the node's own primary input
    Input { path: Vec<PathStep> },
    /// `trigger.path` — the run's invocation payload
    Trigger { path: Vec<PathStep> },
}

/// Everything a reference can resolve against for one node step
pub struct ResolveContext<'a> {
    pub snapshot: &'a RunSnapshot,
    /// Display label -> node id for the frozen topology
    pub labels: &'a HashMap<String, NodeId>,
    /// Value on the node's primary input edge
    pub direct_input: Option<&'a DataValue>,
    pub trigger: Option<&'a DataValue>,
}

/// Parse one reference expression (the text between `{{` and `}}`).
pub fn parse_reference(expr: &str) -> Result<Reference, ExpressionError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ExpressionError::Parse("empty expression".to_string()));
    }

    if let Some(rest) = expr.strip_prefix("$(") {
        let (label, rest) = parse_quoted(rest)?;
        let rest = rest
            .strip_prefix(')')
            .ok_or_else(|| ExpressionError::Parse(format!("expected ')' in '{expr}'")))?;
        return Ok(Reference::Node {
            label,
            path: parse_path(rest)?,
        });
    }

    if let Some(rest) = strip_head(expr, "input") {
        return Ok(Reference::Input {
            path: parse_path(rest)?,
        });
    }

    if let Some(rest) = strip_head(expr, "trigger") {
        return Ok(Reference::Trigger {
            path: parse_path(rest)?,
        });
    }

    Err(ExpressionError::Parse(format!(
        "unrecognized reference '{expr}'"
    )))
}

/// Match a head keyword only when followed by a path or nothing, so a
/// field named `inputs` is not mistaken for the `input` form.
fn strip_head<'a>(expr: &'a str, head: &str) -> Option<&'a str> {
    let rest = expr.strip_prefix(head)?;
    if rest.is_empty() || rest.starts_with('.') || rest.starts_with('[') {
        Some(rest)
    } else {
        None
    }
}

fn parse_quoted(input: &str) -> Result<(String, &str), ExpressionError> {
    let mut chars = input.chars();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"');
    let quote =
        quote.ok_or_else(|| ExpressionError::Parse("expected quoted node label".to_string()))?;
    let rest = &input[1..];
    let end = rest
        .find(quote)
        .ok_or_else(|| ExpressionError::Parse("unterminated node label".to_string()))?;
    Ok((rest[..end].to_string(), &rest[end + 1..]))
}

/// Parse a field path: `.name` steps and `[index]` steps, in any mix.
fn parse_path(mut rest: &str) -> Result<Vec<PathStep>, ExpressionError> {
    let mut steps = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(steps);
        }
        if let Some(after) = rest.strip_prefix('.') {
            let end = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(after.len());
            if end == 0 {
                return Err(ExpressionError::Parse("empty path segment".to_string()));
            }
            steps.push(PathStep::Field(after[..end].to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| ExpressionError::Parse("unterminated index".to_string()))?;
            let index: usize = after[..end]
                .trim()
                .parse()
                .map_err(|_| ExpressionError::Parse(format!("bad index '{}'", &after[..end])))?;
            steps.push(PathStep::Index(index));
            rest = &after[end + 1..];
        } else {
            return Err(ExpressionError::Parse(format!(
                "unexpected path syntax at '{rest}'"
            )));
        }
    }
}

/// Evaluate one reference expression to a value.
pub fn eval(expr: &str, ctx: &ResolveContext<'_>) -> Result<Value, ExpressionError> {
    let reference = parse_reference(expr)?;
    let (describe, base, path) = match &reference {
        Reference::Node { label, path } => {
            let node = *ctx
                .labels
                .get(label)
                .ok_or_else(|| ExpressionError::NodeNotFound(label.clone()))?;
            if ctx.snapshot.status(node) != NodeStatus::Completed {
                return Err(ExpressionError::NotExecuted(label.clone()));
            }
            let base = ctx
                .snapshot
                .data_output(node)
                .map(|d| d.value.clone())
                .unwrap_or(Value::Null);
            (format!("$('{label}')"), base, path)
        }
        Reference::Input { path } => {
            let base = ctx
                .direct_input
                .map(|d| d.value.clone())
                .unwrap_or(Value::Null);
            ("input".to_string(), base, path)
        }
        Reference::Trigger { path } => {
            let base = ctx.trigger.map(|d| d.value.clone()).unwrap_or(Value::Null);
            ("trigger".to_string(), base, path)
        }
    };

    navigate(&base, path, &describe)
}

/// Walk a field path. A missing step is PathNotPresent, which is distinct
/// from a null value legitimately stored at the path.
fn navigate(base: &Value, path: &[PathStep], reference: &str) -> Result<Value, ExpressionError> {
    let mut current = base;
    for (i, step) in path.iter().enumerate() {
        current = current
            .step(step)
            .ok_or_else(|| ExpressionError::PathNotPresent {
                reference: reference.to_string(),
                path: render_path(&path[..=i]),
            })?;
    }
    Ok(current.clone())
}

fn render_path(steps: &[PathStep]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            PathStep::Field(name) => {
                out.push('.');
                out.push_str(name);
            }
            PathStep::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Resolve a string containing `{{ ... }}` expressions. A string that is
/// exactly one expression yields the referenced value unchanged; mixed
/// text interpolates each match as a string.
pub fn resolve_template(template: &str, ctx: &ResolveContext<'_>) -> Result<Value, ExpressionError> {
    let trimmed = template.trim();
    if let Some(inner) = full_expression(trimmed) {
        return eval(inner, ctx);
    }

    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unbalanced braces pass through verbatim
            out.push_str(rest);
            return Ok(Value::String(out));
        };
        out.push_str(&rest[..start]);
        out.push_str(&eval(&after[..end], ctx)?.render());
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn full_expression(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

/// Resolve one bound parameter value. Literal strings may embed template
/// expressions; an expression binding must be a reference.
pub fn resolve_param(value: &ParamValue, ctx: &ResolveContext<'_>) -> Result<Value, ExpressionError> {
    match value {
        ParamValue::Literal(Value::String(s)) if s.contains("{{") => resolve_template(s, ctx),
        ParamValue::Literal(v) => Ok(v.clone()),
        ParamValue::Expression(s) => {
            if s.contains("{{") {
                resolve_template(s, ctx)
            } else {
                eval(s, ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipecore::{socket_types, SnapshotHandle};
    use uuid::Uuid;

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn fetch_output() -> Value {
        object(&[(
            "items",
            Value::Array(vec![
                object(&[("id", Value::Int(7))]),
                object(&[("id", Value::Int(9))]),
            ]),
        )])
    }

    async fn snapshot_with(label: &str, value: Value) -> (RunSnapshot, HashMap<String, NodeId>) {
        let node = Uuid::new_v4();
        let handle = SnapshotHandle::new(RunSnapshot::new(None));
        handle
            .record_outputs(
                node,
                HashMap::from([(
                    "output".to_string(),
                    DataValue::new(socket_types::JSON, value),
                )]),
            )
            .await;
        (handle.finish().await, HashMap::from([(label.to_string(), node)]))
    }

    #[test]
    fn parses_the_three_reference_forms() {
        assert_eq!(
            parse_reference("$('Fetch').items[0].id").unwrap(),
            Reference::Node {
                label: "Fetch".to_string(),
                path: vec![
                    PathStep::Field("items".into()),
                    PathStep::Index(0),
                    PathStep::Field("id".into()),
                ],
            }
        );
        assert_eq!(
            parse_reference("input.content").unwrap(),
            Reference::Input {
                path: vec![PathStep::Field("content".into())],
            }
        );
        assert_eq!(
            parse_reference("trigger").unwrap(),
            Reference::Trigger { path: vec![] }
        );
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(parse_reference("$(Fetch).x").is_err());
        assert!(parse_reference("inputs.content").is_err());
        assert!(parse_reference("$('Fetch'").is_err());
    }

    #[tokio::test]
    async fn named_node_and_direct_input_agree() {
        let (snapshot, labels) = snapshot_with("Fetch", fetch_output()).await;
        let direct = DataValue::new(socket_types::JSON, fetch_output());
        let ctx = ResolveContext {
            snapshot: &snapshot,
            labels: &labels,
            direct_input: Some(&direct),
            trigger: None,
        };

        let by_name = eval("$('Fetch').items[0].id", &ctx).unwrap();
        let by_input = eval("input.items[0].id", &ctx).unwrap();
        assert_eq!(by_name, Value::Int(7));
        assert_eq!(by_name, by_input);
    }

    #[tokio::test]
    async fn failure_kinds_are_distinguished() {
        let (snapshot, labels) = snapshot_with("Fetch", object(&[("x", Value::Null)])).await;
        let ctx = ResolveContext {
            snapshot: &snapshot,
            labels: &labels,
            direct_input: None,
            trigger: None,
        };

        assert!(matches!(
            eval("$('Missing').x", &ctx),
            Err(ExpressionError::NodeNotFound(_))
        ));
        assert!(matches!(
            eval("$('Fetch').y", &ctx),
            Err(ExpressionError::PathNotPresent { .. })
        ));
        // Null at the path is a valid result, not an error
        assert_eq!(eval("$('Fetch').x", &ctx).unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn not_yet_executed_is_its_own_failure() {
        let node = Uuid::new_v4();
        let snapshot = RunSnapshot::new(None);
        let labels = HashMap::from([("Later".to_string(), node)]);
        let ctx = ResolveContext {
            snapshot: &snapshot,
            labels: &labels,
            direct_input: None,
            trigger: None,
        };

        assert!(matches!(
            eval("$('Later').x", &ctx),
            Err(ExpressionError::NotExecuted(_))
        ));
    }

    #[tokio::test]
    async fn templates_interpolate_and_full_expressions_pass_raw() {
        let (snapshot, labels) = snapshot_with("Fetch", fetch_output()).await;
        let ctx = ResolveContext {
            snapshot: &snapshot,
            labels: &labels,
            direct_input: None,
            trigger: None,
        };

        let raw = resolve_template("{{ $('Fetch').items[1].id }}", &ctx).unwrap();
        assert_eq!(raw, Value::Int(9));

        let mixed = resolve_template("id={{ $('Fetch').items[1].id }}!", &ctx).unwrap();
        assert_eq!(mixed, Value::String("id=9!".to_string()));
    }
}
