//! Parse phase: raw workflow bytes → JSON node objects + typed graph.

pub mod graph;
pub mod types;

pub use graph::WorkflowGraph;
pub use types::*;

use serde_json::Value;

use crate::error::ValidationError;

/// Decode a workflow document. The top level must be a JSON array; element
/// shape is checked later, per node.
pub fn parse(raw: &[u8]) -> Result<Vec<Value>, ValidationError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(ValidationError::parse(
            "P001",
            format!(
                "Workflow must be a JSON array of nodes, found {}",
                json_type_name(&other)
            ),
        )),
        Err(e) => Err(ValidationError::parse(
            "P001",
            format!("Failed to parse workflow JSON: {}", e),
        )),
    }
}

/// Collect the `id` strings of a document, or `None` if it is not a
/// well-formed array of objects.
pub fn node_id_strings(raw: &[u8]) -> Option<Vec<String>> {
    let items = parse(raw).ok()?;
    items
        .iter()
        .map(|item| {
            let object = item.as_object()?;
            Some(
                object
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )
        })
        .collect()
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
