//! Edits on a stored workflow document (a JSON array of node objects).

use serde_json::{Value, json};
use uuid::Uuid;

use crate::parse::NodeKind;

/// Fields that point at another node and get nulled when it is deleted.
pub const REFERENCE_FIELDS: [&str; 3] = ["next", "nextTrue", "nextFalse"];

/// A freshly created node: id, type, and the default label.
pub fn new_node(kind: NodeKind, id: Uuid) -> Value {
    json!({
        "id": id,
        "type": kind.as_str(),
        "label": kind.default_label(),
    })
}

/// `content` with `node` appended. Anything but an array is treated as empty.
pub fn append_node(content: Option<&Value>, node: Value) -> Value {
    let mut nodes = match content {
        Some(Value::Array(nodes)) => nodes.clone(),
        _ => Vec::new(),
    };
    nodes.push(node);
    Value::Array(nodes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub content: Value,
    /// Type of the removed node, if it had a recognised one.
    pub removed_kind: Option<NodeKind>,
}

/// Remove the node with `node_id` and null every reference field pointing
/// at it, leaving the rest of each node intact. `None` if no node matched.
pub fn remove_node(content: &Value, node_id: Uuid) -> Option<Removal> {
    let Value::Array(nodes) = content else {
        return None;
    };

    let (removed, kept): (Vec<&Value>, Vec<&Value>) =
        nodes.iter().partition(|node| has_id(node, node_id));
    let first = removed.first()?;
    let removed_kind = first
        .get("type")
        .and_then(Value::as_str)
        .and_then(NodeKind::from_name);

    let kept = kept
        .into_iter()
        .map(|node| {
            let mut node = node.clone();
            if let Some(fields) = node.as_object_mut() {
                for field in REFERENCE_FIELDS {
                    if fields.get(field).is_some_and(|v| points_at(v, node_id)) {
                        fields.insert(field.to_string(), Value::Null);
                    }
                }
            }
            node
        })
        .collect();

    Some(Removal {
        content: Value::Array(kept),
        removed_kind,
    })
}

fn has_id(node: &Value, node_id: Uuid) -> bool {
    node.get("id").is_some_and(|v| points_at(v, node_id))
}

fn points_at(value: &Value, node_id: Uuid) -> bool {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .is_some_and(|id| id == node_id)
}
