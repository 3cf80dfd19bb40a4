//! Per-node factory: raw JSON object → typed `Node`.
//!
//! Dispatches on the `type` tag, rejects fields outside the variant's
//! allow-list, and resolves reference fields against the document's node map.
//! Every defect is pushed to the caller's error list; a node is still returned
//! whenever its id and type are usable so later graph rules can run.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorKind, ValidationError};
use crate::parse::json_type_name;
use crate::parse::types::*;
use crate::validate::condition;

/// Every node object in the document keyed by its (first) id.
pub type NodeMap<'a> = HashMap<Uuid, &'a RawNode>;

/// Build every node of the document, in order, skipping the ones whose id or
/// type cannot be determined.
pub fn build_nodes(items: &[Value], nodes: &NodeMap, errors: &mut Vec<ValidationError>) -> Vec<Node> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| build_node(index, item, nodes, errors))
        .collect()
}

/// Validate a single node. Returns the typed node when its id and type are
/// usable, even if other fields were rejected.
pub fn build_node(
    index: usize,
    item: &Value,
    nodes: &NodeMap,
    errors: &mut Vec<ValidationError>,
) -> Option<Node> {
    let Some(raw) = item.as_object() else {
        errors.push(ValidationError::node(
            "N001",
            ErrorKind::Structural,
            format!(
                "Node at index {} must be a JSON object, found {}",
                index,
                json_type_name(item)
            ),
            None,
        ));
        return None;
    };

    let id = node_id(index, raw, errors)?;
    let kind = node_kind(index, id, raw, errors)?;

    let label = match raw.get("label") {
        Some(Value::String(label)) => label.clone(),
        Some(other) => {
            errors.push(ValidationError::node(
                "N004",
                ErrorKind::Structural,
                format!(
                    "Node '{}' label must be a string, found {}",
                    id,
                    json_type_name(other)
                ),
                Some(id),
            ));
            String::new()
        }
        None => {
            errors.push(ValidationError::node(
                "N004",
                ErrorKind::Structural,
                format!("Node '{}' is missing 'label'", id),
                Some(id),
            ));
            String::new()
        }
    };

    check_allowed_fields(id, kind, raw, errors);

    let node = match kind {
        NodeKind::Start => Node::Start(StartNode {
            id,
            label,
            next: reference(id, kind, raw, "next", nodes, errors),
        }),
        NodeKind::Section => Node::Section(SectionNode {
            id,
            label,
            next: reference(id, kind, raw, "next", nodes, errors),
        }),
        NodeKind::Condition => Node::Condition(ConditionNode {
            id,
            label,
            next_true: reference(id, kind, raw, "nextTrue", nodes, errors),
            next_false: reference(id, kind, raw, "nextFalse", nodes, errors),
            condition_rule: match raw.get("conditionRule") {
                None | Some(Value::Null) => None,
                Some(rule) => condition::check_rule_shape(id, rule, nodes, errors),
            },
        }),
        NodeKind::End => Node::End(EndNode { id, label }),
    };

    Some(node)
}

fn node_id(index: usize, raw: &RawNode, errors: &mut Vec<ValidationError>) -> Option<Uuid> {
    match raw.get("id") {
        None | Some(Value::Null) => {
            errors.push(ValidationError::node(
                "N002",
                ErrorKind::Structural,
                format!("Node at index {} is missing 'id'", index),
                None,
            ));
            None
        }
        Some(Value::String(s)) => match Uuid::parse_str(s) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(ValidationError::node(
                    "N003",
                    ErrorKind::Structural,
                    format!("Node at index {} has invalid id '{}': must be a UUID", index, s),
                    None,
                ));
                None
            }
        },
        Some(other) => {
            errors.push(ValidationError::node(
                "N003",
                ErrorKind::Structural,
                format!(
                    "Node at index {} id must be a UUID string, found {}",
                    index,
                    json_type_name(other)
                ),
                None,
            ));
            None
        }
    }
}

fn node_kind(
    index: usize,
    id: Uuid,
    raw: &RawNode,
    errors: &mut Vec<ValidationError>,
) -> Option<NodeKind> {
    let kind = match raw.get("type") {
        Some(Value::String(name)) => NodeKind::from_name(name).ok_or_else(|| {
            format!("Node at index {} ('{}') has unknown type '{}'", index, id, name)
        }),
        None | Some(Value::Null) => Err(format!(
            "Node at index {} ('{}') is missing 'type'",
            index, id
        )),
        Some(other) => Err(format!(
            "Node at index {} ('{}') type must be a string, found {}",
            index,
            id,
            json_type_name(other)
        )),
    };

    kind.map_err(|message| {
        errors.push(ValidationError::node(
            "N005",
            ErrorKind::Structural,
            message,
            Some(id),
        ))
    })
    .ok()
}

fn check_allowed_fields(id: Uuid, kind: NodeKind, raw: &RawNode, errors: &mut Vec<ValidationError>) {
    let allowed = kind.allowed_fields();
    for field in raw.keys() {
        if !allowed.contains(&field.as_str()) {
            errors.push(ValidationError::node(
                "N006",
                ErrorKind::Structural,
                format!(
                    "Node '{}' has unsupported field '{}' for type '{}'",
                    id, field, kind
                ),
                Some(id),
            ));
        }
    }
}

/// Resolve a required reference field. Missing, empty, and dangling values
/// are all errors; `None` is returned for each of them.
fn reference(
    id: Uuid,
    kind: NodeKind,
    raw: &RawNode,
    field: &str,
    nodes: &NodeMap,
    errors: &mut Vec<ValidationError>,
) -> Option<Uuid> {
    let value = match raw.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        None | Some(Value::Null) | Some(Value::String(_)) => {
            errors.push(ValidationError::node(
                "N007",
                ErrorKind::Structural,
                format!("{} node '{}' requires '{}'", kind.default_label(), id, field),
                Some(id),
            ));
            return None;
        }
        Some(other) => {
            errors.push(ValidationError::node(
                "N008",
                ErrorKind::Structural,
                format!(
                    "Node '{}' field '{}' must be a string, found {}",
                    id,
                    field,
                    json_type_name(other)
                ),
                Some(id),
            ));
            return None;
        }
    };

    match Uuid::parse_str(value) {
        Ok(target) if nodes.contains_key(&target) => Some(target),
        _ => {
            errors.push(ValidationError::node(
                "N009",
                ErrorKind::Reference,
                format!(
                    "Node '{}' field '{}' references unknown node '{}'",
                    id, field, value
                ),
                Some(id),
            ));
            None
        }
    }
}
