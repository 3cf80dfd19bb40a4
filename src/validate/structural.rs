//! Graph-level structural validation rules (V001–V006).

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorKind, ValidationError};
use crate::parse::graph::{WorkflowGraph, unique_of_kind};
use crate::parse::types::{Node, NodeKind};
use crate::validate::node_rules::NodeMap;

/// A workflow needs at least a start and an end node.
const MIN_NODES: usize = 2;

pub fn check_minimum_size(items: &[Value], errors: &mut Vec<ValidationError>) {
    if items.len() < MIN_NODES {
        errors.push(ValidationError::parse(
            "P002",
            format!(
                "Workflow must contain at least a start and an end node, found {} node(s)",
                items.len()
            ),
        ));
    }
}

/// Index node objects by id, reporting ids used more than once. Objects
/// without a valid id are skipped here and reported by the node factory.
pub fn index_nodes<'a>(items: &'a [Value], errors: &mut Vec<ValidationError>) -> NodeMap<'a> {
    let mut nodes = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        let Some(raw) = item.as_object() else { continue };
        let Some(id) = raw
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            continue;
        };

        if nodes.contains_key(&id) {
            errors.push(ValidationError::graph(
                "V006",
                ErrorKind::Structural,
                format!("Duplicate node id '{}' at index {}", id, index),
                Some(id),
            ));
        } else {
            nodes.insert(id, raw);
        }
    }
    nodes
}

pub fn check_cardinality(nodes: &[Node], errors: &mut Vec<ValidationError>) {
    exactly_one(nodes, NodeKind::Start, "V001", errors);
    exactly_one(nodes, NodeKind::End, "V002", errors);
}

fn exactly_one(nodes: &[Node], kind: NodeKind, code: &'static str, errors: &mut Vec<ValidationError>) {
    let count = nodes.iter().filter(|n| n.kind() == kind).count();
    if count != 1 {
        errors.push(ValidationError::graph(
            code,
            ErrorKind::Structural,
            format!("Workflow must have exactly 1 {} node, found {}", kind, count),
            None,
        ));
    }
}

/// Every node must be reachable from the unique start node.
pub fn check_reachability(nodes: &[Node], graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let Some(start) = unique_of_kind(nodes, NodeKind::Start) else {
        return;
    };

    let reachable: HashSet<Uuid> = graph.bfs_order(start).into_iter().collect();
    let mut reported = HashSet::new();
    for node in nodes {
        let id = node.id();
        if !reachable.contains(&id) && reported.insert(id) {
            errors.push(ValidationError::graph(
                "V003",
                ErrorKind::Reachability,
                format!("Node '{}' is not reachable from the start node", id),
                Some(id),
            ));
        }
    }
}

/// A condition may only read answers from nodes visited strictly before it
/// in start-rooted BFS order, and never from itself.
pub fn check_condition_order(
    nodes: &[Node],
    graph: &WorkflowGraph,
    errors: &mut Vec<ValidationError>,
) {
    let order: HashMap<Uuid, usize> = unique_of_kind(nodes, NodeKind::Start)
        .map(|start| {
            graph
                .bfs_order(start)
                .into_iter()
                .enumerate()
                .map(|(pos, id)| (id, pos))
                .collect()
        })
        .unwrap_or_default();

    for node in nodes {
        let Node::Condition(condition) = node else { continue };
        let Some(target) = condition.condition_rule.as_ref().and_then(|r| r.target()) else {
            continue;
        };

        if target == condition.id {
            errors.push(ValidationError::graph(
                "V004",
                ErrorKind::Ordering,
                format!(
                    "Condition node '{}' cannot reference itself in conditionRule.nodeId",
                    condition.id
                ),
                Some(condition.id),
            ));
            continue;
        }

        // Unknown targets were already reported as dangling references.
        if !graph.contains(target) {
            continue;
        }
        let Some(&position) = order.get(&condition.id) else {
            continue;
        };

        let visited_before = order.get(&target).is_some_and(|&p| p < position);
        if !visited_before {
            errors.push(ValidationError::graph(
                "V005",
                ErrorKind::Ordering,
                format!(
                    "Condition node '{}' references node '{}' which is not visited before it",
                    condition.id, target
                ),
                Some(condition.id),
            ));
        }
    }
}
