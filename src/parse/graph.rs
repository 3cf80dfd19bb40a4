//! petgraph-based directed graph over workflow nodes.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use uuid::Uuid;

use super::types::{Branch, Node, NodeKind};

pub struct WorkflowGraph {
    pub graph: DiGraph<Uuid, Branch>,
    pub node_indices: HashMap<Uuid, NodeIndex>,
}

impl WorkflowGraph {
    /// Build the graph from successfully typed nodes. Only the first node
    /// with a given id is added, and edges to unknown ids are skipped; both
    /// defects are reported by the validator, not here.
    pub fn build(nodes: &[Node]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for node in nodes {
            node_indices
                .entry(node.id())
                .or_insert_with(|| graph.add_node(node.id()));
        }

        let mut wired = HashSet::new();
        for node in nodes {
            if !wired.insert(node.id()) {
                continue;
            }
            let source = node_indices[&node.id()];
            // petgraph walks neighbors newest-first, so insert in reverse to
            // keep traversal in declaration order.
            for (target, branch) in node.successors().into_iter().rev() {
                if let Some(&t) = node_indices.get(&target) {
                    graph.add_edge(source, t, branch);
                }
            }
        }

        WorkflowGraph {
            graph,
            node_indices,
        }
    }

    /// Node ids in breadth-first visiting order starting at `root`.
    pub fn bfs_order(&self, root: Uuid) -> Vec<Uuid> {
        let Some(&root_idx) = self.node_indices.get(&root) else {
            return vec![];
        };

        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut bfs = Bfs::new(&self.graph, root_idx);
        while let Some(nx) = bfs.next(&self.graph) {
            order.push(self.graph[nx]);
        }
        order
    }

    pub fn successors(&self, node_id: Uuid) -> Vec<(Uuid, Branch)> {
        let Some(&idx) = self.node_indices.get(&node_id) else {
            return vec![];
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (self.graph[e.target()], *e.weight()))
            .collect()
    }

    pub fn incoming_count(&self, node_id: Uuid) -> usize {
        let Some(&idx) = self.node_indices.get(&node_id) else {
            return 0;
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .count()
    }

    pub fn contains(&self, node_id: Uuid) -> bool {
        self.node_indices.contains_key(&node_id)
    }

    pub fn len(&self) -> usize {
        self.node_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_indices.is_empty()
    }
}

/// The unique node of `kind`, or `None` when there are zero or several.
pub fn unique_of_kind(nodes: &[Node], kind: NodeKind) -> Option<Uuid> {
    let mut found = nodes.iter().filter(|n| n.kind() == kind);
    let first = found.next()?;
    match found.next() {
        Some(_) => None,
        None => Some(first.id()),
    }
}
