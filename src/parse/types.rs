//! Typed workflow node model.
//!
//! A persisted workflow is a JSON array of loosely-typed node objects. The
//! validator turns each object into one of the closed variants below through
//! `validate::node_rules`, which also enforces every variant's field allow-list.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node exactly as submitted: a JSON object keyed by field name.
pub type RawNode = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// NODE KIND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Section,
    Condition,
    End,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Start,
        NodeKind::Section,
        NodeKind::Condition,
        NodeKind::End,
    ];

    /// Wire name used in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Section => "section",
            NodeKind::Condition => "condition",
            NodeKind::End => "end",
        }
    }

    pub fn from_name(name: &str) -> Option<NodeKind> {
        NodeKind::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Label given to freshly created nodes ("Start", "Section", ...).
    pub fn default_label(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Fields a node of this kind may carry. Anything else is rejected.
    pub fn allowed_fields(&self) -> &'static [&'static str] {
        match self {
            NodeKind::Start => StartNode::FIELDS,
            NodeKind::Section => SectionNode::FIELDS,
            NodeKind::Condition => ConditionNode::FIELDS,
            NodeKind::End => EndNode::FIELDS,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::from_name(s).ok_or_else(|| format!("unknown node type '{}'", s))
    }
}

// =============================================================================
// NODE VARIANTS
// =============================================================================

/// Reference fields are `None` when missing or unresolvable; the defect has
/// already been recorded by the factory that built the node.
#[derive(Debug, Clone, PartialEq)]
pub struct StartNode {
    pub id: Uuid,
    pub label: String,
    pub next: Option<Uuid>,
}

impl StartNode {
    pub const FIELDS: &'static [&'static str] = &["id", "type", "label", "next"];
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionNode {
    /// Shared with the external section record.
    pub id: Uuid,
    pub label: String,
    pub next: Option<Uuid>,
}

impl SectionNode {
    pub const FIELDS: &'static [&'static str] = &["id", "type", "label", "next"];
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionNode {
    pub id: Uuid,
    pub label: String,
    pub next_true: Option<Uuid>,
    pub next_false: Option<Uuid>,
    pub condition_rule: Option<ConditionRule>,
}

impl ConditionNode {
    pub const FIELDS: &'static [&'static str] = &[
        "id",
        "type",
        "label",
        "nextTrue",
        "nextFalse",
        "conditionRule",
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndNode {
    pub id: Uuid,
    pub label: String,
}

impl EndNode {
    pub const FIELDS: &'static [&'static str] = &["id", "type", "label"];
}

// =============================================================================
// WORKFLOW NODE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Start(StartNode),
    Section(SectionNode),
    Condition(ConditionNode),
    End(EndNode),
}

impl Node {
    pub fn id(&self) -> Uuid {
        match self {
            Node::Start(n) => n.id,
            Node::Section(n) => n.id,
            Node::Condition(n) => n.id,
            Node::End(n) => n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Start(_) => NodeKind::Start,
            Node::Section(_) => NodeKind::Section,
            Node::Condition(_) => NodeKind::Condition,
            Node::End(_) => NodeKind::End,
        }
    }

    /// Outgoing edges in declaration order: `next`, or `nextTrue` then `nextFalse`.
    pub fn successors(&self) -> Vec<(Uuid, Branch)> {
        match self {
            Node::Start(StartNode { next, .. }) | Node::Section(SectionNode { next, .. }) => {
                next.map(|id| (id, Branch::Next)).into_iter().collect()
            }
            Node::Condition(n) => n
                .next_true
                .map(|id| (id, Branch::True))
                .into_iter()
                .chain(n.next_false.map(|id| (id, Branch::False)))
                .collect(),
            Node::End(_) => vec![],
        }
    }

    pub fn condition_rule(&self) -> Option<&ConditionRule> {
        match self {
            Node::Condition(n) => n.condition_rule.as_ref(),
            _ => None,
        }
    }
}

/// Which reference field an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Next,
    True,
    False,
}

// =============================================================================
// CONDITION RULE
// =============================================================================

/// Branch predicate of a condition node, kept as submitted. Each field is
/// checked by `validate::condition`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRule {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub choice_option_id: Option<String>,
}

impl ConditionRule {
    pub const FIELDS: &'static [&'static str] =
        &["source", "nodeId", "key", "pattern", "choiceOptionId"];

    /// The node whose answer the rule reads, if it is a syntactically valid id.
    pub fn target(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.node_id).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionSource {
    #[serde(rename = "choice")]
    Choice,
    #[serde(rename = "nonChoice")]
    NonChoice,
}

impl ConditionSource {
    pub fn from_name(name: &str) -> Option<ConditionSource> {
        match name {
            "choice" => Some(ConditionSource::Choice),
            "nonChoice" => Some(ConditionSource::NonChoice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionSource::Choice => "choice",
            ConditionSource::NonChoice => "nonChoice",
        }
    }
}
