use serde_json::{Value, json};
use uuid::Uuid;

use formflow::catalog::{InMemoryCatalog, Question, QuestionType};

// =============================================================================
// Ids
// =============================================================================

/// Deterministic node/question id: `00000000-0000-4000-8000-<n as hex>`.
pub fn id(n: u64) -> Uuid {
    Uuid::parse_str(&format!("00000000-0000-4000-8000-{:012x}", n)).unwrap()
}

pub fn form() -> Uuid {
    Uuid::parse_str("f0000000-0000-4000-8000-000000000001").unwrap()
}

pub fn other_form() -> Uuid {
    Uuid::parse_str("f0000000-0000-4000-8000-000000000002").unwrap()
}

pub fn editor() -> Uuid {
    Uuid::parse_str("e0000000-0000-4000-8000-000000000001").unwrap()
}

// =============================================================================
// Node builders
// =============================================================================

pub fn start(node: Uuid, next: Uuid) -> Value {
    json!({"id": node, "type": "start", "label": "Start", "next": next})
}

pub fn section(node: Uuid, next: Uuid) -> Value {
    json!({"id": node, "type": "section", "label": "Section", "next": next})
}

pub fn condition(node: Uuid, next_true: Uuid, next_false: Uuid, rule: Value) -> Value {
    json!({
        "id": node,
        "type": "condition",
        "label": "Condition",
        "nextTrue": next_true,
        "nextFalse": next_false,
        "conditionRule": rule,
    })
}

pub fn end(node: Uuid) -> Value {
    json!({"id": node, "type": "end", "label": "End"})
}

pub fn rule(source: &str, node_id: Uuid, key: Uuid, pattern: &str) -> Value {
    json!({"source": source, "nodeId": node_id, "key": key, "pattern": pattern})
}

pub fn doc(nodes: Vec<Value>) -> Vec<u8> {
    serde_json::to_vec(&Value::Array(nodes)).unwrap()
}

/// start(1) → end(2)
pub fn minimal() -> Vec<Value> {
    vec![start(id(1), id(2)), end(id(2))]
}

/// start(1) → section(2) → condition(3) ─true→ section(4) → end(6)
///                                      └false→ section(5) → end(6)
/// The condition reads question 100 answered in section 2.
pub fn branching() -> Vec<Value> {
    vec![
        start(id(1), id(2)),
        section(id(2), id(3)),
        condition(id(3), id(4), id(5), rule("choice", id(2), id(100), "^yes$")),
        section(id(4), id(6)),
        section(id(5), id(6)),
        end(id(6)),
    ]
}

// =============================================================================
// Catalog
// =============================================================================

pub fn question(question: Uuid, form_id: Uuid, question_type: QuestionType) -> Question {
    Question {
        id: question,
        form_id,
        question_type,
    }
}

/// Question 100 (single choice) and 101 (short text) on `form()`, 102 (single
/// choice) on `other_form()`.
pub fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new([
        question(id(100), form(), QuestionType::SingleChoice),
        question(id(101), form(), QuestionType::ShortText),
        question(id(102), other_form(), QuestionType::SingleChoice),
    ])
}
