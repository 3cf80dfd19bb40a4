//! Condition rule checks (C001–C014).
//!
//! Shape checks run without any collaborator. When a question catalog is
//! supplied, `check_against_catalog` additionally resolves the rule's `key`
//! and checks form ownership and source/type compatibility.

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{CatalogError, QuestionCatalog};
use crate::error::{ErrorKind, ValidationError};
use crate::parse::types::{ConditionRule, ConditionSource, Node};
use crate::validate::node_rules::NodeMap;

/// Decode and check a `conditionRule` payload on its own. Returns the rule
/// whenever it could be decoded, so later passes can still inspect it.
pub fn check_rule_shape(
    owner: Uuid,
    raw: &Value,
    nodes: &NodeMap,
    errors: &mut Vec<ValidationError>,
) -> Option<ConditionRule> {
    let Some(fields) = raw.as_object() else {
        errors.push(ValidationError::condition(
            "C001",
            ErrorKind::Structural,
            format!("Condition node '{}' conditionRule must be an object", owner),
            owner,
        ));
        return None;
    };

    for field in fields.keys() {
        if !ConditionRule::FIELDS.contains(&field.as_str()) {
            errors.push(ValidationError::condition(
                "C002",
                ErrorKind::Structural,
                format!(
                    "Condition node '{}' conditionRule has unsupported field '{}'",
                    owner, field
                ),
                owner,
            ));
        }
    }

    let rule = match serde_json::from_value::<ConditionRule>(raw.clone()) {
        Ok(rule) => rule,
        Err(e) => {
            errors.push(ValidationError::condition(
                "C003",
                ErrorKind::Structural,
                format!("Condition node '{}' conditionRule is malformed: {}", owner, e),
                owner,
            ));
            return None;
        }
    };

    check_rule(owner, &rule, nodes, errors);
    Some(rule)
}

fn check_rule(owner: Uuid, rule: &ConditionRule, nodes: &NodeMap, errors: &mut Vec<ValidationError>) {
    if ConditionSource::from_name(&rule.source).is_none() {
        errors.push(ValidationError::condition(
            "C004",
            ErrorKind::Semantic,
            format!(
                "Condition node '{}' has invalid source '{}': expected 'choice' or 'nonChoice'",
                owner, rule.source
            ),
            owner,
        ));
    }

    if rule.node_id.trim().is_empty() {
        errors.push(ValidationError::condition(
            "C005",
            ErrorKind::Structural,
            format!("Condition node '{}' requires conditionRule.nodeId", owner),
            owner,
        ));
    } else if !rule.target().is_some_and(|target| nodes.contains_key(&target)) {
        errors.push(ValidationError::condition(
            "C006",
            ErrorKind::Reference,
            format!(
                "Condition node '{}' conditionRule.nodeId references unknown node '{}'",
                owner, rule.node_id
            ),
            owner,
        ));
    }

    if rule.key.trim().is_empty() {
        errors.push(ValidationError::condition(
            "C007",
            ErrorKind::Structural,
            format!("Condition node '{}' requires conditionRule.key", owner),
            owner,
        ));
    }

    if rule.pattern.is_empty() {
        errors.push(ValidationError::condition(
            "C008",
            ErrorKind::Structural,
            format!("Condition node '{}' requires conditionRule.pattern", owner),
            owner,
        ));
    } else if let Err(e) = Regex::new(&rule.pattern) {
        errors.push(ValidationError::condition(
            "C009",
            ErrorKind::Semantic,
            format!(
                "Condition node '{}' has invalid pattern '{}': {}",
                owner, rule.pattern, e
            ),
            owner,
        ));
    }
}

/// Resolve the rule's question and check it belongs to `form_id` and suits
/// the rule's source. Only lookup failures of the catalog itself are `Err`.
pub async fn check_against_catalog(
    owner: Uuid,
    rule: &ConditionRule,
    form_id: Uuid,
    catalog: &dyn QuestionCatalog,
    errors: &mut Vec<ValidationError>,
) -> Result<(), CatalogError> {
    if rule.key.trim().is_empty() {
        return Ok(());
    }

    let Ok(question_id) = Uuid::parse_str(&rule.key) else {
        errors.push(ValidationError::condition(
            "C010",
            ErrorKind::Structural,
            format!(
                "Condition node '{}' conditionRule.key '{}' is not a valid question id",
                owner, rule.key
            ),
            owner,
        ));
        return Ok(());
    };

    let Some(question) = catalog.get_by_id(question_id).await? else {
        errors.push(ValidationError::condition(
            "C011",
            ErrorKind::Reference,
            format!(
                "Condition node '{}' references unknown question '{}'",
                owner, question_id
            ),
            owner,
        ));
        return Ok(());
    };

    if question.form_id != form_id {
        errors.push(ValidationError::condition(
            "C012",
            ErrorKind::Semantic,
            format!(
                "Condition node '{}' references question '{}' from another form",
                owner, question_id
            ),
            owner,
        ));
    }

    if let Some(source) = ConditionSource::from_name(&rule.source) {
        if !source.accepts(question.question_type) {
            errors.push(ValidationError::condition(
                "C013",
                ErrorKind::Semantic,
                format!(
                    "Condition node '{}' source '{}' is incompatible with question type '{}'",
                    owner,
                    source.as_str(),
                    question.question_type.as_str()
                ),
                owner,
            ));
        }
    }

    Ok(())
}

/// Activation requires every condition node to carry a rule.
pub fn require_rules(nodes: &[Node], errors: &mut Vec<ValidationError>) {
    for node in nodes {
        if let Node::Condition(n) = node {
            if n.condition_rule.is_none() {
                errors.push(ValidationError::condition(
                    "C014",
                    ErrorKind::Structural,
                    format!(
                        "Condition node '{}' requires a conditionRule before activation",
                        n.id
                    ),
                    n.id,
                ));
            }
        }
    }
}
