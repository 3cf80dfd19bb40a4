//! Integration tests for condition rule checks, with and without a question catalog.

#[allow(dead_code)]
mod helpers;

use async_trait::async_trait;
use formflow::catalog::{CatalogError, Question, QuestionCatalog};
use formflow::validate::{self, Mode};
use formflow::{Error, ErrorKind};
use helpers::*;
use serde_json::{Value, json};
use uuid::Uuid;

/// The branching workflow with its condition rule replaced.
fn with_rule(rule: Value) -> Vec<u8> {
    let mut nodes = branching();
    nodes[2]["conditionRule"] = rule;
    doc(nodes)
}

async fn codes(raw: &[u8], mode: Mode) -> Vec<&'static str> {
    let catalog = catalog();
    validate::collect_errors(raw, form(), Some(&catalog), mode)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.code)
        .collect()
}

struct UnavailableCatalog;

#[async_trait]
impl QuestionCatalog for UnavailableCatalog {
    async fn get_by_id(&self, _question_id: Uuid) -> Result<Option<Question>, CatalogError> {
        Err(CatalogError::Io(std::io::Error::other("catalog offline")))
    }
}

// =============================================================================
// Shape
// =============================================================================

#[tokio::test]
async fn rule_must_be_an_object() {
    assert_eq!(codes(&with_rule(json!("x == 1")), Mode::Draft).await, vec!["C001"]);
}

#[tokio::test]
async fn rule_rejects_unsupported_fields() {
    let mut rule = rule("choice", id(2), id(100), "^yes$");
    rule["operator"] = json!("equals");
    assert_eq!(codes(&with_rule(rule), Mode::Draft).await, vec!["C002"]);
}

#[tokio::test]
async fn rule_with_wrong_field_types_is_malformed() {
    let mut rule = rule("choice", id(2), id(100), "^yes$");
    rule["pattern"] = json!(5);
    let found = codes(&with_rule(rule), Mode::Draft).await;
    assert_eq!(found, vec!["C003"]);
}

#[tokio::test]
async fn rule_source_must_be_known() {
    let found = codes(&with_rule(rule("maybe", id(2), id(100), "^yes$")), Mode::Draft).await;
    assert_eq!(found, vec!["C004"]);
}

#[tokio::test]
async fn rule_requires_node_key_and_pattern() {
    let raw = with_rule(json!({"source": "choice"}));
    let found = codes(&raw, Mode::Draft).await;
    assert_eq!(found, vec!["C005", "C007", "C008"]);
}

#[tokio::test]
async fn rule_pattern_must_compile() {
    let errors = validate::collect_errors(
        &with_rule(rule("choice", id(2), id(100), "(unclosed")),
        form(),
        None,
        Mode::Activation,
    )
    .await
    .unwrap();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "C009");
    assert_eq!(errors[0].kind, ErrorKind::Semantic);
    assert_eq!(errors[0].node_id, Some(id(3)));
}

#[tokio::test]
async fn choice_option_id_is_accepted() {
    let mut rule = rule("choice", id(2), id(100), "^yes$");
    rule["choiceOptionId"] = json!("opt-yes");
    assert!(codes(&with_rule(rule), Mode::Activation).await.is_empty());
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn key_must_be_a_question_id() {
    let mut rule = rule("choice", id(2), id(100), "^yes$");
    rule["key"] = json!("favourite-colour");
    let raw = with_rule(rule);

    assert_eq!(codes(&raw, Mode::Activation).await, vec!["C010"]);
    validate::validate_activation(&raw, form(), None).await.unwrap();
}

#[tokio::test]
async fn unknown_question_is_rejected() {
    let raw = with_rule(rule("choice", id(2), id(555), "^yes$"));
    assert_eq!(codes(&raw, Mode::Draft).await, vec!["C011"]);
}

#[tokio::test]
async fn question_from_another_form_is_rejected() {
    let raw = with_rule(rule("choice", id(2), id(102), "^yes$"));
    let err = validate::validate_activation(&raw, form(), Some(&catalog()))
        .await
        .unwrap_err();

    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors()[0].code, "C012");
    assert!(errors.errors()[0].message.contains("another form"));
}

#[tokio::test]
async fn source_must_match_question_type() {
    let choice_on_text = with_rule(rule("choice", id(2), id(101), "^yes$"));
    assert_eq!(codes(&choice_on_text, Mode::Draft).await, vec!["C013"]);

    let text_on_choice = with_rule(rule("nonChoice", id(2), id(100), "^yes$"));
    assert_eq!(codes(&text_on_choice, Mode::Draft).await, vec!["C013"]);

    let text_on_text = with_rule(rule("nonChoice", id(2), id(101), "^\\d+$"));
    assert!(codes(&text_on_text, Mode::Draft).await.is_empty());
}

#[tokio::test]
async fn catalog_failure_is_not_a_validation_error() {
    let raw = doc(branching());
    let err = validate::validate_draft(&raw, form(), Some(&UnavailableCatalog))
        .await
        .unwrap_err();

    assert!(!err.is_validation());
    assert!(matches!(err, Error::Catalog(CatalogError::Io(_))));
}

#[tokio::test]
async fn catalog_is_not_consulted_without_conditions() {
    let raw = doc(minimal());
    validate::validate_activation(&raw, form(), Some(&UnavailableCatalog))
        .await
        .unwrap();
}
