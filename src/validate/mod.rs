//! Workflow validation.
//!
//! Two strictness levels share the same structural and per-node checks:
//! `Mode::Draft` for ordinary saves (adds condition ordering, tolerates
//! disconnected nodes) and `Mode::Activation` before a version goes live
//! (requires full reachability and a rule on every condition).

pub mod condition;
pub mod node_rules;
pub mod stability;
pub mod structural;

use uuid::Uuid;

use crate::catalog::{CatalogError, QuestionCatalog};
use crate::error::{Error, ValidationError, ValidationErrors};
use crate::parse::{self, Node, WorkflowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Draft,
    Activation,
}

/// Result of the catalog-free passes.
pub struct Checked {
    pub nodes: Vec<Node>,
    pub errors: Vec<ValidationError>,
}

/// Run every check that needs no collaborator. Never stops at the first
/// defect unless the document is not a JSON array at all.
pub fn check_structure(raw: &[u8], mode: Mode) -> Checked {
    let items = match parse::parse(raw) {
        Ok(items) => items,
        Err(e) => {
            return Checked {
                nodes: vec![],
                errors: vec![e],
            };
        }
    };

    let mut errors = Vec::new();
    structural::check_minimum_size(&items, &mut errors);
    let node_map = structural::index_nodes(&items, &mut errors);
    let nodes = node_rules::build_nodes(&items, &node_map, &mut errors);
    structural::check_cardinality(&nodes, &mut errors);

    let graph = WorkflowGraph::build(&nodes);
    match mode {
        Mode::Activation => {
            condition::require_rules(&nodes, &mut errors);
            structural::check_reachability(&nodes, &graph, &mut errors);
        }
        Mode::Draft => structural::check_condition_order(&nodes, &graph, &mut errors),
    }

    Checked { nodes, errors }
}

/// Collect every validation defect of `raw`. Only catalog failures are `Err`.
pub async fn collect_errors(
    raw: &[u8],
    form_id: Uuid,
    catalog: Option<&dyn QuestionCatalog>,
    mode: Mode,
) -> Result<Vec<ValidationError>, CatalogError> {
    let Checked { nodes, mut errors } = check_structure(raw, mode);

    if let Some(catalog) = catalog {
        for node in &nodes {
            if let Some(rule) = node.condition_rule() {
                condition::check_against_catalog(node.id(), rule, form_id, catalog, &mut errors)
                    .await?;
            }
        }
    }

    Ok(errors)
}

pub async fn validate(
    raw: &[u8],
    form_id: Uuid,
    catalog: Option<&dyn QuestionCatalog>,
    mode: Mode,
) -> Result<(), Error> {
    let errors = collect_errors(raw, form_id, catalog, mode).await?;
    ValidationErrors::check(errors)?;
    Ok(())
}

/// Validation for ordinary draft saves.
pub async fn validate_draft(
    raw: &[u8],
    form_id: Uuid,
    catalog: Option<&dyn QuestionCatalog>,
) -> Result<(), Error> {
    validate(raw, form_id, catalog, Mode::Draft).await
}

/// Validation before a version is published.
pub async fn validate_activation(
    raw: &[u8],
    form_id: Uuid,
    catalog: Option<&dyn QuestionCatalog>,
) -> Result<(), Error> {
    validate(raw, form_id, catalog, Mode::Activation).await
}

/// Catalog-free validation, returning the typed nodes on success.
pub fn validate_structure(raw: &[u8], mode: Mode) -> Result<Vec<Node>, ValidationErrors> {
    let Checked { nodes, errors } = check_structure(raw, mode);
    ValidationErrors::check(errors)?;
    Ok(nodes)
}

pub fn validate_id_stability(proposed: &[u8], current: &[u8]) -> Result<(), ValidationErrors> {
    ValidationErrors::check(stability::check_id_stability(proposed, current))
}
