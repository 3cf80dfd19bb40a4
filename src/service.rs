//! Caller-facing workflow operations.
//!
//! Wires validation, the question catalog, and a version store together. The
//! HTTP layer maps `Error::Validation` to a client error and everything else
//! to a server fault.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::QuestionCatalog;
use crate::diagnostics::{self, Diagnostic};
use crate::error::{ErrorKind, Result, ValidationError, ValidationErrors};
use crate::parse::{self, NodeKind};
use crate::store::{CreatedNode, StoreError, WorkflowStore, WorkflowVersion};
use crate::validate::{self, Mode, stability};

/// Draft saves that lose the race to another writer are rechecked this many
/// times in total before the conflict is returned.
const MAX_UPDATE_ATTEMPTS: u32 = 3;

pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    catalog: Option<Arc<dyn QuestionCatalog>>,
}

impl WorkflowService {
    /// A service that validates structure only; condition rules are not
    /// checked against any question catalog.
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn QuestionCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn catalog(&self) -> Option<&dyn QuestionCatalog> {
        self.catalog.as_deref()
    }

    /// Latest content of the form, or an empty array if it has none.
    pub async fn get(&self, form_id: Uuid) -> Result<Value> {
        let latest = self.store.latest(form_id).await?;
        Ok(latest
            .map(|v| v.workflow.0)
            .unwrap_or_else(|| Value::Array(vec![])))
    }

    /// Save `content` as the form's draft. Runs draft validation plus the
    /// node-id stability check against the stored document. The write is
    /// pinned to the version the stability check saw; if another writer moved
    /// it first, the check is repeated against the new latest version.
    pub async fn update(&self, form_id: Uuid, content: &[u8], editor: Uuid) -> Result<WorkflowVersion> {
        let draft_errors =
            validate::collect_errors(content, form_id, self.catalog(), Mode::Draft).await?;

        let mut attempt = 1;
        loop {
            let latest = self.store.latest(form_id).await?;

            let mut errors = draft_errors.clone();
            if let Some(current) = &latest {
                let current = serde_json::to_vec(current.content())?;
                errors.extend(stability::check_id_stability(content, &current));
            }
            if !errors.is_empty() {
                debug!(form_id = %form_id, errors = errors.len(), "draft rejected");
                return Err(ValidationErrors(errors).into());
            }
            let nodes = decode(content).map_err(|e| ValidationErrors(vec![e]))?;

            let expected = latest.as_ref().map(WorkflowVersion::revision);
            match self.store.update(form_id, nodes, expected, editor).await {
                Ok(version) => {
                    info!(form_id = %form_id, version_id = %version.id, editor = %editor, "workflow draft saved");
                    return Ok(version);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_UPDATE_ATTEMPTS => {
                    debug!(form_id = %form_id, attempt, "latest version moved, rechecking draft");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Append a node of the named type (`start`, `section`, `condition`, `end`).
    pub async fn create_node(&self, form_id: Uuid, node_type: &str, editor: Uuid) -> Result<CreatedNode> {
        let Some(kind) = NodeKind::from_name(node_type) else {
            return Err(ValidationErrors(vec![ValidationError::node(
                "N005",
                ErrorKind::Structural,
                format!("Cannot create node of unknown type '{}'", node_type),
                None,
            )])
            .into());
        };

        let created = self.store.create_node(form_id, kind, editor).await?;
        info!(
            form_id = %form_id,
            node_id = %created.node_id,
            version_id = %created.version.id,
            kind = %kind,
            "workflow node created"
        );
        Ok(created)
    }

    pub async fn delete_node(&self, form_id: Uuid, node_id: Uuid, editor: Uuid) -> Result<Value> {
        let content = self.store.delete_node(form_id, node_id, editor).await?;
        info!(form_id = %form_id, node_id = %node_id, editor = %editor, "workflow node deleted");
        Ok(content)
    }

    /// Publish `content` after activation-strict validation.
    pub async fn activate(&self, form_id: Uuid, content: &[u8], editor: Uuid) -> Result<WorkflowVersion> {
        if let Err(e) = validate::validate_activation(content, form_id, self.catalog()).await {
            debug!(form_id = %form_id, error = %e, "activation rejected");
            return Err(e);
        }

        let nodes = decode(content).map_err(|e| ValidationErrors(vec![e]))?;
        let version = self.store.activate(form_id, nodes, editor).await?;
        Ok(version)
    }

    /// Activation-strict diagnostics for `content`. A failing workflow yields
    /// entries, not an error.
    pub async fn validation_info(&self, form_id: Uuid, content: &[u8]) -> Result<Vec<Diagnostic>> {
        let diagnostics = diagnostics::collect(content, form_id, self.catalog()).await?;
        debug!(form_id = %form_id, count = diagnostics.len(), "validation info collected");
        Ok(diagnostics)
    }
}

fn decode(content: &[u8]) -> Result<Value, ValidationError> {
    parse::parse(content).map(Value::Array)
}
