//! Per-node diagnostics for the workflow editor.
//!
//! Built from the structured `node_id` tag each validation error carries, so
//! nothing has to be recovered from rendered message text.

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{CatalogError, QuestionCatalog};
use crate::error::{ErrorKind, ValidationError};
use crate::validate::{self, Mode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub node_id: Option<Uuid>,
    pub message: String,
}

impl From<&ValidationError> for Diagnostic {
    fn from(e: &ValidationError) -> Self {
        Diagnostic {
            kind: e.kind,
            node_id: e.node_id,
            message: e.message.clone(),
        }
    }
}

pub fn from_errors(errors: &[ValidationError]) -> Vec<Diagnostic> {
    errors.iter().map(Diagnostic::from).collect()
}

/// Activation-strict diagnostics for `raw`. A workflow that fails validation
/// is not an error here; only catalog failures are.
pub async fn collect(
    raw: &[u8],
    form_id: Uuid,
    catalog: Option<&dyn QuestionCatalog>,
) -> Result<Vec<Diagnostic>, CatalogError> {
    let errors = validate::collect_errors(raw, form_id, catalog, Mode::Activation).await?;
    Ok(from_errors(&errors))
}

/// Diagnostics grouped under a node id; `None` collects workflow-wide ones.
pub fn for_node(diagnostics: &[Diagnostic], node_id: Option<Uuid>) -> Vec<&Diagnostic> {
    diagnostics.iter().filter(|d| d.node_id == node_id).collect()
}
