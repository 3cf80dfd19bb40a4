//! Versioned workflow storage.
//!
//! Each form owns a set of `WorkflowVersion` rows. At most one is active; the
//! most recently updated one is the "latest". Writes never touch an active row's
//! content: edits land on the latest draft, or on a fresh draft when the latest
//! row is live. Both backends share the decision functions in this module so
//! they follow the same state machine.

pub mod document;
mod memory;
mod postgres;

pub use memory::MemoryWorkflowStore;
pub use postgres::PgWorkflowStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::parse::NodeKind;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The activation flip matched no row; the previous active version was restored.
    #[error("activating version {version_id} of form {form_id} affected no rows")]
    ActivationLost { form_id: Uuid, version_id: Uuid },

    /// The form's latest version moved after the write was prepared.
    #[error("workflow of form {form_id} changed concurrently")]
    Conflict { form_id: Uuid },
}

/// One persisted workflow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowVersion {
    pub id: Uuid,
    pub form_id: Uuid,
    /// JSON array of node objects.
    pub workflow: Json<Value>,
    pub last_editor: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowVersion {
    pub fn content(&self) -> &Value {
        &self.workflow.0
    }

    pub fn revision(&self) -> Revision {
        Revision {
            version_id: self.id,
            updated_at: self.updated_at,
        }
    }
}

/// Identifies the latest version a draft save was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub version_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// `Conflict` unless the locked latest version is still the one `expected`
/// names (`None` meaning the form had no version).
pub fn check_revision(
    form_id: Uuid,
    expected: Option<Revision>,
    latest: Option<&WorkflowVersion>,
) -> Result<(), StoreError> {
    if latest.map(WorkflowVersion::revision) == expected {
        Ok(())
    } else {
        Err(StoreError::Conflict { form_id })
    }
}

/// A node appended by `WorkflowStore::create_node`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedNode {
    pub version: WorkflowVersion,
    pub node_id: Uuid,
}

/// Storage for workflow versions. Every write holds a per-form lock for its
/// whole read-modify-write, so writers on one form serialize while different
/// forms never contend.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// The most recently updated version of the form.
    async fn latest(&self, form_id: Uuid) -> Result<Option<WorkflowVersion>, StoreError>;

    /// The live version of the form.
    async fn active(&self, form_id: Uuid) -> Result<Option<WorkflowVersion>, StoreError>;

    /// Replace the draft content, creating a new draft if the latest is live.
    /// Fails with `Conflict` when the latest version under the lock is not
    /// `expected`.
    async fn update(
        &self,
        form_id: Uuid,
        content: Value,
        expected: Option<Revision>,
        editor: Uuid,
    ) -> Result<WorkflowVersion, StoreError>;

    /// Append a node of `kind`. Section nodes get a section record sharing their id.
    async fn create_node(
        &self,
        form_id: Uuid,
        kind: NodeKind,
        editor: Uuid,
    ) -> Result<CreatedNode, StoreError>;

    /// Remove a node and null every reference to it. Returns the resulting
    /// content; an unknown id leaves the latest content untouched.
    async fn delete_node(
        &self,
        form_id: Uuid,
        node_id: Uuid,
        editor: Uuid,
    ) -> Result<Value, StoreError>;

    /// Publish `content` as the form's single active version.
    async fn activate(
        &self,
        form_id: Uuid,
        content: Value,
        editor: Uuid,
    ) -> Result<WorkflowVersion, StoreError>;
}

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Where a draft edit lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftWrite {
    /// No version yet, or the latest is live: insert a new draft row.
    Insert,
    /// Overwrite the latest draft in place.
    Overwrite(Uuid),
}

pub fn plan_draft_write(latest: Option<&WorkflowVersion>) -> DraftWrite {
    match latest {
        Some(version) if !version.is_active => DraftWrite::Overwrite(version.id),
        _ => DraftWrite::Insert,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationPlan {
    /// The form has no version yet: insert and activate.
    InsertFirst,
    /// The requested content is already live.
    Unchanged(WorkflowVersion),
    /// Overwrite the latest draft, then make it the active version.
    PromoteDraft {
        draft_id: Uuid,
        previous_active: Option<Uuid>,
    },
    /// The latest row is live but differs: insert a new version and activate it.
    InsertNewVersion { previous_active: Option<Uuid> },
}

impl ActivationPlan {
    pub fn previous_active(&self) -> Option<Uuid> {
        match self {
            ActivationPlan::PromoteDraft {
                previous_active, ..
            }
            | ActivationPlan::InsertNewVersion { previous_active } => *previous_active,
            ActivationPlan::InsertFirst | ActivationPlan::Unchanged(_) => None,
        }
    }
}

/// Decide how to activate `requested`. Content is compared as JSON values,
/// so key order and whitespace do not matter.
pub fn plan_activation(
    active: Option<&WorkflowVersion>,
    latest: Option<&WorkflowVersion>,
    requested: &Value,
) -> ActivationPlan {
    let Some(latest) = latest else {
        return ActivationPlan::InsertFirst;
    };
    let previous_active = active.map(|a| a.id);

    if !latest.is_active {
        return ActivationPlan::PromoteDraft {
            draft_id: latest.id,
            previous_active,
        };
    }

    match active {
        Some(active) if active.content() == requested => ActivationPlan::Unchanged(active.clone()),
        _ => ActivationPlan::InsertNewVersion { previous_active },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version(is_active: bool, content: Value) -> WorkflowVersion {
        let now = Utc::now();
        WorkflowVersion {
            id: Uuid::new_v4(),
            form_id: Uuid::nil(),
            workflow: Json(content),
            last_editor: Uuid::nil(),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn draft_write_targets_latest_draft_only() {
        let draft = version(false, json!([]));
        let live = version(true, json!([]));

        assert_eq!(plan_draft_write(None), DraftWrite::Insert);
        assert_eq!(plan_draft_write(Some(&draft)), DraftWrite::Overwrite(draft.id));
        assert_eq!(plan_draft_write(Some(&live)), DraftWrite::Insert);
    }

    #[test]
    fn activation_without_rows_inserts() {
        assert_eq!(
            plan_activation(None, None, &json!([])),
            ActivationPlan::InsertFirst
        );
    }

    #[test]
    fn activation_of_identical_content_is_unchanged() {
        let live = version(true, json!([{"id": "a", "label": "A", "type": "end"}]));
        let requested = json!([{"type": "end", "label": "A", "id": "a"}]);

        assert_eq!(
            plan_activation(Some(&live), Some(&live), &requested),
            ActivationPlan::Unchanged(live.clone())
        );
    }

    #[test]
    fn activation_promotes_latest_draft() {
        let live = version(true, json!([]));
        let draft = version(false, json!([1]));

        let plan = plan_activation(Some(&live), Some(&draft), live.content());
        assert_eq!(
            plan,
            ActivationPlan::PromoteDraft {
                draft_id: draft.id,
                previous_active: Some(live.id),
            }
        );
    }

    #[test]
    fn activation_of_new_content_over_live_latest_inserts() {
        let live = version(true, json!([]));

        let plan = plan_activation(Some(&live), Some(&live), &json!([1]));
        assert_eq!(
            plan,
            ActivationPlan::InsertNewVersion {
                previous_active: Some(live.id)
            }
        );
        assert_eq!(plan.previous_active(), Some(live.id));
    }

    #[test]
    fn revision_check_detects_moved_latest() {
        let form_id = Uuid::nil();
        let draft = version(false, json!([]));

        assert!(check_revision(form_id, None, None).is_ok());
        assert!(check_revision(form_id, Some(draft.revision()), Some(&draft)).is_ok());

        let mut touched = draft.clone();
        touched.updated_at += chrono::Duration::microseconds(1);
        assert!(matches!(
            check_revision(form_id, Some(draft.revision()), Some(&touched)),
            Err(StoreError::Conflict { .. })
        ));
        assert!(check_revision(form_id, None, Some(&draft)).is_err());
    }
}
