use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::types::Json;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::document::{append_node, new_node, remove_node};
use super::{
    ActivationPlan, CreatedNode, DraftWrite, Revision, StoreError, WorkflowStore,
    WorkflowVersion, check_revision, plan_activation, plan_draft_write,
};
use crate::parse::NodeKind;

type FormVersions = Arc<Mutex<Vec<WorkflowVersion>>>;

/// In-process store with one async lock per form.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    forms: DashMap<Uuid, FormVersions>,
    /// Section record id → owning form.
    sections: DashMap<Uuid, Uuid>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_section(&self, section_id: Uuid) -> bool {
        self.sections.contains_key(&section_id)
    }

    /// Every version of the form, oldest first.
    pub async fn versions(&self, form_id: Uuid) -> Vec<WorkflowVersion> {
        match self.existing(form_id) {
            Some(form) => form.lock().await.clone(),
            None => Vec::new(),
        }
    }

    pub fn form_count(&self) -> usize {
        self.forms.len()
    }

    /// Versions of a form that has been written to; reads never register one.
    fn existing(&self, form_id: Uuid) -> Option<FormVersions> {
        self.forms.get(&form_id).map(|form| form.value().clone())
    }

    fn form(&self, form_id: Uuid) -> FormVersions {
        self.forms.entry(form_id).or_default().clone()
    }
}

fn latest_of(versions: &[WorkflowVersion]) -> Option<&WorkflowVersion> {
    versions.iter().max_by_key(|v| v.updated_at)
}

/// A timestamp strictly after every existing one, so "latest" is never a tie.
fn next_timestamp(versions: &[WorkflowVersion]) -> DateTime<Utc> {
    let now = Utc::now();
    match latest_of(versions) {
        Some(latest) if latest.updated_at >= now => latest.updated_at + Duration::microseconds(1),
        _ => now,
    }
}

fn insert_draft(
    versions: &mut Vec<WorkflowVersion>,
    form_id: Uuid,
    content: Value,
    editor: Uuid,
) -> WorkflowVersion {
    let now = next_timestamp(versions);
    let version = WorkflowVersion {
        id: Uuid::new_v4(),
        form_id,
        workflow: Json(content),
        last_editor: editor,
        is_active: false,
        created_at: now,
        updated_at: now,
    };
    versions.push(version.clone());
    version
}

fn overwrite(
    versions: &mut [WorkflowVersion],
    version_id: Uuid,
    content: Value,
    editor: Uuid,
) -> Option<WorkflowVersion> {
    let now = next_timestamp(versions);
    let version = versions.iter_mut().find(|v| v.id == version_id)?;
    version.workflow = Json(content);
    version.last_editor = editor;
    version.updated_at = now;
    Some(version.clone())
}

fn write_draft(
    versions: &mut Vec<WorkflowVersion>,
    form_id: Uuid,
    content: Value,
    editor: Uuid,
) -> WorkflowVersion {
    match plan_draft_write(latest_of(versions)) {
        DraftWrite::Overwrite(id) => match overwrite(versions, id, content.clone(), editor) {
            Some(version) => {
                debug!(form_id = %form_id, version_id = %id, "draft overwritten");
                version
            }
            None => insert_draft(versions, form_id, content, editor),
        },
        DraftWrite::Insert => {
            let version = insert_draft(versions, form_id, content, editor);
            info!(form_id = %form_id, version_id = %version.id, "draft version created");
            version
        }
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn latest(&self, form_id: Uuid) -> Result<Option<WorkflowVersion>, StoreError> {
        let Some(form) = self.existing(form_id) else {
            return Ok(None);
        };
        let versions = form.lock().await;
        Ok(latest_of(&versions).cloned())
    }

    async fn active(&self, form_id: Uuid) -> Result<Option<WorkflowVersion>, StoreError> {
        let Some(form) = self.existing(form_id) else {
            return Ok(None);
        };
        let versions = form.lock().await;
        Ok(versions.iter().find(|v| v.is_active).cloned())
    }

    async fn update(
        &self,
        form_id: Uuid,
        content: Value,
        expected: Option<Revision>,
        editor: Uuid,
    ) -> Result<WorkflowVersion, StoreError> {
        let form = self.form(form_id);
        let mut versions = form.lock().await;
        check_revision(form_id, expected, latest_of(&versions))?;
        Ok(write_draft(&mut versions, form_id, content, editor))
    }

    async fn create_node(
        &self,
        form_id: Uuid,
        kind: NodeKind,
        editor: Uuid,
    ) -> Result<CreatedNode, StoreError> {
        let form = self.form(form_id);
        let mut versions = form.lock().await;

        let node_id = Uuid::new_v4();
        if kind == NodeKind::Section {
            self.sections.insert(node_id, form_id);
        }

        let content = append_node(latest_of(&versions).map(|v| v.content()), new_node(kind, node_id));
        let version = write_draft(&mut versions, form_id, content, editor);
        Ok(CreatedNode { version, node_id })
    }

    async fn delete_node(
        &self,
        form_id: Uuid,
        node_id: Uuid,
        editor: Uuid,
    ) -> Result<Value, StoreError> {
        let Some(form) = self.existing(form_id) else {
            return Ok(Value::Array(vec![]));
        };
        let mut versions = form.lock().await;

        let current = latest_of(&versions)
            .map(|v| v.content().clone())
            .unwrap_or_else(|| Value::Array(vec![]));
        let Some(removal) = remove_node(&current, node_id) else {
            return Ok(current);
        };

        if removal.removed_kind == Some(NodeKind::Section) {
            self.sections.remove(&node_id);
        }
        let version = write_draft(&mut versions, form_id, removal.content, editor);
        Ok(version.workflow.0)
    }

    async fn activate(
        &self,
        form_id: Uuid,
        content: Value,
        editor: Uuid,
    ) -> Result<WorkflowVersion, StoreError> {
        let form = self.form(form_id);
        let mut versions = form.lock().await;

        let active = versions.iter().find(|v| v.is_active);
        let plan = plan_activation(active, latest_of(&versions), &content);

        let target = match &plan {
            ActivationPlan::Unchanged(version) => {
                info!(form_id = %form_id, version_id = %version.id, "activation unchanged");
                return Ok(version.clone());
            }
            ActivationPlan::PromoteDraft { draft_id, .. } => {
                overwrite(&mut versions, *draft_id, content, editor).map(|v| v.id)
            }
            ActivationPlan::InsertFirst | ActivationPlan::InsertNewVersion { .. } => {
                Some(insert_draft(&mut versions, form_id, content, editor).id)
            }
        };

        let Some(target) = target else {
            return Err(StoreError::ActivationLost {
                form_id,
                version_id: plan.previous_active().unwrap_or_default(),
            });
        };

        let now = next_timestamp(&versions);
        let mut activated = None;
        for version in versions.iter_mut() {
            if version.id == target {
                version.is_active = true;
                version.updated_at = now;
                activated = Some(version.clone());
            } else {
                version.is_active = false;
            }
        }

        let activated = activated.ok_or(StoreError::ActivationLost {
            form_id,
            version_id: target,
        })?;
        info!(
            form_id = %form_id,
            version_id = %activated.id,
            previous = ?plan.previous_active(),
            "workflow version activated"
        );
        Ok(activated)
    }
}
