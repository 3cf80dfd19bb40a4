//! Postgres-backed version store.
//!
//! All SQL is runtime-checked (`sqlx::query`, not `sqlx::query!`) so the crate
//! builds without a database. Every write is one transaction that begins with
//! a transaction-scoped advisory lock keyed by the form id. Row locks alone do
//! not serialize writers: a waiter on the latest row keeps that row even when
//! the holder inserts a newer one, and a form without rows has nothing to lock.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::document::{append_node, new_node, remove_node};
use super::{
    ActivationPlan, CreatedNode, DraftWrite, Revision, StoreError, WorkflowStore,
    WorkflowVersion, check_revision, plan_activation, plan_draft_write,
};
use crate::parse::NodeKind;

pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// ROW HELPERS
// =============================================================================

/// Serialize writers of one form until the transaction ends. Distinct forms
/// only contend on a 64-bit hash collision.
async fn lock_form(conn: &mut PgConnection, form_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(form_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Lock the form, then read its latest version. Writes stamp rows with
/// `clock_timestamp()` taken after the lock, so stamps follow lock order even
/// when a waiting transaction began first.
async fn lock_latest(
    conn: &mut PgConnection,
    form_id: Uuid,
) -> Result<Option<WorkflowVersion>, sqlx::Error> {
    lock_form(conn, form_id).await?;
    sqlx::query_as::<_, WorkflowVersion>(
        r#"
        SELECT id, form_id, workflow, last_editor, is_active, created_at, updated_at
        FROM workflow_versions
        WHERE form_id = $1
        ORDER BY updated_at DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(form_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Read the active version. Callers hold the form lock.
async fn read_active(
    conn: &mut PgConnection,
    form_id: Uuid,
) -> Result<Option<WorkflowVersion>, sqlx::Error> {
    sqlx::query_as::<_, WorkflowVersion>(
        r#"
        SELECT id, form_id, workflow, last_editor, is_active, created_at, updated_at
        FROM workflow_versions
        WHERE form_id = $1 AND is_active
        "#,
    )
    .bind(form_id)
    .fetch_optional(&mut *conn)
    .await
}

async fn insert_draft(
    conn: &mut PgConnection,
    form_id: Uuid,
    content: &Value,
    editor: Uuid,
) -> Result<WorkflowVersion, sqlx::Error> {
    sqlx::query_as::<_, WorkflowVersion>(
        r#"
        INSERT INTO workflow_versions
            (id, form_id, workflow, last_editor, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, FALSE, clock_timestamp(), clock_timestamp())
        RETURNING id, form_id, workflow, last_editor, is_active, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(form_id)
    .bind(Json(content))
    .bind(editor)
    .fetch_one(&mut *conn)
    .await
}

async fn overwrite(
    conn: &mut PgConnection,
    version_id: Uuid,
    content: &Value,
    editor: Uuid,
) -> Result<WorkflowVersion, sqlx::Error> {
    sqlx::query_as::<_, WorkflowVersion>(
        r#"
        UPDATE workflow_versions
        SET workflow = $2, last_editor = $3, updated_at = clock_timestamp()
        WHERE id = $1
        RETURNING id, form_id, workflow, last_editor, is_active, created_at, updated_at
        "#,
    )
    .bind(version_id)
    .bind(Json(content))
    .bind(editor)
    .fetch_one(&mut *conn)
    .await
}

async fn write_draft(
    conn: &mut PgConnection,
    form_id: Uuid,
    latest: Option<&WorkflowVersion>,
    content: &Value,
    editor: Uuid,
) -> Result<WorkflowVersion, sqlx::Error> {
    match plan_draft_write(latest) {
        DraftWrite::Overwrite(id) => {
            debug!(form_id = %form_id, version_id = %id, "draft overwritten");
            overwrite(conn, id, content, editor).await
        }
        DraftWrite::Insert => {
            let version = insert_draft(conn, form_id, content, editor).await?;
            info!(form_id = %form_id, version_id = %version.id, "draft version created");
            Ok(version)
        }
    }
}

async fn set_active(
    conn: &mut PgConnection,
    version_id: Uuid,
    is_active: bool,
) -> Result<Option<WorkflowVersion>, sqlx::Error> {
    sqlx::query_as::<_, WorkflowVersion>(
        r#"
        UPDATE workflow_versions
        SET is_active = $2,
            updated_at = CASE WHEN $2 THEN clock_timestamp() ELSE updated_at END
        WHERE id = $1
        RETURNING id, form_id, workflow, last_editor, is_active, created_at, updated_at
        "#,
    )
    .bind(version_id)
    .bind(is_active)
    .fetch_optional(&mut *conn)
    .await
}

// =============================================================================
// STORE
// =============================================================================

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn latest(&self, form_id: Uuid) -> Result<Option<WorkflowVersion>, StoreError> {
        let version = sqlx::query_as::<_, WorkflowVersion>(
            r#"
            SELECT id, form_id, workflow, last_editor, is_active, created_at, updated_at
            FROM workflow_versions
            WHERE form_id = $1
            ORDER BY updated_at DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn active(&self, form_id: Uuid) -> Result<Option<WorkflowVersion>, StoreError> {
        let version = sqlx::query_as::<_, WorkflowVersion>(
            r#"
            SELECT id, form_id, workflow, last_editor, is_active, created_at, updated_at
            FROM workflow_versions
            WHERE form_id = $1 AND is_active
            "#,
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn update(
        &self,
        form_id: Uuid,
        content: Value,
        expected: Option<Revision>,
        editor: Uuid,
    ) -> Result<WorkflowVersion, StoreError> {
        let mut tx = self.pool.begin().await?;
        let latest = lock_latest(&mut tx, form_id).await?;
        if let Err(e) = check_revision(form_id, expected, latest.as_ref()) {
            tx.rollback().await?;
            return Err(e);
        }
        let version = write_draft(&mut tx, form_id, latest.as_ref(), &content, editor).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn create_node(
        &self,
        form_id: Uuid,
        kind: NodeKind,
        editor: Uuid,
    ) -> Result<CreatedNode, StoreError> {
        let mut tx = self.pool.begin().await?;
        let latest = lock_latest(&mut tx, form_id).await?;

        let node_id = Uuid::new_v4();
        if kind == NodeKind::Section {
            sqlx::query("INSERT INTO sections (id, form_id) VALUES ($1, $2)")
                .bind(node_id)
                .bind(form_id)
                .execute(&mut *tx)
                .await?;
        }

        let content = append_node(latest.as_ref().map(|v| v.content()), new_node(kind, node_id));
        let version = write_draft(&mut tx, form_id, latest.as_ref(), &content, editor).await?;
        tx.commit().await?;

        info!(form_id = %form_id, node_id = %node_id, kind = %kind, "node created");
        Ok(CreatedNode { version, node_id })
    }

    async fn delete_node(
        &self,
        form_id: Uuid,
        node_id: Uuid,
        editor: Uuid,
    ) -> Result<Value, StoreError> {
        let mut tx = self.pool.begin().await?;
        let latest = lock_latest(&mut tx, form_id).await?;

        let current = latest
            .as_ref()
            .map(|v| v.content().clone())
            .unwrap_or_else(|| Value::Array(vec![]));
        let Some(removal) = remove_node(&current, node_id) else {
            tx.commit().await?;
            return Ok(current);
        };

        if removal.removed_kind == Some(NodeKind::Section) {
            sqlx::query("DELETE FROM sections WHERE id = $1")
                .bind(node_id)
                .execute(&mut *tx)
                .await?;
        }

        let version =
            write_draft(&mut tx, form_id, latest.as_ref(), &removal.content, editor).await?;
        tx.commit().await?;

        info!(form_id = %form_id, node_id = %node_id, "node deleted");
        Ok(version.workflow.0)
    }

    async fn activate(
        &self,
        form_id: Uuid,
        content: Value,
        editor: Uuid,
    ) -> Result<WorkflowVersion, StoreError> {
        let mut tx = self.pool.begin().await?;
        let latest = lock_latest(&mut tx, form_id).await?;
        let active = match &latest {
            Some(latest) if latest.is_active => Some(latest.clone()),
            _ => read_active(&mut tx, form_id).await?,
        };

        let plan = plan_activation(active.as_ref(), latest.as_ref(), &content);
        let target = match &plan {
            ActivationPlan::Unchanged(version) => {
                tx.commit().await?;
                info!(form_id = %form_id, version_id = %version.id, "activation unchanged");
                return Ok(version.clone());
            }
            ActivationPlan::PromoteDraft { draft_id, .. } => {
                overwrite(&mut tx, *draft_id, &content, editor).await?
            }
            ActivationPlan::InsertFirst | ActivationPlan::InsertNewVersion { .. } => {
                insert_draft(&mut tx, form_id, &content, editor).await?
            }
        };

        let previous = plan.previous_active();
        if let Some(previous) = previous {
            set_active(&mut tx, previous, false).await?;
        }

        let Some(activated) = set_active(&mut tx, target.id, true).await? else {
            if let Some(previous) = previous {
                set_active(&mut tx, previous, true).await?;
            }
            tx.commit().await?;
            warn!(
                form_id = %form_id,
                version_id = %target.id,
                restored = ?previous,
                "activation affected no rows, previous version restored"
            );
            return Err(StoreError::ActivationLost {
                form_id,
                version_id: target.id,
            });
        };

        tx.commit().await?;
        info!(
            form_id = %form_id,
            version_id = %activated.id,
            previous = ?previous,
            "workflow version activated"
        );
        Ok(activated)
    }
}
