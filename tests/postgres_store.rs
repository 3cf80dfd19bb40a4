//! Integration tests for the Postgres version store.
//!
//! Needs a reachable database: set `TEST_DATABASE_URL` (or `DATABASE_URL`).
//! Without one every test returns early. Each test works on fresh form ids,
//! so runs can share a database.

#[allow(dead_code)]
mod helpers;

use std::sync::Arc;

use formflow::config::Config;
use formflow::parse::NodeKind;
use formflow::store::{PgWorkflowStore, StoreError, WorkflowStore};
use helpers::*;
use serde_json::{Value, json};
use tokio::sync::Barrier;
use uuid::Uuid;

async fn store() -> Option<Arc<PgWorkflowStore>> {
    dotenvy::dotenv().ok();
    let Some(url) = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
    else {
        eprintln!("TEST_DATABASE_URL not set, skipping Postgres store test");
        return None;
    };

    let pool = Config::new(url)
        .connect()
        .await
        .expect("failed to connect to test database");
    let store = PgWorkflowStore::new(pool);
    store.migrate().await.expect("failed to run migrations");
    Some(Arc::new(store))
}

/// `minimal()` with the start node relabelled.
fn relabelled(label: &str) -> Value {
    let mut nodes = minimal();
    nodes[0]["label"] = json!(label);
    json!(nodes)
}

async fn row_counts(store: &PgWorkflowStore, form_id: Uuid) -> (i64, i64) {
    sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM workflow_versions WHERE form_id = $1",
    )
    .bind(form_id)
    .fetch_one(store.pool())
    .await
    .unwrap()
}

async fn section_count(store: &PgWorkflowStore, form_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM sections WHERE form_id = $1")
        .bind(form_id)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

// =============================================================================
// Version state machine
// =============================================================================

#[tokio::test]
async fn draft_is_inserted_then_overwritten() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();

    let first = store.update(form_id, json!(minimal()), None, editor()).await.unwrap();
    let second = store
        .update(form_id, relabelled("Welcome"), Some(first.revision()), id(77))
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.last_editor, id(77));
    assert!(second.updated_at > first.updated_at);
    assert_eq!(row_counts(&store, form_id).await, (1, 0));
}

#[tokio::test]
async fn activation_lifecycle() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();

    let draft = store.update(form_id, json!(minimal()), None, editor()).await.unwrap();
    let live = store.activate(form_id, json!(minimal()), editor()).await.unwrap();
    assert_eq!(live.id, draft.id);
    assert!(live.is_active);

    // Unchanged content stays on the live version.
    let again = store.activate(form_id, json!(minimal()), id(77)).await.unwrap();
    assert_eq!(again.id, live.id);
    assert_eq!(row_counts(&store, form_id).await, (1, 1));

    // Editing the live version copies it.
    let copy = store
        .update(form_id, relabelled("Begin"), Some(live.revision()), editor())
        .await
        .unwrap();
    assert_ne!(copy.id, live.id);
    assert!(!copy.is_active);
    assert_eq!(store.active(form_id).await.unwrap().unwrap().id, live.id);
    assert_eq!(store.latest(form_id).await.unwrap().unwrap().id, copy.id);

    let promoted = store.activate(form_id, relabelled("Final"), editor()).await.unwrap();
    assert_eq!(promoted.id, copy.id);
    assert_eq!(promoted.content()[0]["label"], "Final");
    assert_eq!(row_counts(&store, form_id).await, (2, 1));

    let next = store.activate(form_id, relabelled("Third"), editor()).await.unwrap();
    assert_ne!(next.id, promoted.id);
    assert_eq!(row_counts(&store, form_id).await, (3, 1));
    assert_eq!(store.active(form_id).await.unwrap().unwrap().id, next.id);
}

#[tokio::test]
async fn stale_revision_is_a_conflict() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();

    let first = store.update(form_id, json!(minimal()), None, editor()).await.unwrap();
    store
        .update(form_id, relabelled("Again"), Some(first.revision()), editor())
        .await
        .unwrap();

    let err = store
        .update(form_id, relabelled("Stale"), Some(first.revision()), editor())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let err = store
        .update(form_id, relabelled("Fresh"), None, editor())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let latest = store.latest(form_id).await.unwrap().unwrap();
    assert_eq!(latest.content()[0]["label"], "Again");
}

#[tokio::test]
async fn section_nodes_own_section_rows() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();
    store.update(form_id, json!(minimal()), None, editor()).await.unwrap();

    let created = store.create_node(form_id, NodeKind::Section, editor()).await.unwrap();
    assert_eq!(created.version.content().as_array().unwrap().len(), 3);
    assert_eq!(section_count(&store, form_id).await, 1);

    let content = store.delete_node(form_id, created.node_id, editor()).await.unwrap();
    assert_eq!(content, json!(minimal()));
    assert_eq!(section_count(&store, form_id).await, 0);
}

// =============================================================================
// Concurrent writers
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_node_creation_keeps_every_node() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();
    store.activate(form_id, json!(minimal()), editor()).await.unwrap();

    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                store.create_node(form_id, NodeKind::Section, editor()).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // One live version plus one shared draft copy.
    assert_eq!(row_counts(&store, form_id).await, (2, 1));
    let latest = store.latest(form_id).await.unwrap().unwrap();
    assert_eq!(latest.content().as_array().unwrap().len(), 2 + writers);
    assert_eq!(section_count(&store, form_id).await, writers as i64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_drafts_share_one_row() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();

    let writers = 6;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                store.create_node(form_id, NodeKind::End, editor()).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(row_counts(&store, form_id).await, (1, 0));
    let latest = store.latest(form_id).await.unwrap().unwrap();
    assert_eq!(latest.content().as_array().unwrap().len(), writers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_leave_one_active() {
    let Some(store) = store().await else { return };
    let form_id = Uuid::new_v4();
    store.activate(form_id, json!(minimal()), editor()).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["Left", "Right"]
        .into_iter()
        .map(|label| {
            let store = store.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                store.activate(form_id, relabelled(label), editor()).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(row_counts(&store, form_id).await, (3, 1));
    let active = store.active(form_id).await.unwrap().unwrap();
    assert_eq!(store.latest(form_id).await.unwrap().unwrap().id, active.id);
}
