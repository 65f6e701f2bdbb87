//! Partial-failure recovery: a created-but-incomplete item must keep its
//! remote identity in the sync map, and a retry run must resume from it
//! instead of creating a duplicate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use planpilot_core::engine::{SyncEngine, SyncError, SyncOptions, SyncStep};
use planpilot_core::plan::{validate_plan, Plan, PlanItem, PlanItemType, ValidateMode};
use planpilot_core::provider::{
    CreateItemInput, MemoryProvider, Provider, ProviderError, RemoteItem, SearchFilters,
    UpdateItemInput,
};
use planpilot_core::render::MarkdownRenderer;
use planpilot_core::syncmap::SyncMap;

// ===========================================================================
// Failure-injecting provider
// ===========================================================================

/// Wraps the in-memory provider and fails every `update_item` while
/// armed. Creates still succeed, which is exactly the window that
/// produces a created-but-incomplete item.
struct FailingUpdateProvider {
    inner: MemoryProvider,
    armed: Arc<AtomicBool>,
}

#[async_trait]
impl Provider for FailingUpdateProvider {
    fn name(&self) -> &str {
        "failing-update"
    }

    async fn search_items(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        self.inner.search_items(filters).await
    }

    async fn create_item(&self, input: &CreateItemInput) -> Result<RemoteItem, ProviderError> {
        self.inner.create_item(input).await
    }

    async fn update_item(
        &self,
        id: &str,
        input: &UpdateItemInput,
    ) -> Result<RemoteItem, ProviderError> {
        if self.armed.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport {
                message: "connection reset during update".to_owned(),
                retryable: true,
            });
        }
        self.inner.update_item(id, input).await
    }

    async fn get_item(&self, id: &str) -> Result<RemoteItem, ProviderError> {
        self.inner.get_item(id).await
    }

    async fn delete_item(&self, id: &str) -> Result<(), ProviderError> {
        self.inner.delete_item(id).await
    }

    async fn set_parent(&self, child_id: &str, parent_id: &str) -> Result<(), ProviderError> {
        self.inner.set_parent(child_id, parent_id).await
    }

    async fn add_dependency(
        &self,
        item_id: &str,
        blocked_by_id: &str,
    ) -> Result<(), ProviderError> {
        self.inner.add_dependency(item_id, blocked_by_id).await
    }
}

// ===========================================================================
// Fixture
// ===========================================================================

/// E1 -> S1 -> T1, with labels on T1 so creation needs the follow-up
/// apply-labels step.
fn labeled_plan() -> Plan {
    let mut e1 = PlanItem::new("E1", PlanItemType::Epic, "Epic E1");
    e1.sub_item_ids = vec!["S1".to_owned()];

    let mut s1 = PlanItem::new("S1", PlanItemType::Story, "Story S1");
    s1.parent_id = Some("E1".to_owned());
    s1.sub_item_ids = vec!["T1".to_owned()];
    s1.goal = Some("Deliver S1".to_owned());
    s1.requirements = vec!["requirement".to_owned()];
    s1.acceptance_criteria = vec!["accepted".to_owned()];

    let mut t1 = PlanItem::new("T1", PlanItemType::Task, "Task T1");
    t1.parent_id = Some("S1".to_owned());
    t1.goal = Some("Finish T1".to_owned());
    t1.requirements = vec!["requirement".to_owned()];
    t1.acceptance_criteria = vec!["accepted".to_owned()];
    t1.labels = vec!["planpilot".to_owned()];

    let plan = Plan::new(vec![e1, s1, t1]);
    validate_plan(&plan, ValidateMode::Strict).expect("fixture must be valid");
    plan
}

struct TestHarness {
    inner: MemoryProvider,
    armed: Arc<AtomicBool>,
    map_path: PathBuf,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let tmp = tempfile::TempDir::new().expect("failed to create temp dir");
        Self {
            inner: MemoryProvider::new("https://tracker.test"),
            armed: Arc::new(AtomicBool::new(true)),
            map_path: tmp.path().join("sync-map.json"),
            _tmp: tmp,
        }
    }

    fn engine(&self) -> SyncEngine {
        let provider = FailingUpdateProvider {
            inner: self.inner.clone(),
            armed: Arc::clone(&self.armed),
        };
        SyncEngine::new(
            Arc::new(provider),
            Arc::new(MarkdownRenderer::new()),
            SyncOptions::new(&self.map_path, "owner/repo"),
        )
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn failed_apply_labels_step_preserves_the_created_identity() {
    let h = TestHarness::new();

    let err = h
        .engine()
        .sync(&labeled_plan(), CancellationToken::new())
        .await
        .expect_err("armed provider must fail the apply-labels step");

    let SyncError::CreatedButIncomplete {
        item_id,
        entry,
        completed,
        step,
        ..
    } = &err
    else {
        panic!("expected CreatedButIncomplete, got: {err}");
    };
    assert_eq!(item_id, "T1");
    assert_eq!(completed.as_slice(), [SyncStep::Create]);
    assert_eq!(*step, SyncStep::ApplyLabels);
    assert!(err.is_retryable(), "transport failure must be retryable");

    // The item exists remotely and its identity survived into the map.
    assert_eq!(h.inner.item_count().await, 3);
    let map = SyncMap::load(&h.map_path, "", "owner/repo", "").expect("map persisted");
    assert_eq!(map.entry("T1").expect("T1 entry kept").remote_id, entry.remote_id);
    assert!(
        map.synced_at.is_none(),
        "a failed run must not stamp the map as synced"
    );
}

#[tokio::test]
async fn retry_run_reuses_the_entry_and_completes_the_sync() {
    let h = TestHarness::new();
    let plan = labeled_plan();

    h.engine()
        .sync(&plan, CancellationToken::new())
        .await
        .expect_err("first run fails");
    assert_eq!(h.inner.item_count().await, 3);

    // Transport recovers; retry.
    h.armed.store(false, Ordering::SeqCst);
    let report = h
        .engine()
        .sync(&plan, CancellationToken::new())
        .await
        .expect("retry run should succeed");

    assert_eq!(report.created, 0, "no duplicate for the half-created item");
    assert_eq!(h.inner.item_count().await, 3);
    assert!(report.enriched >= 1, "the missing labels are applied");
    assert_eq!(report.relations_applied, 2, "parent links finally land");

    let map = SyncMap::load(&h.map_path, "", "owner/repo", "").unwrap();
    assert!(map.synced_at.is_some());

    let t1 = h
        .inner
        .get_item(&map.entry("T1").unwrap().remote_id)
        .await
        .unwrap();
    assert!(t1.labels.contains(&"planpilot".to_owned()));
}

#[tokio::test]
async fn unretryable_create_failure_names_the_item_and_step() {
    // Arm nothing; instead give the plan an item the provider rejects
    // outright (empty title), which is a semantic, unretryable error.
    let h = TestHarness::new();
    h.armed.store(false, Ordering::SeqCst);

    let mut plan = labeled_plan();
    plan.items.iter_mut().find(|i| i.id == "E1").unwrap().title = " ".to_owned();

    let err = h
        .engine()
        .sync(&plan, CancellationToken::new())
        .await
        .expect_err("empty title must be rejected");

    let SyncError::Item { item_id, step, .. } = &err else {
        panic!("expected Item error, got: {err}");
    };
    assert_eq!(item_id, "E1");
    assert_eq!(*step, SyncStep::Create);
    assert!(!err.is_retryable());

    // The epic wave failed, so no children were ever dispatched.
    assert_eq!(h.inner.item_count().await, 0);
}
