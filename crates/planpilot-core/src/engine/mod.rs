//! The sync engine: converges a validated plan onto a remote tracker.
//!
//! Four ordered phases -- Discover, Create, Enrich, Relations -- each
//! reported to a [`SyncObserver`]. Remote work is dispatched with a
//! semaphore-bounded worker pool; results funnel back over an mpsc
//! channel into the engine loop, which is the single owner of the sync
//! map, so concurrent completions can never lose a map update. On a
//! fatal error the engine stops dispatching, lets in-flight work drain,
//! persists everything that succeeded, and only then surfaces the first
//! underlying cause.

pub mod error;
pub mod observer;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::plan::hash::compute_plan_id;
use crate::plan::model::{Plan, PlanItem, PlanItemType};
use crate::plan::rollup::{declared_edges, rollup_edges};
use crate::provider::{
    CreateItemInput, Provider, ProviderError, RemoteItem, SearchFilters, UpdateItemInput,
};
use crate::remote::metadata::{parse_metadata, KEY_PLAN_ID, META_START};
use crate::remote::parser::{plan_item_from_remote, MIGRATED_PLACEHOLDER};
use crate::remote::reconcile::reconcile_discovered;
use crate::render::{BodyRenderer, ItemRef, RenderContext};
use crate::syncmap::{SyncEntry, SyncMap};

pub use error::{SyncError, SyncStep};
pub use observer::{ChannelObserver, NoopObserver, SyncEvent, SyncObserver, SyncPhase};

/// How the Discover phase finds existing remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Consult the persisted sync map from prior runs.
    Normal,
    /// Scan the tracker for items tagged with this plan id and rebuild
    /// the map from what is found.
    MapSync,
}

/// Caller-supplied engine configuration.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Authoritative sync map path. Dry runs write to a `.dry-run`
    /// sibling instead.
    pub map_path: PathBuf,
    /// Remote location identifier, e.g. "owner/repo".
    pub target: String,
    pub board_url: String,
    /// Maximum concurrent remote mutations within a phase.
    pub max_in_flight: usize,
    /// Plan mutations without executing them; never touches the
    /// authoritative map or the remote tracker.
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(map_path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            mode: SyncMode::Normal,
            map_path: map_path.into(),
            target: target.into(),
            board_url: String::new(),
            max_in_flight: 4,
            dry_run: false,
        }
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub plan_id: String,
    /// Existing remote items known after Discover.
    pub discovered: usize,
    pub created: usize,
    pub enriched: usize,
    pub relations_applied: usize,
    /// Relations skipped because the tracker already had them.
    pub relations_skipped: usize,
    /// True when the run performed (or, for a dry run, planned) no
    /// mutations at all.
    pub noop: bool,
    pub dry_run: bool,
    /// Where the sync map was persisted.
    pub map_path: PathBuf,
}

/// Orchestrates a full sync run against one provider.
pub struct SyncEngine {
    provider: Arc<dyn Provider>,
    renderer: Arc<dyn BodyRenderer>,
    observer: Arc<dyn SyncObserver>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        renderer: Arc<dyn BodyRenderer>,
        options: SyncOptions,
    ) -> Self {
        Self {
            provider,
            renderer,
            observer: Arc::new(NoopObserver),
            options,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the four sync phases to completion.
    ///
    /// The plan must already have passed strict validation; the engine
    /// does not re-validate.
    pub async fn sync(
        &self,
        plan: &Plan,
        cancel: CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let plan_id = compute_plan_id(plan);
        tracing::info!(
            plan_id = %plan_id,
            items = plan.len(),
            mode = ?self.options.mode,
            dry_run = self.options.dry_run,
            "starting sync"
        );

        // -------------------------------------------------------------
        // Phase 1: Discover.
        // -------------------------------------------------------------
        self.emit(SyncEvent::PhaseStarted {
            phase: SyncPhase::Discover,
            total: None,
        });

        let (mut map, observed_remote) = match self.discover(&plan_id).await {
            Ok(v) => v,
            Err(e) => return Err(self.phase_failed(SyncPhase::Discover, e)),
        };
        let discovered = map.len();
        let stored_plan_id = map.plan_id.clone();
        let previously_synced = map.synced_at.is_some();

        self.emit(SyncEvent::PhaseCompleted {
            phase: SyncPhase::Discover,
        });

        // -------------------------------------------------------------
        // Phase 2: Create.
        // -------------------------------------------------------------
        let to_create: Vec<PlanItem> = plan
            .items
            .iter()
            .filter(|i| map.entry(&i.id).is_none())
            .cloned()
            .collect();

        // An unchanged, fully mapped plan needs no mutations at all:
        // skip straight through the remaining phases.
        let unchanged = previously_synced && stored_plan_id == plan_id && to_create.is_empty();

        self.emit(SyncEvent::PhaseStarted {
            phase: SyncPhase::Create,
            total: Some(to_create.len()),
        });

        let mut created_ids: HashSet<String> = HashSet::new();
        let mut created = 0usize;

        if self.options.dry_run {
            for item in &to_create {
                self.emit(SyncEvent::ItemCompleted {
                    phase: SyncPhase::Create,
                    item_id: item.id.clone(),
                });
            }
            created = to_create.len();
        } else {
            for level in [PlanItemType::Epic, PlanItemType::Story, PlanItemType::Task] {
                let wave: Vec<PlanItem> = to_create
                    .iter()
                    .filter(|i| i.item_type == level)
                    .cloned()
                    .collect();
                if wave.is_empty() {
                    continue;
                }
                // Render after the previous wave has drained, so parent
                // references resolve to confirmed remote identities.
                let prepared: Vec<PreparedCreate> = wave
                    .iter()
                    .map(|item| PreparedCreate {
                        item_id: item.id.clone(),
                        item_type: item.item_type,
                        title: item.title.clone(),
                        labels: item.labels.clone(),
                        body: self
                            .renderer
                            .render(item, &self.render_context(plan, &map, &plan_id, item)),
                    })
                    .collect();

                let wave_result = self
                    .run_create_wave(&mut map, &mut created_ids, prepared, &cancel)
                    .await;

                // The map gained entries either way; persist before the
                // error (if any) propagates.
                if let Err(persist_err) = map.persist(&self.options.map_path, false) {
                    tracing::error!(error = %persist_err, "failed to persist sync map");
                    if wave_result.is_ok() {
                        return Err(self.phase_failed(SyncPhase::Create, persist_err.into()));
                    }
                }

                match wave_result {
                    Ok(n) => created += n,
                    Err(e) => return Err(self.phase_failed(SyncPhase::Create, e)),
                }
            }
        }

        self.emit(SyncEvent::PhaseCompleted {
            phase: SyncPhase::Create,
        });

        // -------------------------------------------------------------
        // Phase 3: Enrich.
        // -------------------------------------------------------------
        let candidates: Vec<&PlanItem> = if unchanged && self.options.mode == SyncMode::Normal {
            // Fingerprint match on a previously synced plan: skip the
            // read-and-compare pass entirely.
            Vec::new()
        } else {
            plan.items
                .iter()
                .filter(|i| map.entry(&i.id).is_some() && !created_ids.contains(&i.id))
                .collect()
        };

        self.emit(SyncEvent::PhaseStarted {
            phase: SyncPhase::Enrich,
            total: Some(candidates.len()),
        });

        let prepared: Vec<PreparedEnrich> = candidates
            .iter()
            .map(|item| {
                let entry = map.entry(&item.id).expect("candidate is mapped");
                PreparedEnrich {
                    item_id: item.id.clone(),
                    remote_id: entry.remote_id.clone(),
                    desired: (*item).clone(),
                    desired_body: self
                        .renderer
                        .render(item, &self.render_context(plan, &map, &plan_id, item)),
                    observed: observed_remote.get(&item.id).cloned(),
                }
            })
            .collect();

        let enriched = match self.run_enrich(prepared, &cancel).await {
            Ok(n) => n,
            Err(e) => {
                // Enrichment mutates no map entries, but persist the
                // stamp-free map anyway in case Create added entries in
                // this run and a crash follows.
                let _ = self.persist_unless_dry(&map);
                return Err(self.phase_failed(SyncPhase::Enrich, e));
            }
        };

        self.emit(SyncEvent::PhaseCompleted {
            phase: SyncPhase::Enrich,
        });

        // -------------------------------------------------------------
        // Phase 4: Relations.
        // -------------------------------------------------------------
        let groups = if unchanged && created == 0 {
            BTreeMap::new()
        } else {
            self.relation_groups(plan, &map)
        };
        let total_ops: usize = groups.values().map(Vec::len).sum();

        self.emit(SyncEvent::PhaseStarted {
            phase: SyncPhase::Relations,
            total: Some(groups.len()),
        });

        let (relations_applied, relations_skipped) = if self.options.dry_run {
            for item_id in groups.keys() {
                self.emit(SyncEvent::ItemCompleted {
                    phase: SyncPhase::Relations,
                    item_id: item_id.clone(),
                });
            }
            (total_ops, 0)
        } else {
            match self.run_relations(groups, &cancel).await {
                Ok(counts) => counts,
                Err(e) => {
                    let _ = self.persist_unless_dry(&map);
                    return Err(self.phase_failed(SyncPhase::Relations, e));
                }
            }
        };

        self.emit(SyncEvent::PhaseCompleted {
            phase: SyncPhase::Relations,
        });

        // -------------------------------------------------------------
        // Finalize: stamp and persist the map.
        // -------------------------------------------------------------
        map.plan_id = plan_id.clone();
        map.synced_at = Some(Utc::now());
        let map_path = map.persist(&self.options.map_path, self.options.dry_run)?;

        let report = SyncReport {
            plan_id,
            discovered,
            created,
            enriched,
            relations_applied,
            relations_skipped,
            noop: created == 0 && enriched == 0 && relations_applied == 0,
            dry_run: self.options.dry_run,
            map_path,
        };
        tracing::info!(
            created = report.created,
            enriched = report.enriched,
            relations = report.relations_applied,
            noop = report.noop,
            "sync complete"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------
    // Discover
    // -----------------------------------------------------------------

    async fn discover(
        &self,
        plan_id: &str,
    ) -> Result<(SyncMap, HashMap<String, RemoteItem>), SyncError> {
        match self.options.mode {
            SyncMode::Normal => {
                let map = SyncMap::load(
                    &self.options.map_path,
                    plan_id,
                    &self.options.target,
                    &self.options.board_url,
                )?;
                tracing::debug!(entries = map.len(), "loaded sync map");
                Ok((map, HashMap::new()))
            }
            SyncMode::MapSync => {
                let filters = SearchFilters {
                    // The start marker narrows the scan; the reconciler
                    // still re-checks PLAN_ID per item.
                    body_contains: Some(format!("{KEY_PLAN_ID}: {plan_id}")),
                    labels: Vec::new(),
                };
                let found = self.provider.search_items(&filters).await?;
                tracing::debug!(found = found.len(), marker = META_START, "scanned tracker");

                let raw_by_remote_id: HashMap<String, RemoteItem> =
                    found.iter().map(|r| (r.id.clone(), r.clone())).collect();
                let outcome = reconcile_discovered(&found, plan_id);

                let mut map = SyncMap::empty(plan_id, &self.options.target, &self.options.board_url);
                let mut observed = HashMap::new();
                for (item_id, entry) in outcome.desired_entries {
                    if let Some(raw) = raw_by_remote_id.get(&entry.remote_id) {
                        observed.insert(item_id.clone(), raw.clone());
                    }
                    self.emit(SyncEvent::ItemCompleted {
                        phase: SyncPhase::Discover,
                        item_id: item_id.clone(),
                    });
                    map.insert(item_id, entry);
                }

                // The rebuilt map is already worth keeping: a crash
                // before Create must not force a rescan.
                self.persist_unless_dry(&map)?;
                Ok((map, observed))
            }
        }
    }

    // -----------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------

    /// Dispatch one wave of creations and drain it completely.
    ///
    /// The engine loop is the only writer of `map`; workers report back
    /// over the channel. On failure the first underlying cause is kept,
    /// dispatch stops, and in-flight work still lands in the map.
    async fn run_create_wave(
        &self,
        map: &mut SyncMap,
        created_ids: &mut HashSet<String>,
        wave: Vec<PreparedCreate>,
        cancel: &CancellationToken,
    ) -> Result<usize, SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight.max(1)));
        let (tx, mut rx) = mpsc::channel::<CreateDone>(wave.len().max(1));
        let mut in_flight = 0usize;
        let mut created = 0usize;
        let mut first_error: Option<SyncError> = None;

        let mut queue = wave.into_iter();
        loop {
            if first_error.is_none() && cancel.is_cancelled() {
                tracing::info!("create phase cancelled, draining in-flight work");
                first_error = Some(SyncError::Cancelled);
            }

            if first_error.is_none() {
                if let Some(work) = queue.next() {
                    let permit = Arc::clone(&semaphore)
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");
                    let provider = Arc::clone(&self.provider);
                    let tx = tx.clone();
                    let item_id = work.item_id.clone();
                    in_flight += 1;

                    tokio::spawn(async move {
                        let result = create_one(provider, work).await;
                        drop(permit);
                        let _ = tx.send(CreateDone { item_id, result }).await;
                    });

                    // Opportunistically fold in finished work.
                    while let Ok(done) = rx.try_recv() {
                        in_flight -= 1;
                        self.handle_create_done(map, created_ids, done, &mut created, &mut first_error);
                    }
                    continue;
                }
            }

            if in_flight == 0 {
                break;
            }
            let Some(done) = rx.recv().await else { break };
            in_flight -= 1;
            self.handle_create_done(map, created_ids, done, &mut created, &mut first_error);
        }

        match first_error {
            None => Ok(created),
            Some(e) => Err(e),
        }
    }

    fn handle_create_done(
        &self,
        map: &mut SyncMap,
        created_ids: &mut HashSet<String>,
        done: CreateDone,
        created: &mut usize,
        first_error: &mut Option<SyncError>,
    ) {
        match done.result {
            Ok(entry) => {
                tracing::info!(item_id = %done.item_id, key = %entry.key, "created remote item");
                map.insert(done.item_id.clone(), entry);
                created_ids.insert(done.item_id.clone());
                *created += 1;
                self.emit(SyncEvent::ItemCompleted {
                    phase: SyncPhase::Create,
                    item_id: done.item_id,
                });
            }
            Err(failure) => {
                tracing::error!(
                    item_id = %done.item_id,
                    step = %failure.step,
                    error = %failure.source,
                    "create failed"
                );
                // A created-but-incomplete item keeps its identity: the
                // map entry is what lets a retry run resume instead of
                // duplicating.
                if let Some(entry) = failure.entry.clone() {
                    map.insert(done.item_id.clone(), entry);
                    created_ids.insert(done.item_id.clone());
                }
                if first_error.is_none() {
                    *first_error = Some(match failure.entry {
                        Some(entry) => SyncError::CreatedButIncomplete {
                            item_id: done.item_id,
                            entry,
                            completed: failure.completed,
                            step: failure.step,
                            source: failure.source,
                        },
                        None => SyncError::Item {
                            item_id: done.item_id,
                            step: failure.step,
                            source: failure.source,
                        },
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Enrich
    // -----------------------------------------------------------------

    async fn run_enrich(
        &self,
        prepared: Vec<PreparedEnrich>,
        cancel: &CancellationToken,
    ) -> Result<usize, SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight.max(1)));
        let (tx, mut rx) = mpsc::channel::<EnrichDone>(prepared.len().max(1));
        let mut in_flight = 0usize;
        let mut enriched = 0usize;
        let mut first_error: Option<SyncError> = None;
        let dry_run = self.options.dry_run;

        let mut queue = prepared.into_iter();
        loop {
            if first_error.is_none() && cancel.is_cancelled() {
                first_error = Some(SyncError::Cancelled);
            }

            if first_error.is_none() {
                if let Some(work) = queue.next() {
                    let permit = Arc::clone(&semaphore)
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");
                    let provider = Arc::clone(&self.provider);
                    let tx = tx.clone();
                    let item_id = work.item_id.clone();
                    in_flight += 1;

                    tokio::spawn(async move {
                        let result = enrich_one(provider, work, dry_run).await;
                        drop(permit);
                        let _ = tx.send(EnrichDone { item_id, result }).await;
                    });
                    continue;
                }
            }

            if in_flight == 0 {
                break;
            }
            let Some(done) = rx.recv().await else { break };
            in_flight -= 1;
            match done.result {
                Ok(updated) => {
                    if updated {
                        tracing::info!(item_id = %done.item_id, "enriched remote item");
                        enriched += 1;
                    }
                    self.emit(SyncEvent::ItemCompleted {
                        phase: SyncPhase::Enrich,
                        item_id: done.item_id,
                    });
                }
                Err(source) => {
                    tracing::error!(item_id = %done.item_id, error = %source, "enrich failed");
                    if first_error.is_none() {
                        first_error = Some(SyncError::Item {
                            item_id: done.item_id,
                            step: SyncStep::Enrich,
                            source,
                        });
                    }
                }
            }
        }

        match first_error {
            None => Ok(enriched),
            Some(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------
    // Relations
    // -----------------------------------------------------------------

    /// All relation mutations for this plan, grouped by the item being
    /// mutated. Groups run concurrently; within a group, mutations are
    /// serialized so parallel writes to one remote item cannot race.
    fn relation_groups(&self, plan: &Plan, map: &SyncMap) -> BTreeMap<String, Vec<RelationOp>> {
        let mut groups: BTreeMap<String, Vec<RelationOp>> = BTreeMap::new();

        // Parent links.
        for item in &plan.items {
            let Some(parent_id) = item.parent_id.as_deref() else {
                continue;
            };
            let (Some(child_entry), Some(parent_entry)) =
                (map.entry(&item.id), map.entry(parent_id))
            else {
                continue;
            };
            groups.entry(item.id.clone()).or_default().push(RelationOp {
                kind: RelationKind::Parent,
                remote_id: child_entry.remote_id.clone(),
                other_remote_id: parent_entry.remote_id.clone(),
                other_id: parent_id.to_owned(),
            });
        }

        // Blocked-by edges: everything declared, plus level-by-level
        // rollups (task deps -> story edges; story edges, declared and
        // derived, -> epic edges).
        let mut edges: BTreeSet<(String, String)> = plan
            .items
            .iter()
            .flat_map(|item| {
                item.depends_on
                    .iter()
                    .map(|dep| (item.id.clone(), dep.clone()))
            })
            .collect();

        let task_edges = declared_edges(&plan.items, PlanItemType::Task);
        let mut story_edges = declared_edges(&plan.items, PlanItemType::Story);
        story_edges.extend(rollup_edges(&plan.items, &task_edges));
        let epic_edges = rollup_edges(&plan.items, &story_edges);
        edges.extend(story_edges);
        edges.extend(epic_edges);

        for (blocked, blocking) in edges {
            let (Some(blocked_entry), Some(blocking_entry)) =
                (map.entry(&blocked), map.entry(&blocking))
            else {
                continue;
            };
            groups.entry(blocked).or_default().push(RelationOp {
                kind: RelationKind::BlockedBy,
                remote_id: blocked_entry.remote_id.clone(),
                other_remote_id: blocking_entry.remote_id.clone(),
                other_id: blocking,
            });
        }

        groups
    }

    /// Run every relation group, drain them all, then surface the first
    /// underlying cause if any group failed.
    async fn run_relations(
        &self,
        groups: BTreeMap<String, Vec<RelationOp>>,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize), SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight.max(1)));

        let group_futures: Vec<_> = groups
            .into_iter()
            .map(|(item_id, ops)| {
                let provider = Arc::clone(&self.provider);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");
                    if cancel.is_cancelled() {
                        return (item_id, GroupOutcome::Cancelled);
                    }
                    let outcome = match relate_group(provider, &ops).await {
                        Ok((applied, skipped)) => GroupOutcome::Done { applied, skipped },
                        Err((step, source)) => GroupOutcome::Failed { step, source },
                    };
                    (item_id, outcome)
                }
            })
            .collect();

        let mut applied = 0usize;
        let mut skipped = 0usize;
        let mut first_error: Option<SyncError> = None;
        let mut cancelled = false;

        for (item_id, outcome) in futures::future::join_all(group_futures).await {
            match outcome {
                GroupOutcome::Done {
                    applied: group_applied,
                    skipped: group_skipped,
                } => {
                    applied += group_applied;
                    skipped += group_skipped;
                    self.emit(SyncEvent::ItemCompleted {
                        phase: SyncPhase::Relations,
                        item_id,
                    });
                }
                GroupOutcome::Failed { step, source } => {
                    tracing::error!(
                        item_id = %item_id,
                        step = %step,
                        error = %source,
                        "relation failed"
                    );
                    if first_error.is_none() {
                        first_error = Some(SyncError::Item {
                            item_id,
                            step,
                            source,
                        });
                    }
                }
                GroupOutcome::Cancelled => cancelled = true,
            }
        }

        match first_error {
            Some(e) => Err(e),
            None if cancelled => Err(SyncError::Cancelled),
            None => Ok((applied, skipped)),
        }
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    /// Remote references for the renderer, resolved through the sync
    /// map. References without a confirmed remote identity yet are
    /// omitted; later enrichment fills them in.
    fn render_context(
        &self,
        plan: &Plan,
        map: &SyncMap,
        plan_id: &str,
        item: &PlanItem,
    ) -> RenderContext {
        let make_ref = |id: &str| -> Option<ItemRef> {
            let entry = map.entry(id)?;
            Some(ItemRef {
                id: id.to_owned(),
                key: entry.key.clone(),
                title: plan.item(id).map(|i| i.title.clone()).unwrap_or_default(),
            })
        };

        RenderContext {
            plan_id: plan_id.to_owned(),
            parent: item.parent_id.as_deref().and_then(make_ref),
            sub_items: item
                .sub_item_ids
                .iter()
                .filter_map(|id| make_ref(id))
                .collect(),
            depends_on: item
                .depends_on
                .iter()
                .filter_map(|id| make_ref(id))
                .collect(),
        }
    }

    fn persist_unless_dry(&self, map: &SyncMap) -> Result<(), SyncError> {
        if !self.options.dry_run {
            map.persist(&self.options.map_path, false)?;
        }
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        self.observer.on_event(&event);
    }

    fn phase_failed(&self, phase: SyncPhase, error: SyncError) -> SyncError {
        self.emit(SyncEvent::PhaseFailed {
            phase,
            message: error.to_string(),
        });
        error
    }
}

// ---------------------------------------------------------------------------
// Worker-side types and functions
// ---------------------------------------------------------------------------

struct PreparedCreate {
    item_id: String,
    item_type: PlanItemType,
    title: String,
    labels: Vec<String>,
    body: String,
}

struct CreateDone {
    item_id: String,
    result: Result<SyncEntry, CreateFailure>,
}

struct CreateFailure {
    entry: Option<SyncEntry>,
    completed: Vec<SyncStep>,
    step: SyncStep,
    source: ProviderError,
}

/// Create one remote item and apply its initial labels.
///
/// Label application is a required follow-up step: when it fails, the
/// already-created identity travels with the error.
async fn create_one(
    provider: Arc<dyn Provider>,
    work: PreparedCreate,
) -> Result<SyncEntry, CreateFailure> {
    let input = CreateItemInput {
        title: work.title,
        body: work.body,
    };
    let remote = provider
        .create_item(&input)
        .await
        .map_err(|source| CreateFailure {
            entry: None,
            completed: Vec::new(),
            step: SyncStep::Create,
            source,
        })?;

    let entry = SyncEntry {
        remote_id: remote.id.clone(),
        key: remote.key,
        url: remote.url,
        item_type: work.item_type,
    };

    if !work.labels.is_empty() {
        let update = UpdateItemInput {
            labels: Some(work.labels),
            ..UpdateItemInput::default()
        };
        provider
            .update_item(&remote.id, &update)
            .await
            .map_err(|source| CreateFailure {
                entry: Some(entry.clone()),
                completed: vec![SyncStep::Create],
                step: SyncStep::ApplyLabels,
                source,
            })?;
    }

    Ok(entry)
}

struct PreparedEnrich {
    item_id: String,
    remote_id: String,
    desired: PlanItem,
    desired_body: String,
    /// Remote content already in hand from map-sync discovery; `None`
    /// means fetch fresh.
    observed: Option<RemoteItem>,
}

struct EnrichDone {
    item_id: String,
    result: Result<bool, ProviderError>,
}

/// Compare one mapped item against its observed remote state and update
/// it when they differ. Returns whether an update happened (or, in dry
/// run, would have).
async fn enrich_one(
    provider: Arc<dyn Provider>,
    work: PreparedEnrich,
    dry_run: bool,
) -> Result<bool, ProviderError> {
    let observed = match work.observed {
        Some(observed) => observed,
        None => provider.get_item(&work.remote_id).await?,
    };
    let meta = parse_metadata(&observed.body);
    let recovered = plan_item_from_remote(&work.item_id, &meta, &observed.title, &observed.body);

    if !needs_enrich(&work.desired, &recovered, &observed) {
        return Ok(false);
    }
    if dry_run {
        return Ok(true);
    }

    let update = UpdateItemInput {
        title: Some(work.desired.title.clone()),
        body: Some(work.desired_body),
        labels: if work.desired.labels.is_empty() {
            None
        } else {
            Some(work.desired.labels.clone())
        },
    };
    provider.update_item(&work.remote_id, &update).await?;
    Ok(true)
}

/// Whether the desired item differs from the observed remote state.
///
/// The comparison is semantic, not textual, and placeholder-aware: a
/// remote-recovered `(migrated from remote)` stands for an absent field,
/// so recovered items never cause update churn. Labels only count when
/// the plan wants one the remote lacks; extra remote labels are left to
/// their owners.
fn needs_enrich(desired: &PlanItem, recovered: &PlanItem, observed: &RemoteItem) -> bool {
    if desired.title != observed.title {
        return true;
    }
    if normalize_text(desired.goal.as_deref()) != normalize_text(recovered.goal.as_deref()) {
        return true;
    }
    let lists = [
        (&desired.requirements, &recovered.requirements),
        (&desired.acceptance_criteria, &recovered.acceptance_criteria),
        (&desired.success_metrics, &recovered.success_metrics),
        (&desired.assumptions, &recovered.assumptions),
        (&desired.risks, &recovered.risks),
    ];
    for (want, have) in lists {
        if normalize_list(want) != normalize_list(have) {
            return true;
        }
    }
    desired.labels.iter().any(|l| !observed.labels.contains(l))
}

fn normalize_text(value: Option<&str>) -> Option<&str> {
    match value {
        None => None,
        Some(s) => {
            let s = s.trim();
            if s.is_empty() || s == MIGRATED_PLACEHOLDER {
                None
            } else {
                Some(s)
            }
        }
    }
}

fn normalize_list(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != MIGRATED_PLACEHOLDER)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationKind {
    Parent,
    BlockedBy,
}

struct RelationOp {
    kind: RelationKind,
    /// Remote id of the item being mutated.
    remote_id: String,
    other_remote_id: String,
    /// Plan id of the other endpoint, for diagnostics.
    other_id: String,
}

enum GroupOutcome {
    Done { applied: usize, skipped: usize },
    Failed { step: SyncStep, source: ProviderError },
    Cancelled,
}

/// Apply one item's relation mutations sequentially.
///
/// An already-present relation is a skip, not a failure; anything else
/// aborts the group with the step that failed.
async fn relate_group(
    provider: Arc<dyn Provider>,
    ops: &[RelationOp],
) -> Result<(usize, usize), (SyncStep, ProviderError)> {
    let mut applied = 0usize;
    let mut skipped = 0usize;

    for op in ops {
        let (step, result) = match op.kind {
            RelationKind::Parent => (
                SyncStep::SetParent,
                provider.set_parent(&op.remote_id, &op.other_remote_id).await,
            ),
            RelationKind::BlockedBy => (
                SyncStep::AddDependency,
                provider
                    .add_dependency(&op.remote_id, &op.other_remote_id)
                    .await,
            ),
        };
        match result {
            Ok(()) => applied += 1,
            Err(e) if e.is_already_exists() => {
                tracing::debug!(other = %op.other_id, "relation already present, skipping");
                skipped += 1;
            }
            Err(e) => return Err((step, e)),
        }
    }

    Ok((applied, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with(goal: Option<&str>, requirements: &[&str]) -> PlanItem {
        let mut item = PlanItem::new("T1", PlanItemType::Task, "Title");
        item.goal = goal.map(str::to_owned);
        item.requirements = requirements.iter().map(|s| (*s).to_owned()).collect();
        item
    }

    fn observed(title: &str, labels: &[&str]) -> RemoteItem {
        RemoteItem {
            id: "rid".to_owned(),
            key: "#1".to_owned(),
            url: String::new(),
            title: title.to_owned(),
            body: String::new(),
            labels: labels.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn needs_enrich_detects_title_change() {
        let desired = item_with(Some("g"), &[]);
        let recovered = item_with(Some("g"), &[]);
        assert!(needs_enrich(&desired, &recovered, &observed("Other", &[])));
        assert!(!needs_enrich(&desired, &recovered, &observed("Title", &[])));
    }

    #[test]
    fn needs_enrich_is_placeholder_aware() {
        // Desired has no goal; remote recovery substituted the
        // placeholder. That is not drift.
        let desired = item_with(None, &[]);
        let recovered = item_with(Some(MIGRATED_PLACEHOLDER), &[MIGRATED_PLACEHOLDER]);
        assert!(!needs_enrich(&desired, &recovered, &observed("Title", &[])));
    }

    #[test]
    fn needs_enrich_detects_list_drift() {
        let desired = item_with(Some("g"), &["a", "b"]);
        let recovered = item_with(Some("g"), &["a"]);
        assert!(needs_enrich(&desired, &recovered, &observed("Title", &[])));
    }

    #[test]
    fn needs_enrich_wants_missing_labels_only() {
        let mut desired = item_with(Some("g"), &[]);
        desired.labels = vec!["planpilot".to_owned()];
        let recovered = item_with(Some("g"), &[]);

        assert!(needs_enrich(&desired, &recovered, &observed("Title", &[])));
        // Present label satisfies; extra remote labels are tolerated.
        assert!(!needs_enrich(
            &desired,
            &recovered,
            &observed("Title", &["planpilot", "hand-added"])
        ));
    }

    #[test]
    fn sync_options_defaults() {
        let options = SyncOptions::new("/tmp/map.json", "owner/repo");
        assert_eq!(options.mode, SyncMode::Normal);
        assert_eq!(options.max_in_flight, 4);
        assert!(!options.dry_run);
    }
}
