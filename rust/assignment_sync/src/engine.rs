//! Assignment engine: serializes mutating operations against the remote
//! authority and keeps the store's assigned set in step with it.
//!
//! Mutating operations (single-item assign/unassign and per-category bulk
//! select/deselect) share one [`OperationLock`]. A call arriving while the
//! lock is held is dropped and reported as [`OperationOutcome::Skipped`].
//! The assigned set changes only after the server responds; the lock is
//! released synchronously when the operation settles, before any listener
//! callback runs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::TransportError;
use crate::filter::{effective_term, SearchController};
use crate::lock::OperationLock;
use crate::notify::{AssignmentListener, ChangeNotifier};
use crate::policy::{BulkDirection, Reconciliation};
use crate::store::AssignmentStore;
use crate::transport::{self, AssignmentTransport};
use crate::types::{AssignableItem, AssignmentKind, CategorySummary, ItemGroup, Notification};

/// Why a mutating call did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ReadOnly,
    /// `initialize` has not bound a parent entity yet.
    NotInitialized,
    /// Another operation holds the lock.
    Busy(OperationLock),
}

/// Result of one mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The server confirmed the change and the assigned set was updated.
    Committed,
    /// The request failed with a conflict-class status; the assigned set was
    /// updated as if it had succeeded and an error was still reported.
    Reconciled,
    /// The request failed; the assigned set is unchanged.
    Failed,
    /// No catalog item in the category needed changing.
    NothingToDo,
    /// Dropped before any request was issued.
    Skipped(SkipReason),
}

impl OperationOutcome {
    /// Whether the assigned set now reflects the requested change.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Committed | Self::Reconciled | Self::NothingToDo)
    }
}

struct EngineState {
    store: AssignmentStore,
    lock: OperationLock,
    notifier: ChangeNotifier,
}

impl EngineState {
    /// Resolved assigned items, if they differ from the last emission.
    fn pending_emission(&mut self) -> Option<Arc<[AssignableItem]>> {
        let ids = self.store.sorted_assigned_ids();
        if self.notifier.should_emit(ids) {
            Some(self.store.assigned_items())
        } else {
            None
        }
    }
}

fn lock_state(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operation lock held by an in-flight call.
///
/// Released by [`HeldLock::settle`], or on drop if the call's future is
/// dropped before the request settles.
struct HeldLock<'a> {
    state: &'a Mutex<EngineState>,
    armed: bool,
}

impl<'a> HeldLock<'a> {
    /// Apply the settlement to the engine state and release the lock in the
    /// same critical section.
    fn settle<R>(mut self, apply: impl FnOnce(&mut EngineState) -> R) -> R {
        self.armed = false;
        let mut state = lock_state(self.state);
        let result = apply(&mut state);
        state.lock.release();
        result
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = lock_state(self.state);
            warn!("operation dropped before settlement ({}), releasing lock", state.lock);
            state.lock.release();
        }
    }
}

/// Engine for one parent entity's assignments.
pub struct AssignmentEngine<T> {
    kind: AssignmentKind,
    transport: T,
    config: EngineConfig,
    readonly: AtomicBool,
    listener: Arc<dyn AssignmentListener>,
    state: Mutex<EngineState>,
}

impl<T: AssignmentTransport> AssignmentEngine<T> {
    pub fn new(
        kind: AssignmentKind,
        transport: T,
        config: EngineConfig,
        listener: Arc<dyn AssignmentListener>,
    ) -> Self {
        let mut store = AssignmentStore::new();
        store.set_search_term(&effective_term("", config.min_search_len));
        Self {
            kind,
            transport,
            readonly: AtomicBool::new(config.readonly),
            config,
            listener,
            state: Mutex::new(EngineState {
                store,
                lock: OperationLock::Idle,
                notifier: ChangeNotifier::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        lock_state(&self.state)
    }

    pub fn kind(&self) -> AssignmentKind {
        self.kind
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =========================================================================
    // Session setup
    // =========================================================================

    /// Bind to `parent_id`, seed the assigned set from the collaborator's
    /// snapshot and load the catalog.
    pub async fn initialize(&self, parent_id: &str, assigned: &[AssignableItem]) {
        {
            let mut state = self.state();
            state.store.initialize(parent_id, assigned);
            let baseline = state.store.sorted_assigned_ids();
            state.notifier.set_baseline(baseline);
        }
        info!(
            "Editing {} {} ({} {}s assigned)",
            self.kind.parent_noun(),
            parent_id,
            assigned.len(),
            self.kind.item_noun()
        );
        self.load_catalog().await;
    }

    /// Seed from the server's current assignment instead of a collaborator
    /// snapshot. Fails only if the assignment itself cannot be fetched.
    pub async fn initialize_from_remote(&self, parent_id: &str) -> transport::Result<()> {
        let assigned = self
            .bounded(self.transport.fetch_assigned(parent_id))
            .await?;
        self.initialize(parent_id, &assigned).await;
        Ok(())
    }

    /// Fetch the full catalog. On failure the catalog is left empty and one
    /// error notification is raised.
    pub async fn load_catalog(&self) -> Vec<AssignableItem> {
        debug!("Loading {} catalog", self.kind.item_noun());
        match self.bounded(self.transport.fetch_catalog()).await {
            Ok(items) => {
                debug!("Loaded {} {}s", items.len(), self.kind.item_noun());
                self.state().store.set_catalog(items.clone());
                items
            }
            Err(e) => {
                error!("Failed to load {} catalog: {}", self.kind.item_noun(), e);
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Failed to load {}s", self.kind.item_noun()));
                self.state().store.set_catalog_error(message.clone());
                self.listener.on_notification(&Notification::error(message));
                Vec::new()
            }
        }
    }

    /// Replace the assigned set with a new collaborator snapshot if its ids
    /// differ. Returns whether the set changed.
    pub fn resync(&self, snapshot: &[AssignableItem]) -> bool {
        let mut state = self.state();
        if !state.store.resync(snapshot) {
            return false;
        }
        let baseline = state.store.sorted_assigned_ids();
        debug!("Resynced assigned set ({} ids)", baseline.len());
        state.notifier.set_baseline(baseline);
        true
    }

    pub fn set_readonly(&self, readonly: bool) {
        self.readonly.store(readonly, Ordering::SeqCst);
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Filter inputs
    // =========================================================================

    /// Apply search text immediately (length-gated, not debounced). Feed it
    /// from [`Self::search_controller`] to get debouncing.
    pub fn set_search(&self, text: &str) {
        let term = effective_term(text, self.config.min_search_len);
        self.state().store.set_search_term(&term);
    }

    /// Debounced search driver using this engine's configured quiet period
    /// and minimum term length. Feed its output into [`Self::set_search`].
    pub fn search_controller(&self) -> SearchController {
        SearchController::new(self.config.search_debounce, self.config.min_search_len)
    }

    pub fn set_category(&self, category: Option<&str>) {
        self.state().store.set_category(category);
    }

    // =========================================================================
    // Read-only views
    // =========================================================================

    pub fn parent_id(&self) -> Option<String> {
        self.state().store.parent_id().map(str::to_string)
    }

    pub fn is_assigned(&self, id: &str) -> bool {
        self.state().store.is_assigned(id)
    }

    pub fn assigned_count(&self) -> usize {
        self.state().store.assigned_count()
    }

    pub fn total_count(&self) -> usize {
        self.state().store.total_count()
    }

    pub fn is_busy(&self) -> bool {
        self.state().lock.is_busy()
    }

    pub fn current_operation(&self) -> OperationLock {
        self.state().lock.clone()
    }

    pub fn filtered_items(&self) -> Arc<[AssignableItem]> {
        self.state().store.filtered_items()
    }

    pub fn grouped_items(&self) -> Arc<[ItemGroup]> {
        self.state().store.grouped_items()
    }

    pub fn assigned_items(&self) -> Arc<[AssignableItem]> {
        self.state().store.assigned_items()
    }

    pub fn sorted_assigned_ids(&self) -> Vec<String> {
        self.state().store.sorted_assigned_ids()
    }

    pub fn categories(&self) -> Vec<String> {
        self.state().store.categories()
    }

    pub fn category_summary(&self, category: &str) -> CategorySummary {
        self.state().store.category_summary(category)
    }

    pub fn is_category_fully_assigned(&self, category: &str) -> bool {
        self.category_summary(category).is_fully_assigned()
    }

    pub fn find_item(&self, id: &str) -> Option<AssignableItem> {
        self.state().store.find(id).cloned()
    }

    pub fn catalog_error(&self) -> Option<String> {
        self.state().store.catalog_error().map(str::to_string)
    }

    /// Recomputation counters of the derived views: (filtered, grouped,
    /// assigned items).
    pub fn view_computations(&self) -> (u64, u64, u64) {
        self.state().store.view_computations()
    }

    // =========================================================================
    // Single-item operations
    // =========================================================================

    /// Attach one item. The caller only offers this for unassigned items.
    pub async fn assign(&self, item: &AssignableItem) -> OperationOutcome {
        self.run_item(item, BulkDirection::Add).await
    }

    /// Detach one item. The caller only offers this for assigned items.
    pub async fn unassign(&self, item: &AssignableItem) -> OperationOutcome {
        self.run_item(item, BulkDirection::Remove).await
    }

    async fn run_item(&self, item: &AssignableItem, direction: BulkDirection) -> OperationOutcome {
        let (held, parent_id) = match self.begin(|lock| lock.try_acquire_item(&item.id)) {
            Ok(begun) => begun,
            Err(outcome) => return outcome,
        };

        let verb = verb(direction);
        debug!("{} {} {} on {}", verb, self.kind.item_noun(), item.id, parent_id);
        let result = match direction {
            BulkDirection::Add => {
                self.bounded(self.transport.add_assignment(&parent_id, &item.id))
                    .await
            }
            BulkDirection::Remove => {
                self.bounded(self.transport.remove_assignment(&parent_id, &item.id))
                    .await
            }
        };

        let noun = self.kind.item_noun();
        let (outcome, notification, emission) = held.settle(|state| match &result {
            Ok(()) => {
                match direction {
                    BulkDirection::Add => state.store.mark_assigned([item.id.as_str()]),
                    BulkDirection::Remove => state.store.mark_unassigned([item.id.as_str()]),
                };
                info!("{} {} {} on {}", past(direction), noun, item.id, parent_id);
                (
                    OperationOutcome::Committed,
                    Notification::success(format!("{} {} {}", past(direction), noun, item.label())),
                    state.pending_emission(),
                )
            }
            Err(e) => {
                error!("Failed to {} {} {}: {}", verb, noun, item.id, e);
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Failed to {} {} {}", verb, noun, item.label()));
                (OperationOutcome::Failed, Notification::error(message), None)
            }
        });

        self.publish(notification, emission);
        outcome
    }

    // =========================================================================
    // Bulk category operations
    // =========================================================================

    /// Attach every unassigned catalog item in `category` in one request.
    pub async fn select_all_in_category(&self, category: &str) -> OperationOutcome {
        self.run_bulk(category, BulkDirection::Add).await
    }

    /// Detach every assigned catalog item in `category` in one request.
    pub async fn deselect_all_in_category(&self, category: &str) -> OperationOutcome {
        self.run_bulk(category, BulkDirection::Remove).await
    }

    async fn run_bulk(&self, category: &str, direction: BulkDirection) -> OperationOutcome {
        let (held, parent_id) = match self.begin(|lock| lock.try_acquire_category(category)) {
            Ok(begun) => begun,
            Err(outcome) => return outcome,
        };

        // Full catalog membership, regardless of the current filter.
        let targets = self
            .state()
            .store
            .ids_in_category(category, direction == BulkDirection::Remove);
        if targets.is_empty() {
            held.settle(|_| ());
            debug!("Nothing to {} in category {}", verb(direction), category);
            return OperationOutcome::NothingToDo;
        }

        let verb = verb(direction);
        debug!(
            "{} {} {}s in {} on {}",
            verb,
            targets.len(),
            self.kind.item_noun(),
            category,
            parent_id
        );
        let result = match direction {
            BulkDirection::Add => {
                self.bounded(self.transport.add_assignments(&parent_id, &targets))
                    .await
            }
            BulkDirection::Remove => {
                self.bounded(self.transport.remove_assignments(&parent_id, &targets))
                    .await
            }
        };

        let noun = self.kind.item_noun();
        let policy = self.config.bulk_failure_policy;
        let (outcome, notification, emission) = held.settle(|state| {
            let apply = |state: &mut EngineState| {
                let ids = targets.iter().map(String::as_str);
                match direction {
                    BulkDirection::Add => state.store.mark_assigned(ids),
                    BulkDirection::Remove => state.store.mark_unassigned(ids),
                };
            };
            match &result {
                Ok(()) => {
                    apply(state);
                    info!(
                        "{} {} {}s in {} on {}",
                        past(direction),
                        targets.len(),
                        noun,
                        category,
                        parent_id
                    );
                    (
                        OperationOutcome::Committed,
                        Notification::success(format!(
                            "{} {} {}s in {}",
                            past(direction),
                            targets.len(),
                            noun,
                            category
                        )),
                        state.pending_emission(),
                    )
                }
                Err(e) => {
                    let message = e.server_message().map(str::to_string).unwrap_or_else(|| {
                        format!("Failed to {} {}s in {}", verb, noun, category)
                    });
                    match policy.reconcile(direction, e) {
                        Reconciliation::AssumeApplied => {
                            warn!(
                                "Bulk {} in {} failed with {}, treating {} ids as already applied",
                                verb,
                                category,
                                e,
                                targets.len()
                            );
                            apply(state);
                            (
                                OperationOutcome::Reconciled,
                                Notification::error(message),
                                state.pending_emission(),
                            )
                        }
                        Reconciliation::Unchanged => {
                            error!("Bulk {} in {} failed: {}", verb, category, e);
                            (OperationOutcome::Failed, Notification::error(message), None)
                        }
                    }
                }
            }
        });

        self.publish(notification, emission);
        outcome
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Gate a mutating call on read-only mode, initialization and the lock.
    fn begin(
        &self,
        acquire: impl FnOnce(&mut OperationLock) -> Result<(), OperationLock>,
    ) -> Result<(HeldLock<'_>, String), OperationOutcome> {
        if self.is_readonly() {
            return Err(OperationOutcome::Skipped(SkipReason::ReadOnly));
        }
        let mut state = self.state();
        let parent_id = match state.store.parent_id() {
            Some(id) => id.to_string(),
            None => return Err(OperationOutcome::Skipped(SkipReason::NotInitialized)),
        };
        if let Err(held_by) = acquire(&mut state.lock) {
            debug!("Dropping operation while {}", held_by);
            return Err(OperationOutcome::Skipped(SkipReason::Busy(held_by)));
        }
        Ok((
            HeldLock {
                state: &self.state,
                armed: true,
            },
            parent_id,
        ))
    }

    /// Bound a request by the configured operation timeout.
    async fn bounded<R, F>(&self, request: F) -> transport::Result<R>
    where
        F: Future<Output = transport::Result<R>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => request.await,
        }
    }

    fn publish(&self, notification: Notification, emission: Option<Arc<[AssignableItem]>>) {
        self.listener.on_notification(&notification);
        if let Some(items) = emission {
            self.listener.on_assigned_change(&items);
        }
    }
}

fn verb(direction: BulkDirection) -> &'static str {
    match direction {
        BulkDirection::Add => "assign",
        BulkDirection::Remove => "unassign",
    }
}

fn past(direction: BulkDirection) -> &'static str {
    match direction {
        BulkDirection::Add => "Assigned",
        BulkDirection::Remove => "Unassigned",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingListener;
    use async_trait::async_trait;

    /// Transport that accepts every request.
    struct AcceptAll;

    #[async_trait]
    impl AssignmentTransport for AcceptAll {
        async fn fetch_catalog(&self) -> transport::Result<Vec<AssignableItem>> {
            Ok(vec![
                AssignableItem::new("1", Some("Users"), "Read"),
                AssignableItem::new("2", Some("Users"), "Write"),
            ])
        }

        async fn fetch_assigned(&self, _parent_id: &str) -> transport::Result<Vec<AssignableItem>> {
            Ok(vec![AssignableItem::new("2", Some("Users"), "Write")])
        }

        async fn add_assignment(&self, _: &str, _: &str) -> transport::Result<()> {
            Ok(())
        }

        async fn add_assignments(&self, _: &str, _: &[String]) -> transport::Result<()> {
            Ok(())
        }

        async fn remove_assignment(&self, _: &str, _: &str) -> transport::Result<()> {
            Ok(())
        }

        async fn remove_assignments(&self, _: &str, _: &[String]) -> transport::Result<()> {
            Ok(())
        }
    }

    fn engine(listener: Arc<RecordingListener>) -> AssignmentEngine<AcceptAll> {
        AssignmentEngine::new(
            AssignmentKind::PermissionsOnRole,
            AcceptAll,
            EngineConfig::default(),
            listener,
        )
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let engine = engine(Arc::new(RecordingListener::new()));
        let item = AssignableItem::new("1", Some("Users"), "Read");
        assert_eq!(
            engine.assign(&item).await,
            OperationOutcome::Skipped(SkipReason::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_initialize_from_remote_seeds_and_loads() {
        let listener = Arc::new(RecordingListener::new());
        let engine = engine(listener.clone());
        engine.initialize_from_remote("role-1").await.unwrap();

        assert_eq!(engine.parent_id().as_deref(), Some("role-1"));
        assert_eq!(engine.total_count(), 2);
        assert!(engine.is_assigned("2"));
        // Seeding never echoes back to the collaborator.
        assert!(listener.changes().is_empty());
    }

    #[tokio::test]
    async fn test_readonly_skips_everything() {
        let listener = Arc::new(RecordingListener::new());
        let engine = engine(listener.clone());
        engine.initialize_from_remote("role-1").await.unwrap();
        engine.set_readonly(true);

        let item = AssignableItem::new("1", Some("Users"), "Read");
        let skipped = OperationOutcome::Skipped(SkipReason::ReadOnly);
        assert_eq!(engine.assign(&item).await, skipped);
        assert_eq!(engine.select_all_in_category("Users").await, skipped);
        assert_eq!(engine.deselect_all_in_category("Users").await, skipped);
        assert!(listener.notifications().is_empty());
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_dropped_future_releases_lock() {
        let engine = engine(Arc::new(RecordingListener::new()));
        engine.initialize_from_remote("role-1").await.unwrap();

        let (held, _) = engine
            .begin(|lock| lock.try_acquire_item("1"))
            .unwrap();
        assert!(engine.is_busy());
        drop(held);
        assert!(!engine.is_busy());
    }
}
