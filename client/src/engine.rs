//! The sync engine: queue ownership, persistence and the pass scheduler.
//!
//! A [`SyncEngine`] is a cheap handle (clone it freely) around shared state.
//! The queue lives behind a mutex that is only held for synchronous work, so
//! enqueues and queries never wait on a remote call. At most one pass runs at
//! a time; operations inside a pass run one after another.

use crate::api::RemoteApi;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncSettings;
use crate::error::Result;
use crate::executor;
use crate::network::NetworkMonitor;
use crate::status::{PassReport, SyncStatus};
use crate::storage::{MemoryStorage, QueueStorage};
use ferry_engine::{
    Conflict, EnqueueMeta, EntityType, Operation, OperationId, OperationKind, OperationQueue,
    Resolution, ResolutionOutcome, Transition,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

struct Inner {
    queue: Mutex<OperationQueue>,
    api: Arc<dyn RemoteApi>,
    storage: Arc<dyn QueueStorage>,
    network: Arc<NetworkMonitor>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    default_max_retries: Option<u32>,
    status: watch::Sender<SyncStatus>,
}

/// Offline-first operation sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    api: Arc<dyn RemoteApi>,
    network: Arc<NetworkMonitor>,
    storage: Arc<dyn QueueStorage>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    default_max_retries: Option<u32>,
}

impl SyncEngineBuilder {
    /// Persist the queue here. Defaults to [`MemoryStorage`].
    pub fn storage(mut self, storage: Arc<dyn QueueStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Retry budget for operations enqueued without one.
    pub fn default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = Some(max_retries);
        self
    }

    /// Load the persisted queue and build the engine.
    pub fn build(self) -> Result<SyncEngine> {
        let queue = match self.storage.load()? {
            Some(snapshot) => {
                let queue = OperationQueue::from_snapshot(snapshot)?;
                tracing::info!(
                    operations = queue.len(),
                    pending = queue.pending_count(),
                    conflicts = queue.conflicts().len(),
                    "Restored queue from storage"
                );
                queue
            }
            None => OperationQueue::new(),
        };

        let status = status_of(&queue, self.network.is_online());
        let (status, _) = watch::channel(status);

        Ok(SyncEngine {
            inner: Arc::new(Inner {
                queue: Mutex::new(queue),
                api: self.api,
                storage: self.storage,
                network: self.network,
                clock: self.clock,
                settings: self.settings,
                default_max_retries: self.default_max_retries,
                status,
            }),
        })
    }
}

impl SyncEngine {
    pub fn builder(api: Arc<dyn RemoteApi>, network: Arc<NetworkMonitor>) -> SyncEngineBuilder {
        SyncEngineBuilder {
            api,
            network,
            storage: Arc::new(MemoryStorage::new()),
            clock: Arc::new(SystemClock),
            settings: SyncSettings::default(),
            default_max_retries: None,
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Queue an operation and return its id.
    ///
    /// The operation is persisted before this returns; if the save fails the
    /// operation is dropped again and the error is returned. While online a
    /// pass is scheduled in the background.
    pub fn enqueue(
        &self,
        kind: OperationKind,
        payload: Value,
        mut meta: EnqueueMeta,
    ) -> Result<OperationId> {
        if meta.max_retries.is_none() {
            meta.max_retries = self.inner.default_max_retries;
        }
        let now = self.inner.clock.now();

        let (id, saved) = self.mutate(|queue| queue.enqueue(kind, payload, meta, now));
        if let Err(e) = saved {
            tracing::error!(op_id = %id, error = %e, "Failed to persist operation, dropping it");
            self.lock_queue().remove(&id);
            self.publish_status();
            return Err(e);
        }

        tracing::info!(op_id = %id, kind = ?kind, "Operation enqueued");

        if self.inner.network.is_online() {
            self.spawn_pass();
        }
        Ok(id)
    }

    /// Drop an operation without syncing it.
    pub fn discard(&self, id: &str) -> bool {
        let (removed, saved) = self.mutate(|queue| queue.remove(id));
        self.log_save_failure(saved);

        match removed {
            Some(op) => {
                tracing::info!(op_id = %op.id, kind = ?op.kind, "Operation discarded");
                true
            }
            None => false,
        }
    }

    /// Reset every failed operation and run a pass.
    pub async fn retry_failed(&self) -> Option<PassReport> {
        let (reset, saved) = self.mutate(OperationQueue::reset_failed);
        self.log_save_failure(saved);

        if !reset.is_empty() {
            tracing::info!(count = reset.len(), "Retrying failed operations");
        }
        self.process_queue().await
    }

    // ------------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------------

    /// Apply a decision to one conflict, optionally syncing right away.
    pub async fn resolve_conflict(
        &self,
        id: &str,
        resolution: Resolution,
        sync_now: bool,
    ) -> Result<ResolutionOutcome> {
        let outcome = self.apply_resolution(id, resolution)?;

        if sync_now && !resolution.discards() {
            self.process_queue().await;
        }
        Ok(outcome)
    }

    /// Apply the same decision to every open conflict.
    ///
    /// Each conflict is resolved on its own; one failure does not stop the
    /// rest. A single pass follows if anything was re-queued.
    pub async fn resolve_all(&self, resolution: Resolution) -> Vec<Result<ResolutionOutcome>> {
        let ids: Vec<OperationId> = self
            .lock_queue()
            .conflicts()
            .iter()
            .map(|c| c.operation_id.clone())
            .collect();

        let results: Vec<_> = ids
            .iter()
            .map(|id| self.apply_resolution(id, resolution))
            .collect();

        let requeued = results
            .iter()
            .any(|r| matches!(r, Ok(ResolutionOutcome::Requeued { .. })));
        if requeued {
            self.process_queue().await;
        }
        results
    }

    fn apply_resolution(&self, id: &str, resolution: Resolution) -> Result<ResolutionOutcome> {
        let (outcome, saved) = self.mutate(|queue| queue.resolve_conflict(id, resolution));
        let outcome = outcome?;
        self.log_save_failure(saved);

        match resolution {
            Resolution::KeepLocal => {
                tracing::info!(op_id = %id, "Conflict resolved: keeping local changes")
            }
            Resolution::KeepServer => {
                tracing::info!(op_id = %id, "Conflict resolved: keeping server version")
            }
            Resolution::Cancel => tracing::info!(op_id = %id, "Conflict resolved: cancelled"),
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Sync pass
    // ------------------------------------------------------------------------

    /// Run one pass over the pending operations.
    ///
    /// Returns `None` without doing anything when offline, when another pass
    /// is running, or when nothing is pending.
    pub async fn process_queue(&self) -> Option<PassReport> {
        if !self.inner.network.is_online() {
            tracing::debug!("Skipping sync pass: offline");
            return None;
        }

        let batch: Vec<OperationId> = {
            let mut queue = self.lock_queue();
            if queue.is_syncing() {
                tracing::debug!("Skipping sync pass: already running");
                return None;
            }
            let batch: Vec<_> = queue.list_pending().iter().map(|op| op.id.clone()).collect();
            if batch.is_empty() {
                return None;
            }
            queue.begin_pass();
            batch
        };
        let pass = PassGuard::new(self);
        self.publish_status();

        tracing::info!(operations = batch.len(), "Sync pass started");

        let mut report = PassReport::default();
        let mut last_error = None;

        for id in &batch {
            if !self.inner.network.is_online() {
                tracing::warn!(
                    remaining = batch.len() - report.attempted,
                    "Connectivity lost, stopping sync pass"
                );
                report.aborted_offline = true;
                break;
            }

            let now = self.inner.clock.now();
            let (op, saved) = self.mutate(|queue| queue.begin_attempt(id, now));
            self.log_save_failure(saved);
            let Some(op) = op else {
                // removed or resolved since the pass started
                continue;
            };

            report.attempted += 1;
            tracing::debug!(
                op_id = %op.id,
                kind = ?op.kind,
                attempt = op.retry_count + 1,
                max_retries = op.max_retries,
                "Executing operation"
            );

            let result = executor::execute(self.inner.api.as_ref(), &op).await;

            let online = self.inner.network.is_online();
            let now = self.inner.clock.now();
            let policy = self.inner.settings.retry;
            let (transition, saved) = self.mutate(|queue| {
                queue.record_outcome(id, result.as_ref().map(|_| ()), online, &policy, now)
            });
            self.log_save_failure(saved);

            if let Err(e) = &result {
                last_error = Some(e.to_string());
            }

            match transition {
                Ok(Transition::Completed) => {
                    report.succeeded += 1;
                    tracing::info!(op_id = %op.id, kind = ?op.kind, "Operation synced");
                }
                Ok(Transition::Conflicted { server_version }) => {
                    report.conflicted += 1;
                    tracing::info!(
                        op_id = %op.id,
                        kind = ?op.kind,
                        server_version,
                        "Conflict detected, waiting for resolution"
                    );
                }
                Ok(Transition::Retry { retry_count, delay }) => {
                    report.retried += 1;
                    tracing::warn!(
                        op_id = %op.id,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error.as_deref().unwrap_or_default(),
                        "Operation failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Transition::Failed { retry_count, class }) => {
                    report.failed += 1;
                    tracing::error!(
                        op_id = %op.id,
                        kind = ?op.kind,
                        retry_count,
                        class = ?class,
                        error = %last_error.as_deref().unwrap_or_default(),
                        "Operation failed"
                    );
                }
                Err(e) => {
                    tracing::debug!(op_id = %op.id, error = %e, "Operation left the queue mid-attempt");
                }
            }
        }

        pass.finish(last_error);

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            conflicted = report.conflicted,
            retried = report.retried,
            failed = report.failed,
            aborted_offline = report.aborted_offline,
            "Sync pass finished"
        );

        Some(report)
    }

    fn spawn_pass(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, pass deferred to the scheduler");
            return;
        };
        let engine = self.clone();
        runtime.spawn(async move {
            engine.process_queue().await;
        });
    }

    // ------------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------------

    /// Start background syncing.
    ///
    /// Runs a pass right away if online with work pending, then every
    /// `sync_interval` while that holds, and after every settled reconnect. Stops when the
    /// returned handle is stopped or dropped.
    pub fn start(&self) -> EngineHandle {
        let settings = self.inner.settings;
        let mut tasks = Vec::with_capacity(4);

        // decided now, so a link that comes up later still waits to settle
        if self.inner.network.is_online() && self.pending_count() > 0 {
            let engine = self.clone();
            tasks.push(tokio::spawn(async move {
                engine.process_queue().await;
            }));
        }

        let engine = self.clone();
        let first_tick = tokio::time::Instant::now() + settings.sync_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, settings.sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if engine.inner.network.is_online() && engine.pending_count() > 0 {
                    engine.process_queue().await;
                }
            }
        }));

        let engine = self.clone();
        let mut reconnects = self.inner.network.reconnect_listener(settings.settle_delay);
        tasks.push(tokio::spawn(async move {
            while reconnects.reconnected().await.is_some() {
                tracing::info!("Reconnected, draining queue");
                engine.process_queue().await;
            }
        }));

        let engine = self.clone();
        let mut online = self.inner.network.subscribe();
        tasks.push(tokio::spawn(async move {
            while online.changed().await.is_ok() {
                engine.publish_status();
            }
        }));

        tracing::info!(
            interval_ms = settings.sync_interval.as_millis() as u64,
            settle_ms = settings.settle_delay.as_millis() as u64,
            "Sync engine started"
        );

        EngineHandle { tasks }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn status(&self) -> SyncStatus {
        status_of(&self.lock_queue(), self.inner.network.is_online())
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.inner.network
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        self.lock_queue().conflicts().to_vec()
    }

    pub fn conflict(&self, id: &str) -> Option<Conflict> {
        self.lock_queue().conflict(id).cloned()
    }

    /// All queued operations in enqueue order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock_queue().operations().to_vec()
    }

    pub fn operation(&self, id: &str) -> Option<Operation> {
        self.lock_queue().get(id).cloned()
    }

    pub fn operations_by_kind(&self, kind: OperationKind) -> Vec<Operation> {
        self.lock_queue()
            .operations_by_kind(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        active_only: bool,
    ) -> Vec<Operation> {
        self.lock_queue()
            .find_by_entity(entity_type, entity_id, active_only)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn has_pending_for_entity(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.lock_queue()
            .has_pending_for_entity(entity_type, entity_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_queue().pending_count()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn lock_queue(&self) -> MutexGuard<'_, OperationQueue> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a change, save the result and publish the new status.
    ///
    /// The save happens under the lock so snapshots reach storage in order.
    fn mutate<R>(&self, f: impl FnOnce(&mut OperationQueue) -> R) -> (R, Result<()>) {
        let online = self.inner.network.is_online();
        let (value, saved, status) = {
            let mut queue = self.lock_queue();
            let value = f(&mut queue);
            let saved = self.inner.storage.save(&queue.snapshot());
            (value, saved, status_of(&queue, online))
        };
        self.send_status(status);
        (value, saved)
    }

    fn publish_status(&self) {
        self.send_status(self.status());
    }

    fn send_status(&self, status: SyncStatus) {
        self.inner.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn log_save_failure(&self, saved: Result<()>) {
        if let Err(e) = saved {
            tracing::error!(error = %e, "Failed to persist queue");
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &self.status())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

fn status_of(queue: &OperationQueue, is_online: bool) -> SyncStatus {
    SyncStatus {
        pending_count: queue.pending_count(),
        failed_count: queue.failed_count(),
        conflict_count: queue.conflicts().len(),
        is_syncing: queue.is_syncing(),
        is_online,
        last_sync_at: queue.last_sync_at(),
        last_sync_error: queue.last_sync_error().map(str::to_string),
    }
}

/// Owns the running-pass flag for the duration of a pass.
///
/// A pass dropped before [`PassGuard::finish`] (its task aborted, or the
/// caller gave up on the future) releases the flag and puts the operation it
/// was attempting back to pending.
struct PassGuard<'a> {
    engine: &'a SyncEngine,
    finished: bool,
}

impl<'a> PassGuard<'a> {
    fn new(engine: &'a SyncEngine) -> Self {
        Self {
            engine,
            finished: false,
        }
    }

    fn finish(mut self, error: Option<String>) {
        self.finished = true;
        let now = self.engine.inner.clock.now();
        let ((), saved) = self.engine.mutate(|queue| queue.finish_pass(now, error));
        self.engine.log_save_failure(saved);
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let now = self.engine.inner.clock.now();
        let (reset, saved) = self.engine.mutate(|queue| queue.interrupt_pass(now));
        self.engine.log_save_failure(saved);
        tracing::warn!(reset, "Sync pass interrupted");
    }
}

/// Background tasks of a started engine.
#[derive(Debug)]
pub struct EngineHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Stop background syncing.
    ///
    /// A pass in flight is cut at its next await and the operation it was
    /// attempting goes back to pending.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("Sync engine stopped");
    }
}
