//! Operation queue - the durable state of the sync engine.
//!
//! The queue holds every operation that has not been confirmed by the server,
//! in the order it was enqueued, plus the conflicts awaiting a decision. All
//! transitions are plain functions of the current state and their inputs
//! (including the current time), so the queue can be driven and tested
//! without any I/O.

use crate::{
    classify, error::Result, Conflict, EnqueueMeta, EntityType, Error, ErrorClass, Operation,
    OperationId, OperationKind, OperationPatch, OperationStatus, QueueSnapshot, RemoteError,
    Resolution, ResolutionOutcome, RetryPolicy, Timestamp, Version,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Sync error recorded when a pass is torn down before it finishes.
pub const INTERRUPTED_PASS: &str = "Sync pass interrupted";

/// What happened to an operation after an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Transition {
    /// Accepted by the server and removed from the queue
    Completed,
    /// Parked until the user resolves the conflict
    Conflicted { server_version: Version },
    /// Back to pending; the pass should wait `delay` before the next operation
    Retry { retry_count: u32, delay: Duration },
    /// Given up until a manual retry
    Failed { retry_count: u32, class: ErrorClass },
}

/// The queue of operations and conflicts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationQueue {
    /// Operations in enqueue order
    operations: Vec<Operation>,
    /// Open conflicts, at most one per operation
    conflicts: Vec<Conflict>,
    /// Whether a sync pass is running
    is_syncing: bool,
    /// When the last pass finished
    last_sync_at: Option<Timestamp>,
    /// Last failure message seen by the last pass
    last_sync_error: Option<String>,
}

impl OperationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Append a new pending operation and return its id.
    pub fn enqueue(
        &mut self,
        kind: OperationKind,
        payload: Value,
        meta: EnqueueMeta,
        now: Timestamp,
    ) -> OperationId {
        let id = uuid::Uuid::new_v4().to_string();
        self.operations
            .push(Operation::new(id.clone(), kind, payload, meta, now));
        id
    }

    /// Merge a patch into an operation.
    ///
    /// Returns `Ok(false)` if the id is unknown. Conflict and Completed
    /// cannot be set through a patch: the first needs a conflict record and
    /// the second is expressed by removal.
    pub fn update(&mut self, id: &str, patch: OperationPatch) -> Result<bool> {
        if let Some(status @ (OperationStatus::Conflict | OperationStatus::Completed)) = patch.status
        {
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                status,
            });
        }

        let Some(op) = self.get_mut(id) else {
            return Ok(false);
        };
        let was_conflict = op.status == OperationStatus::Conflict;
        patch.apply(op);
        let leaves_conflict = was_conflict && op.status != OperationStatus::Conflict;

        if leaves_conflict {
            self.conflicts.retain(|c| c.operation_id != id);
        }
        Ok(true)
    }

    /// Remove an operation and any conflict referencing it.
    pub fn remove(&mut self, id: &str) -> Option<Operation> {
        self.conflicts.retain(|c| c.operation_id != id);
        let index = self.operations.iter().position(|op| op.id == id)?;
        Some(self.operations.remove(index))
    }

    /// Drop any operation marked completed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.operations.len();
        self.operations
            .retain(|op| op.status != OperationStatus::Completed);
        before - self.operations.len()
    }

    /// Attach a conflict to its operation and mark the operation Conflict.
    ///
    /// A second conflict for the same operation is ignored.
    pub fn register_conflict(&mut self, conflict: Conflict) -> Result<()> {
        let op = self
            .get_mut(&conflict.operation_id)
            .ok_or_else(|| Error::OperationNotFound(conflict.operation_id.clone()))?;
        op.status = OperationStatus::Conflict;

        if self.conflict(&conflict.operation_id).is_none() {
            self.conflicts.push(conflict);
        }
        Ok(())
    }

    /// Reset every failed operation for another round of attempts.
    pub fn reset_failed(&mut self) -> Vec<OperationId> {
        self.operations
            .iter_mut()
            .filter(|op| op.status == OperationStatus::Failed)
            .map(|op| {
                op.status = OperationStatus::Pending;
                op.retry_count = 0;
                op.error = None;
                op.id.clone()
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Sync pass transitions
    // ------------------------------------------------------------------------

    /// Mark a pass as running. Returns `false` if one already is.
    pub fn begin_pass(&mut self) -> bool {
        if self.is_syncing {
            return false;
        }
        self.is_syncing = true;
        true
    }

    /// Mark the running pass as finished.
    pub fn finish_pass(&mut self, now: Timestamp, error: Option<String>) {
        self.is_syncing = false;
        self.last_sync_at = Some(now);
        self.last_sync_error = error;
    }

    /// Tear down a pass that stopped before [`finish_pass`](Self::finish_pass).
    ///
    /// Operations caught mid-attempt go back to pending with their retry
    /// count untouched. Returns how many were reset.
    pub fn interrupt_pass(&mut self, now: Timestamp) -> usize {
        let mut reset = 0;
        for op in &mut self.operations {
            if op.status == OperationStatus::Syncing {
                op.status = OperationStatus::Pending;
                reset += 1;
            }
        }
        self.finish_pass(now, Some(INTERRUPTED_PASS.to_string()));
        reset
    }

    /// Start an attempt on a pending operation.
    ///
    /// Returns a copy of the operation as it should be executed, or `None` if
    /// it is gone or no longer pending.
    pub fn begin_attempt(&mut self, id: &str, now: Timestamp) -> Option<Operation> {
        let op = self.get_mut(id)?;
        if op.status != OperationStatus::Pending {
            return None;
        }
        op.status = OperationStatus::Syncing;
        op.last_attempt_at = Some(now);
        Some(op.clone())
    }

    /// Apply the result of an attempt.
    ///
    /// - success removes the operation
    /// - a conflict registers a [`Conflict`]
    /// - a retryable failure with budget left re-arms the operation
    /// - anything else marks it failed
    pub fn record_outcome(
        &mut self,
        id: &str,
        outcome: std::result::Result<(), &RemoteError>,
        online: bool,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<Transition> {
        let op = self
            .get(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;

        let error = match outcome {
            Ok(()) => {
                self.remove(id);
                return Ok(Transition::Completed);
            }
            Err(error) => error,
        };

        let class = classify(error, online);
        if class == ErrorClass::Conflict {
            let conflict = Conflict::for_operation(
                op,
                error.server_version(),
                error.server_data().cloned(),
                now,
            );
            let server_version = conflict.server_version;
            if let Some(op) = self.get_mut(id) {
                op.error = Some(error.to_string());
            }
            self.register_conflict(conflict)?;
            return Ok(Transition::Conflicted { server_version });
        }

        let retry_count = op.retry_count;
        let max_retries = op.max_retries;
        let op = self
            .get_mut(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;
        op.error = Some(error.to_string());

        if class == ErrorClass::Retryable && RetryPolicy::can_retry(retry_count, max_retries) {
            op.retry_count = retry_count + 1;
            op.status = OperationStatus::Pending;
            return Ok(Transition::Retry {
                retry_count: op.retry_count,
                delay: policy.delay(op.retry_count),
            });
        }

        op.retry_count = retry_count.saturating_add(1).min(max_retries.max(retry_count));
        op.status = OperationStatus::Failed;
        Ok(Transition::Failed {
            retry_count: op.retry_count,
            class,
        })
    }

    // ------------------------------------------------------------------------
    // Conflict resolution
    // ------------------------------------------------------------------------

    /// Apply a user's decision to one conflict.
    pub fn resolve_conflict(
        &mut self,
        id: &str,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome> {
        let server_version = self
            .conflict(id)
            .map(|c| c.server_version)
            .ok_or_else(|| Error::ConflictNotFound(id.to_string()))?;

        if resolution.discards() {
            self.remove(id);
            return Ok(ResolutionOutcome::Discarded {
                operation_id: id.to_string(),
            });
        }

        let op = self
            .get_mut(id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;
        op.status = OperationStatus::Pending;
        op.retry_count = 0;
        op.error = None;
        op.stamp_overwrite(server_version);
        self.conflicts.retain(|c| c.operation_id != id);

        Ok(ResolutionOutcome::Requeued {
            operation_id: id.to_string(),
            server_version,
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Get an operation by id.
    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Operation> {
        self.operations.iter_mut().find(|op| op.id == id)
    }

    /// All operations in enqueue order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of queued operations, whatever their status.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Pending operations in processing (FIFO) order.
    pub fn list_pending(&self) -> Vec<&Operation> {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .collect()
    }

    /// Operations of a given kind.
    pub fn operations_by_kind(&self, kind: OperationKind) -> Vec<&Operation> {
        self.operations.iter().filter(|op| op.kind == kind).collect()
    }

    pub fn count_by_status(&self, status: OperationStatus) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == status)
            .count()
    }

    /// Operations waiting for or in a sync attempt.
    pub fn pending_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_active()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.count_by_status(OperationStatus::Failed)
    }

    /// Operations targeting an entity, optionally only pending or in-flight ones.
    pub fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        active_only: bool,
    ) -> Vec<&Operation> {
        self.operations
            .iter()
            .filter(|op| op.targets(entity_type, entity_id))
            .filter(|op| !active_only || op.is_active())
            .collect()
    }

    /// Whether an entity already has an operation pending or in flight.
    pub fn has_pending_for_entity(&self, entity_type: EntityType, entity_id: &str) -> bool {
        !self.find_by_entity(entity_type, entity_id, true).is_empty()
    }

    /// Open conflicts in detection order.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn conflict(&self, id: &str) -> Option<&Conflict> {
        self.conflicts.iter().find(|c| c.operation_id == id)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing
    }

    pub fn last_sync_at(&self) -> Option<Timestamp> {
        self.last_sync_at
    }

    pub fn last_sync_error(&self) -> Option<&str> {
        self.last_sync_error.as_deref()
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Export the durable part of the state.
    pub fn snapshot(&self) -> QueueSnapshot {
        let mut snapshot = QueueSnapshot::new();
        snapshot.operations = self
            .operations
            .iter()
            .filter(|op| op.status != OperationStatus::Completed)
            .cloned()
            .collect();
        snapshot.conflicts = self.conflicts.clone();
        snapshot.last_sync_at = self.last_sync_at;
        snapshot
    }

    /// Rebuild a queue from persisted state.
    ///
    /// An operation left `Syncing` by an abrupt stop goes back to `Pending`
    /// (the server de-duplicates by operation id). Completed leftovers and
    /// conflicts without an operation are dropped; a `Conflict` operation
    /// whose record was lost goes back to `Pending`.
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Result<Self> {
        snapshot.validate()?;

        let mut operations = snapshot.operations;
        operations.retain(|op| op.status != OperationStatus::Completed);

        let mut conflicts = snapshot.conflicts;
        conflicts.retain(|c| {
            operations
                .iter()
                .any(|op| op.id == c.operation_id && op.status == OperationStatus::Conflict)
        });

        for op in &mut operations {
            let orphaned_conflict = op.status == OperationStatus::Conflict
                && !conflicts.iter().any(|c| c.operation_id == op.id);
            if op.status == OperationStatus::Syncing || orphaned_conflict {
                op.status = OperationStatus::Pending;
            }
        }

        Ok(Self {
            operations,
            conflicts,
            is_syncing: false,
            last_sync_at: snapshot.last_sync_at,
            last_sync_error: None,
        })
    }
}
