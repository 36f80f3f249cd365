//! Snapshot types for persisting and restoring queue state.
//!
//! Snapshots are the bridge between the in-memory queue and durable storage.
//! Only the durable part of the state is included: the running-pass flag and
//! the last pass error are process-local.

use crate::{error::Result, Conflict, Error, Operation, OperationStatus, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Operations in enqueue order
    pub operations: Vec<Operation>,
    /// Open conflicts
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    /// When the last sync pass finished
    #[serde(default)]
    pub last_sync_at: Option<Timestamp>,
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueSnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            operations: Vec::new(),
            conflicts: Vec::new(),
            last_sync_at: None,
        }
    }

    /// Check structural invariants: supported format, unique operation ids,
    /// at most one conflict per operation.
    pub fn validate(&self) -> Result<()> {
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let mut ids = HashSet::new();
        for op in &self.operations {
            if !ids.insert(op.id.as_str()) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate operation id: {}",
                    op.id
                )));
            }
        }

        let mut conflicted = HashSet::new();
        for conflict in &self.conflicts {
            if !conflicted.insert(conflict.operation_id.as_str()) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate conflict for operation: {}",
                    conflict.operation_id
                )));
            }
        }

        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Counts describing a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub operation_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,
    pub conflict_count: usize,
    pub last_sync_at: Option<Timestamp>,
}

impl From<&QueueSnapshot> for SnapshotMetadata {
    fn from(snapshot: &QueueSnapshot) -> Self {
        let count = |status: OperationStatus| {
            snapshot
                .operations
                .iter()
                .filter(|op| op.status == status)
                .count()
        };

        Self {
            format_version: snapshot.format_version,
            operation_count: snapshot.operations.len(),
            pending_count: count(OperationStatus::Pending) + count(OperationStatus::Syncing),
            failed_count: count(OperationStatus::Failed),
            conflict_count: snapshot.conflicts.len(),
            last_sync_at: snapshot.last_sync_at,
        }
    }
}
