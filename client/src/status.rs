//! Observable state of the sync engine.

use ferry_engine::Timestamp;
use serde::{Deserialize, Serialize};

/// What a UI needs to render sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Operations pending or in flight
    pub pending_count: usize,
    pub failed_count: usize,
    pub conflict_count: usize,
    pub is_syncing: bool,
    pub is_online: bool,
    pub last_sync_at: Option<Timestamp>,
    pub last_sync_error: Option<String>,
}

impl SyncStatus {
    /// Nothing left to send and nothing waiting on the user.
    pub fn is_idle(&self) -> bool {
        self.pending_count == 0 && self.conflict_count == 0 && !self.is_syncing
    }
}

/// Counts for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub conflicted: usize,
    pub retried: usize,
    pub failed: usize,
    /// The pass stopped early because connectivity was lost
    pub aborted_offline: bool,
}
