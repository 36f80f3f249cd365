//! Conflict records and user resolutions.
//!
//! A conflict is created when the server rejects an operation because its
//! copy of the entity moved on. Nothing is merged automatically: the record
//! sits next to its operation until the user picks a [`Resolution`].

use crate::{EntityId, EntityType, Operation, OperationId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A detected divergence between the local intent and the server state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// The operation this conflict belongs to (1:1)
    pub operation_id: OperationId,
    /// Logical target type
    pub entity_type: EntityType,
    /// Logical target id
    pub entity_id: EntityId,
    /// What the client intended
    pub local_data: Value,
    /// What the server currently has, if it told us
    pub server_data: Option<Value>,
    /// Version the local change was based on
    pub local_version: Version,
    /// Version the server reported
    pub server_version: Version,
    /// When the conflict was detected
    pub conflicted_at: Timestamp,
}

impl Conflict {
    /// Build the conflict record for an operation the server refused.
    ///
    /// The server version comes from the failure itself, then from a
    /// `version` field in the returned server data, and defaults to 0.
    pub fn for_operation(
        op: &Operation,
        server_version: Option<Version>,
        server_data: Option<Value>,
        now: Timestamp,
    ) -> Self {
        let server_version = server_version
            .or_else(|| {
                server_data
                    .as_ref()
                    .and_then(|data| data.get("version"))
                    .and_then(Value::as_u64)
            })
            .unwrap_or(0);

        let entity_id = op
            .entity_id
            .clone()
            .or_else(|| {
                op.payload
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            operation_id: op.id.clone(),
            entity_type: op.entity_type.unwrap_or_default(),
            entity_id,
            local_data: op
                .optimistic_data
                .clone()
                .unwrap_or_else(|| op.payload.clone()),
            server_data,
            local_version: op.local_version(),
            server_version,
            conflicted_at: now,
        }
    }
}

/// A user's decision for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Replay the local change, telling the server to overwrite
    KeepLocal,
    /// Abandon the local change
    KeepServer,
    /// Dismiss the change; same transition as `KeepServer`
    Cancel,
}

impl Resolution {
    /// Whether this resolution discards the operation.
    pub fn discards(self) -> bool {
        !matches!(self, Resolution::KeepLocal)
    }
}

/// What a resolution did to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResolutionOutcome {
    /// The operation is pending again with overwrite markers
    Requeued {
        operation_id: OperationId,
        server_version: Version,
    },
    /// The operation and its conflict are gone
    Discarded { operation_id: OperationId },
}

impl ResolutionOutcome {
    pub fn operation_id(&self) -> &OperationId {
        match self {
            ResolutionOutcome::Requeued { operation_id, .. } => operation_id,
            ResolutionOutcome::Discarded { operation_id } => operation_id,
        }
    }
}
