//! Operation types for expressing queued intents.
//!
//! An operation is a durable intent to mutate server state. It is created
//! once, keeps its id across every retry, and leaves the queue only when the
//! server accepted it or the user abandoned it.

use crate::{EntityId, OperationId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload key set by a keep-local resolution to ask the server to overwrite.
pub const FORCE_OVERWRITE_KEY: &str = "_forceOverwrite";
/// Payload key carrying the server version observed when the conflict occurred.
pub const SERVER_VERSION_KEY: &str = "_serverVersion";
/// Payload key a caller may set with the version its change was based on.
pub const LOCAL_VERSION_KEY: &str = "_localVersion";
/// Payload key marking a non-object payload wrapped under `value` to carry markers.
pub const WRAPPED_PAYLOAD_KEY: &str = "_wrappedPayload";

/// Default retry budget for a new operation.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// The remote mutation an operation stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CreateBooking,
    CreateTrip,
    MarkDelivered,
    UpdateTripStatus,
    UpdateBooking,
    /// A kind this build does not know, read back from persisted state.
    #[serde(other)]
    Unknown,
}

/// Lifecycle status of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting for the next sync pass
    Pending,
    /// Remote call in flight
    Syncing,
    /// Gave up; waits for a manual retry
    Failed,
    /// Accepted by the server (never persisted)
    Completed,
    /// Waiting for a user decision
    Conflict,
}

impl OperationStatus {
    /// Pending or in flight.
    pub fn is_active(self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::Syncing)
    }
}

/// The kind of domain entity an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    #[default]
    Booking,
    Trip,
    Delivery,
}

/// A queued operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Client-generated id, stable across retries
    pub id: OperationId,
    /// Which remote call to perform
    pub kind: OperationKind,
    /// Kind-specific data for the remote call
    pub payload: Value,
    /// Current lifecycle status
    pub status: OperationStatus,
    /// Attempts that ended in a retryable or final failure
    pub retry_count: u32,
    /// Retry budget
    pub max_retries: u32,
    /// When the operation was enqueued (ms since epoch)
    pub created_at: Timestamp,
    /// When the last remote attempt started
    #[serde(default)]
    pub last_attempt_at: Option<Timestamp>,
    /// Last failure message
    #[serde(default)]
    pub error: Option<String>,
    /// Locally applied value shown before confirmation, owned by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_data: Option<Value>,
    /// Logical target type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    /// Logical target id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
}

impl Operation {
    /// Create a new pending operation.
    pub fn new(
        id: impl Into<OperationId>,
        kind: OperationKind,
        payload: Value,
        meta: EnqueueMeta,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            status: OperationStatus::Pending,
            retry_count: 0,
            max_retries: meta.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            created_at,
            last_attempt_at: None,
            error: None,
            optimistic_data: meta.optimistic_data,
            entity_type: meta.entity_type,
            entity_id: meta.entity_id,
        }
    }

    /// Whether the operation is pending or in flight.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether the operation targets the given entity.
    pub fn targets(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.entity_type == Some(entity_type) && self.entity_id.as_deref() == Some(entity_id)
    }

    /// Version the caller based this change on, or 0 if not recorded.
    pub fn local_version(&self) -> Version {
        self.payload
            .get(LOCAL_VERSION_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Whether a keep-local resolution stamped this operation.
    pub fn force_overwrite(&self) -> bool {
        self.payload
            .get(FORCE_OVERWRITE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Server version recorded by a keep-local resolution.
    pub fn server_version_marker(&self) -> Option<Version> {
        self.payload.get(SERVER_VERSION_KEY).and_then(Value::as_u64)
    }

    /// Stamp the overwrite markers onto the payload.
    ///
    /// A non-object payload is moved under `value` and flagged with
    /// [`WRAPPED_PAYLOAD_KEY`]. [`RemoteCall::from_operation`] unwraps it, so
    /// the server receives the original body on replay.
    ///
    /// [`RemoteCall::from_operation`]: crate::RemoteCall::from_operation
    pub(crate) fn stamp_overwrite(&mut self, server_version: Version) {
        if !self.payload.is_object() {
            let original = std::mem::take(&mut self.payload);
            self.payload = serde_json::json!({
                "value": original,
                WRAPPED_PAYLOAD_KEY: true,
            });
        }
        if let Value::Object(map) = &mut self.payload {
            map.insert(FORCE_OVERWRITE_KEY.to_string(), Value::Bool(true));
            map.insert(SERVER_VERSION_KEY.to_string(), Value::from(server_version));
        }
    }
}

/// Optional metadata supplied with an enqueue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueMeta {
    pub optimistic_data: Option<Value>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<EntityId>,
    pub max_retries: Option<u32>,
}

impl EnqueueMeta {
    /// Target a specific entity.
    pub fn entity(mut self, entity_type: EntityType, entity_id: impl Into<EntityId>) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Attach the value the UI already shows.
    pub fn optimistic(mut self, data: Value) -> Self {
        self.optimistic_data = Some(data);
        self
    }

    /// Override the default retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Partial update merged into an existing operation.
///
/// `error: Some(None)` clears the error; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPatch {
    pub status: Option<OperationStatus>,
    pub retry_count: Option<u32>,
    pub last_attempt_at: Option<Timestamp>,
    pub error: Option<Option<String>>,
    pub payload: Option<Value>,
}

impl OperationPatch {
    /// A patch that only changes the status.
    pub fn status(status: OperationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, op: &mut Operation) {
        if let Some(status) = self.status {
            op.status = status;
        }
        if let Some(retry_count) = self.retry_count {
            op.retry_count = retry_count;
        }
        if let Some(at) = self.last_attempt_at {
            op.last_attempt_at = Some(at);
        }
        if let Some(error) = self.error {
            op.error = error;
        }
        if let Some(payload) = self.payload {
            op.payload = payload;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_operation_is_pending() {
        let op = Operation::new(
            "op-1",
            OperationKind::CreateBooking,
            json!({"sender": "A"}),
            EnqueueMeta::default(),
            1000,
        );

        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retry_count, 0);
        assert_eq!(op.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(op.created_at, 1000);
        assert!(op.last_attempt_at.is_none());
        assert!(op.is_active());
    }

    #[test]
    fn meta_builder() {
        let op = Operation::new(
            "op-1",
            OperationKind::UpdateBooking,
            json!({"id": "B1"}),
            EnqueueMeta::default()
                .entity(EntityType::Booking, "B1")
                .optimistic(json!({"status": "loaded"}))
                .max_retries(3),
            1000,
        );

        assert!(op.targets(EntityType::Booking, "B1"));
        assert!(!op.targets(EntityType::Trip, "B1"));
        assert_eq!(op.max_retries, 3);
        assert_eq!(op.optimistic_data, Some(json!({"status": "loaded"})));
    }

    #[test]
    fn version_markers() {
        let mut op = Operation::new(
            "op-1",
            OperationKind::UpdateBooking,
            json!({"id": "B1", "_localVersion": 2}),
            EnqueueMeta::default(),
            1000,
        );
        assert_eq!(op.local_version(), 2);
        assert!(!op.force_overwrite());

        op.stamp_overwrite(7);
        assert!(op.force_overwrite());
        assert_eq!(op.server_version_marker(), Some(7));
        assert_eq!(op.payload["id"], "B1");
    }

    #[test]
    fn stamp_wraps_non_object_payload() {
        let mut op = Operation::new(
            "op-1",
            OperationKind::CreateBooking,
            json!("raw"),
            EnqueueMeta::default(),
            1000,
        );
        op.stamp_overwrite(1);
        assert_eq!(op.payload["value"], "raw");
        assert_eq!(op.payload[WRAPPED_PAYLOAD_KEY], true);
        assert_eq!(op.payload[FORCE_OVERWRITE_KEY], true);

        // stamping twice keeps a single layer
        op.stamp_overwrite(2);
        assert_eq!(op.payload["value"], "raw");
        assert_eq!(op.server_version_marker(), Some(2));
    }

    #[test]
    fn patch_clears_error() {
        let mut op = Operation::new(
            "op-1",
            OperationKind::CreateBooking,
            json!({}),
            EnqueueMeta::default(),
            1000,
        );
        op.error = Some("timeout".into());

        OperationPatch {
            error: Some(None),
            retry_count: Some(0),
            ..OperationPatch::default()
        }
        .apply(&mut op);

        assert!(op.error.is_none());
        assert_eq!(op.retry_count, 0);
    }

    #[test]
    fn kind_serialization_format() {
        let json = serde_json::to_string(&OperationKind::UpdateTripStatus).unwrap();
        assert_eq!(json, "\"UPDATE_TRIP_STATUS\"");

        let kind: OperationKind = serde_json::from_str("\"ARCHIVE_TRIP\"").unwrap();
        assert_eq!(kind, OperationKind::Unknown);
    }

    #[test]
    fn serialization_uses_camel_case() {
        let op = Operation::new(
            "op-1",
            OperationKind::MarkDelivered,
            json!({"bookingId": "B1"}),
            EnqueueMeta::default().entity(EntityType::Delivery, "B1"),
            1000,
        );

        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"retryCount\":0"));
        assert!(json.contains("\"entityType\":\"delivery\""));
        assert!(!json.contains("optimisticData"));

        let parsed: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }
}
