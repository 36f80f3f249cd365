//! Mapping from a queued operation to the remote call that performs it.
//!
//! Each [`OperationKind`] corresponds to exactly one [`RemoteCall`]. The
//! mapping only reads the payload; performing the call is up to whoever owns
//! the network.

use crate::{
    operation::{FORCE_OVERWRITE_KEY, LOCAL_VERSION_KEY, SERVER_VERSION_KEY, WRAPPED_PAYLOAD_KEY},
    Operation, OperationId, OperationKind, RemoteError, Version,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status written by a delivery without explicit field updates.
pub const DELIVERED_STATUS: &str = "delivered";

/// A remote call with its arguments extracted from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RemoteCall {
    CreateBooking {
        booking: Value,
    },
    CreateTrip {
        trip: Value,
        booking_ids: Vec<String>,
    },
    UpdateBooking {
        booking_id: String,
        updates: Value,
    },
    UpdateBookingStatus {
        booking_id: String,
        status: String,
    },
    UpdateTripStatus {
        trip_id: String,
        status: String,
    },
}

impl RemoteCall {
    /// Build the call for an operation.
    ///
    /// Missing or mistyped payload fields and unknown kinds are reported as
    /// [`RemoteError`]s that classify as permanent.
    pub fn from_operation(op: &Operation) -> Result<Self, RemoteError> {
        let payload = &op.payload;
        let kind = op.kind;

        match kind {
            OperationKind::CreateBooking => Ok(RemoteCall::CreateBooking {
                booking: strip_markers(payload),
            }),
            OperationKind::CreateTrip => Ok(RemoteCall::CreateTrip {
                trip: required(payload, kind, "tripData")?.clone(),
                booking_ids: string_list(payload, kind, "bookingIds")?,
            }),
            OperationKind::MarkDelivered => {
                let booking_id = required_str(payload, kind, "bookingId")?;
                match payload.get("updates").filter(|u| !u.is_null()) {
                    Some(updates) => Ok(RemoteCall::UpdateBooking {
                        booking_id,
                        updates: updates.clone(),
                    }),
                    None => Ok(RemoteCall::UpdateBookingStatus {
                        booking_id,
                        status: DELIVERED_STATUS.to_string(),
                    }),
                }
            }
            OperationKind::UpdateTripStatus => Ok(RemoteCall::UpdateTripStatus {
                trip_id: required_str(payload, kind, "tripId")?,
                status: required_str(payload, kind, "status")?,
            }),
            OperationKind::UpdateBooking => Ok(RemoteCall::UpdateBooking {
                booking_id: required_str(payload, kind, "id")?,
                updates: required(payload, kind, "updates")?.clone(),
            }),
            OperationKind::Unknown => Err(RemoteError::UnsupportedKind(kind)),
        }
    }
}

/// Per-request options derived from the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// The operation id; lets the server de-duplicate replays
    pub idempotency_key: OperationId,
    /// Set after a keep-local resolution
    pub force_overwrite: bool,
    /// Version the server is expected to hold, if known
    pub expected_version: Option<Version>,
}

impl RequestOptions {
    pub fn for_operation(op: &Operation) -> Self {
        let force_overwrite = op.force_overwrite();
        let expected_version = if force_overwrite {
            op.server_version_marker()
        } else {
            Some(op.local_version()).filter(|v| *v > 0)
        };

        Self {
            idempotency_key: op.id.clone(),
            force_overwrite,
            expected_version,
        }
    }
}

fn required<'a>(payload: &'a Value, kind: OperationKind, field: &str) -> Result<&'a Value, RemoteError> {
    payload
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| invalid(kind, format!("missing field `{field}`")))
}

fn required_str(payload: &Value, kind: OperationKind, field: &str) -> Result<String, RemoteError> {
    required(payload, kind, field)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(kind, format!("field `{field}` must be a string")))
}

fn string_list(payload: &Value, kind: OperationKind, field: &str) -> Result<Vec<String>, RemoteError> {
    let items = required(payload, kind, field)?
        .as_array()
        .ok_or_else(|| invalid(kind, format!("field `{field}` must be an array")))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(kind, format!("field `{field}` must contain strings")))
        })
        .collect()
}

fn invalid(kind: OperationKind, reason: String) -> RemoteError {
    RemoteError::InvalidPayload { kind, reason }
}

/// The payload without the engine's own markers.
///
/// A payload wrapped by a keep-local resolution is unwrapped back to its
/// original value.
fn strip_markers(payload: &Value) -> Value {
    if payload.get(WRAPPED_PAYLOAD_KEY).and_then(Value::as_bool) == Some(true) {
        return payload.get("value").cloned().unwrap_or(Value::Null);
    }
    let mut payload = payload.clone();
    if let Value::Object(map) = &mut payload {
        for key in [FORCE_OVERWRITE_KEY, SERVER_VERSION_KEY, LOCAL_VERSION_KEY] {
            map.remove(key);
        }
    }
    payload
}
