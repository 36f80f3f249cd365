//! Classification of remote failures.
//!
//! Every failure coming back from the remote API lands in exactly one of
//! three buckets, which decides what the scheduler does with the operation:
//!
//! - [`ErrorClass::Conflict`]: the server refused because its state moved on.
//!   Never retried automatically; surfaced for a user decision.
//! - [`ErrorClass::Retryable`]: connectivity-shaped; retried with backoff.
//! - [`ErrorClass::Permanent`]: anything else; failed immediately.
//!
//! Conflict wins over retryable when both could match. Message matching is a
//! best-effort fallback for servers that give no structured signal.

use crate::{OperationKind, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const CONFLICT_VOCABULARY: &[&str] = &[
    "version mismatch",
    "modified by another",
    "optimistic lock",
    "concurrent update",
    "conflict",
];

const NETWORK_VOCABULARY: &[&str] = &[
    "network",
    "timeout",
    "connection",
    "econnrefused",
    "enotfound",
    "etimedout",
    "econnreset",
    "epipe",
    "socket hang up",
    "err_name_not_resolved",
    "err_internet_disconnected",
    "err_connection",
    "err_network",
    "net::",
    "failed to fetch",
    "load failed",
    "abort",
];

const NETWORK_ERROR_CODES: &[&str] = &["ECONNREFUSED", "ENOTFOUND", "ETIMEDOUT", "ECONNRESET", "EPIPE"];

/// A failure reported by the remote API collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    /// The request never produced a response (DNS, connect, reset)
    #[error("network error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request aborted: {0}")]
    Aborted(String),

    /// Structured optimistic-concurrency rejection
    #[error("version conflict: {message}")]
    Conflict {
        message: String,
        server_version: Option<Version>,
        server_data: Option<Value>,
    },

    /// Non-success HTTP response
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        server_data: Option<Value>,
    },

    /// The operation payload lacks what the remote call needs
    #[error("invalid payload for {kind:?}: {reason}")]
    InvalidPayload { kind: OperationKind, reason: String },

    #[error("unsupported operation kind: {0:?}")]
    UnsupportedKind(OperationKind),

    /// Anything else, described only by its message
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// The server-provided message, if this failure carries one.
    fn message(&self) -> Option<&str> {
        match self {
            RemoteError::Transport(m)
            | RemoteError::Timeout(m)
            | RemoteError::Aborted(m)
            | RemoteError::Other(m) => Some(m),
            RemoteError::Conflict { message, .. } | RemoteError::Http { message, .. } => {
                Some(message)
            }
            RemoteError::InvalidPayload { .. } | RemoteError::UnsupportedKind(_) => None,
        }
    }

    /// Server version attached to the failure, if any.
    pub fn server_version(&self) -> Option<Version> {
        match self {
            RemoteError::Conflict { server_version, .. } => *server_version,
            _ => None,
        }
    }

    /// Server's view of the entity attached to the failure, if any.
    pub fn server_data(&self) -> Option<&Value> {
        match self {
            RemoteError::Conflict { server_data, .. } | RemoteError::Http { server_data, .. } => {
                server_data.as_ref()
            }
            _ => None,
        }
    }

    /// Whether the failure was produced locally, before any request.
    fn is_local(&self) -> bool {
        matches!(
            self,
            RemoteError::InvalidPayload { .. } | RemoteError::UnsupportedKind(_)
        )
    }
}

/// How the scheduler should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Conflict,
    Retryable,
    Permanent,
}

/// Classify a remote failure.
///
/// `online` is the client's current connectivity; a failure without an HTTP
/// response while offline is always retryable.
pub fn classify(error: &RemoteError, online: bool) -> ErrorClass {
    if is_conflict(error) {
        return ErrorClass::Conflict;
    }
    if is_retryable(error, online) {
        return ErrorClass::Retryable;
    }
    ErrorClass::Permanent
}

/// Whether the failure is an optimistic-concurrency conflict.
pub fn is_conflict(error: &RemoteError) -> bool {
    match error {
        RemoteError::Conflict { .. } => true,
        RemoteError::Http { status: 409, .. } => true,
        _ => error.message().is_some_and(matches_conflict_message),
    }
}

fn is_retryable(error: &RemoteError, online: bool) -> bool {
    if error.is_local() {
        return false;
    }

    match error {
        RemoteError::Transport(_) | RemoteError::Timeout(_) | RemoteError::Aborted(_) => true,
        RemoteError::Http { status, .. } => is_retryable_status(*status),
        _ => !online || error.message().is_some_and(matches_network_message),
    }
}

/// 408 Request Timeout, 429 Too Many Requests, and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Case-insensitive match against the conflict vocabulary.
pub fn matches_conflict_message(message: &str) -> bool {
    let message = message.to_lowercase();
    CONFLICT_VOCABULARY.iter().any(|m| message.contains(m))
}

/// Case-insensitive match against the network-failure vocabulary.
pub fn matches_network_message(message: &str) -> bool {
    let message = message.to_lowercase();
    NETWORK_VOCABULARY.iter().any(|m| message.contains(m))
}

/// Whether an OS-level error code indicates a network problem.
pub fn is_network_error_code(code: &str) -> bool {
    NETWORK_ERROR_CODES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(code))
}
