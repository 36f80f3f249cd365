//! Error types for the Ferry engine.

use crate::{OperationId, OperationStatus};
use thiserror::Error;

/// All possible errors from the Ferry engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("conflict not found for operation: {0}")]
    ConflictNotFound(OperationId),

    // Transition errors
    #[error("invalid transition for operation '{id}': cannot set status {status:?} directly")]
    InvalidTransition {
        id: OperationId,
        status: OperationStatus,
    },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
