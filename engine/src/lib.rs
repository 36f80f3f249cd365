//! # Ferry Engine
//!
//! A deterministic operation queue for offline-first clients.
//!
//! This crate holds the state and transition logic of the Ferry sync engine:
//! operations a client wants the server to perform, the conflicts the server
//! reported, and the rules that move an operation from one status to the
//! next. Scheduling, networking and storage live in `ferry-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, sockets or timers
//! - **Explicit time**: every transition that records a time takes `now`
//! - **At-least-once**: an operation keeps its id for every attempt, so the
//!   server can de-duplicate replays
//! - **No silent overwrites**: conflicts wait for a user decision
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! An [`Operation`] is a durable intent of one [`OperationKind`]. Its
//! [`OperationStatus`] moves through:
//!
//! ```text
//! Pending -> Syncing -> (removed)           success
//!                    -> Pending             retryable, budget left
//!                    -> Failed              permanent or budget spent
//!                    -> Conflict            server state moved on
//! ```
//!
//! ### Classification
//!
//! [`classify`] maps a [`RemoteError`] to an [`ErrorClass`]. Retries wait
//! according to a [`RetryPolicy`]: `min(base * 2^n, max)`.
//!
//! ### Conflicts
//!
//! A [`Conflict`] records both sides of a rejected change. A [`Resolution`]
//! either re-arms the operation with overwrite markers or discards it.
//!
//! ## Quick Start
//!
//! ```rust
//! use ferry_engine::{
//!     EnqueueMeta, EntityType, OperationKind, OperationQueue, OperationStatus, RemoteError,
//!     RetryPolicy, Transition,
//! };
//! use serde_json::json;
//!
//! let mut queue = OperationQueue::new();
//!
//! // 1. Enqueue while offline
//! let id = queue.enqueue(
//!     OperationKind::UpdateBooking,
//!     json!({"id": "B1", "updates": {"status": "loaded"}}),
//!     EnqueueMeta::default().entity(EntityType::Booking, "B1"),
//!     1706745600000,
//! );
//! assert!(queue.has_pending_for_entity(EntityType::Booking, "B1"));
//!
//! // 2. Attempt it once online
//! queue.begin_attempt(&id, 1706745601000).unwrap();
//!
//! // 3. The server says the record moved on
//! let error = RemoteError::Http {
//!     status: 409,
//!     message: "version mismatch".into(),
//!     server_data: Some(json!({"version": 3})),
//! };
//! let transition = queue
//!     .record_outcome(&id, Err(&error), true, &RetryPolicy::default(), 1706745601500)
//!     .unwrap();
//!
//! assert_eq!(transition, Transition::Conflicted { server_version: 3 });
//! assert_eq!(queue.get(&id).unwrap().status, OperationStatus::Conflict);
//! assert_eq!(queue.conflicts().len(), 1);
//! ```
//!
//! ## Persistence
//!
//! Use [`OperationQueue::snapshot`] and [`OperationQueue::from_snapshot`]
//! with [`QueueSnapshot`]. Snapshots serialize to JSON.

pub mod backoff;
pub mod call;
pub mod classify;
pub mod conflict;
pub mod error;
pub mod operation;
pub mod queue;
pub mod snapshot;

// Re-export main types at crate root
pub use backoff::RetryPolicy;
pub use call::{RemoteCall, RequestOptions};
pub use classify::{classify, ErrorClass, RemoteError};
pub use conflict::{Conflict, Resolution, ResolutionOutcome};
pub use error::Error;
pub use operation::{
    EnqueueMeta, EntityType, Operation, OperationKind, OperationPatch, OperationStatus,
};
pub use queue::{OperationQueue, Transition};
pub use snapshot::{QueueSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type OperationId = String;
pub type EntityId = String;
pub type Version = u64;
pub type Timestamp = u64;
