//! # Ferry Client
//!
//! Runtime half of the Ferry sync engine: it owns the queue from
//! `ferry-engine`, persists it, watches connectivity and drives operations
//! to the server.
//!
//! ## Components
//!
//! - [`SyncEngine`]: enqueue API, sync passes, conflict resolution, status
//! - [`NetworkMonitor`]: online/offline state fed by the platform
//! - [`RemoteApi`]: the five booking/trip calls; [`HttpApi`] speaks HTTP
//! - [`QueueStorage`]: [`FileStorage`] for real use, [`MemoryStorage`] for tests
//!
//! ## Example
//!
//! ```no_run
//! use ferry_client::{Config, FileStorage, HttpApi, NetworkMonitor, SyncEngine};
//! use ferry_engine::{EnqueueMeta, EntityType, OperationKind};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> ferry_client::Result<()> {
//! let config = Config::from_env()?;
//! let network = NetworkMonitor::new_shared(true);
//!
//! let engine = SyncEngine::builder(Arc::new(HttpApi::from_config(&config)?), network.clone())
//!     .storage(Arc::new(FileStorage::new(&config.queue_path)))
//!     .settings(config.sync)
//!     .build()?;
//! let _handle = engine.start();
//!
//! engine.enqueue(
//!     OperationKind::UpdateBooking,
//!     json!({"id": "B1", "updates": {"status": "loaded"}}),
//!     EnqueueMeta::default().entity(EntityType::Booking, "B1"),
//! )?;
//!
//! // the platform reports connectivity
//! network.set_online(false);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod http;
pub mod network;
pub mod status;
pub mod storage;
pub mod telemetry;

pub use api::{ApiResult, RemoteApi};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, SyncSettings};
pub use engine::{EngineHandle, SyncEngine, SyncEngineBuilder};
pub use error::{ClientError, Result};
pub use http::HttpApi;
pub use network::{NetworkMonitor, ReconnectListener};
pub use status::{PassReport, SyncStatus};
pub use storage::{FileStorage, MemoryStorage, QueueStorage};
