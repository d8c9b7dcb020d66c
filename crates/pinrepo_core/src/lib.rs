//! Core record-access layer for pin requests.
//! This crate owns pin persistence, listing queries and per-CID locking.

pub mod config;
pub mod db;
pub mod lock;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{PinServiceConfig, PoolConfig};
pub use lock::{KeyLockGuard, KeyLockRegistry};
pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget,
};
pub use model::pin::{OwnerId, OwnerScope, Pin, PinResults, PinState, PinStatus, RequestId};
pub use repo::cancel::CancelToken;
pub use repo::pin_patch::PinPatch;
pub use repo::pin_query::{PinQuery, TextMatch};
pub use repo::pin_repo::{PinStore, RepoError, RepoResult, SqlitePinStore};
pub use repo::pin_row::{PinRow, RowDefaults};
pub use service::pin_service::PinService;
pub use service::pin_stream::{PinBatch, PinBatchStream};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
