//! In-process mutual exclusion keyed by string.
//!
//! # Responsibility
//! - Serialise callers that touch the same CID.
//! - Let callers on different keys run in parallel.
//!
//! # Invariants
//! - One registry instance is shared by everything that must agree on a key.
//! - Acquisition is not re-entrant.

mod key_lock;

pub use key_lock::{KeyLockGuard, KeyLockRegistry};
