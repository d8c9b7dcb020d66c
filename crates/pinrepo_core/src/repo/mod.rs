//! Pin persistence: row mapping, query building and the store contract.
//!
//! # Responsibility
//! - Define the data-access contract the service layer depends on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Store primitives return rows; mapping to `PinStatus` happens in
//!   `pin_row`.
//! - Storage failures surface as `RepoError::Db` without retries.
//!
//! # See also
//! - docs/architecture/pin-schema.md

pub mod cancel;
pub mod pin_patch;
pub mod pin_query;
pub mod pin_repo;
pub mod pin_row;
