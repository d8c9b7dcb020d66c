//! Domain model for pin records.
//!
//! # Responsibility
//! - Define canonical data structures used by repository and service code.
//! - Keep the wire shape of a pin status independent from storage rows.
//!
//! # Invariants
//! - Every stored record is identified by a stable request id.
//! - Records always belong to exactly one owner.
//!
//! # See also
//! - docs/architecture/pin-model.md

pub mod pin;
