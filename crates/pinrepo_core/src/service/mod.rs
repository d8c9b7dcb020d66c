//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into the pin record operation set.
//! - Keep callers decoupled from storage details.
//!
//! # See also
//! - docs/architecture/pin-locking.md

pub mod pin_service;
pub mod pin_stream;
