#![deny(missing_docs)]

//! # lra-core: Foundational Types for the LRA Coordinator
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies, only `serde`, `serde_json`,
//! `thiserror`, `chrono`, and `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** An [`LraId`] cannot be passed
//!    where a [`ParticipantId`] is expected.
//!
//! 2. **One place for wire names.** Header and query parameter names of the
//!    coordination protocol live in [`protocol`] and nowhere else.
//!
//! 3. **[`LraError`] hierarchy.** Structured errors with `thiserror`. No
//!    `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod protocol;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{LraError, ValidationError};
pub use identity::{LraId, ParticipantId};
pub use temporal::TimeLimit;
