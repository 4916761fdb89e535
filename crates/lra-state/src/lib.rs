#![deny(missing_docs)]

//! # lra-state: Saga and Participant State Machines
//!
//! Runtime-validated state machines for the coordinator:
//!
//! - **Saga** ([`Lra`]): `Active → Closing → Closed`,
//!   `Active → Cancelling → Cancelled`, plus the parent-driven
//!   `Closing/Closed → Cancelling` edges for nested sagas.
//! - **Participant** ([`Participant`]): `Active → Completing → Completed`,
//!   `Active → Compensating → Compensated`, the two `FailedTo*` end states,
//!   and `Completed → Compensating` when an enclosing saga cancels.
//!
//! Every status change consults the tables in [`status`]. Participant calls
//! are planned and recorded here but never performed: this crate does no
//! I/O.

pub mod descriptor;
pub mod error;
pub mod lra;
pub mod participant;
pub mod status;

pub use descriptor::CompensatorLinks;
pub use error::TransitionError;
pub use lra::Lra;
pub use participant::{
    CallAction, Participant, PendingCall, RetryBudget, TerminationOutcome, DEFAULT_ATTEMPTS,
};
pub use status::{AfterState, LraStatus, ParticipantStatus, TerminationKind};
