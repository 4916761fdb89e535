//! # Error Hierarchy
//!
//! Structured error types for the coordinator, built with `thiserror`.
//!
//! Only request-level violations (unknown saga, saga already finished,
//! deadline elapsed, malformed descriptor) surface to callers. Participant
//! call failures are absorbed into participant state and never appear here.

use thiserror::Error;

use crate::identity::LraId;

/// Top-level error type for coordinator operations.
#[derive(Error, Debug)]
pub enum LraError {
    /// No saga is registered under the given id.
    #[error("LRA {0} not found")]
    NotFound(LraId),

    /// The saga has already finished (or is finishing the other way) and
    /// cannot accept the requested operation.
    #[error("LRA {id} is gone: {reason}")]
    Gone {
        /// The saga identifier.
        id: LraId,
        /// Human-readable reason, usually the current status.
        reason: String,
    },

    /// The saga deadline has already elapsed.
    #[error("LRA {0} has passed its time limit")]
    PreconditionFailed(LraId),

    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A state machine rejected a transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The current state name.
        from: String,
        /// The attempted target state name.
        to: String,
    },

    /// Loading or saving the durable registry snapshot failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validation errors for protocol inputs.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The value is neither a UUID nor a URI ending in one.
    #[error("invalid LRA id: \"{0}\" (expected a UUID or an LRA URI ending in one)")]
    InvalidLraId(String),

    /// The compensator descriptor could not be parsed.
    #[error("invalid compensator descriptor: {0}")]
    InvalidDescriptor(String),

    /// A time limit was negative.
    #[error("invalid time limit: {0} (expected milliseconds >= 0)")]
    InvalidTimeLimit(i64),

    /// A status name is not part of the protocol.
    #[error("unknown status name: \"{0}\"")]
    UnknownStatus(String),
}
