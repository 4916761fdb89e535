//! Transition errors raised by the saga and participant state machines.

use thiserror::Error;

use lra_core::{LraError, LraId, ParticipantId};

use crate::status::{LraStatus, ParticipantStatus};

/// A state machine refused a transition that is not in its table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Saga-level transition rejected.
    #[error("LRA {id}: invalid transition from {from} to {to}")]
    Lra {
        /// The saga.
        id: LraId,
        /// Current status.
        from: LraStatus,
        /// Attempted target status.
        to: LraStatus,
    },
    /// Participant-level transition rejected.
    #[error("participant {id}: invalid transition from {from} to {to}")]
    Participant {
        /// The participant.
        id: ParticipantId,
        /// Current status.
        from: ParticipantStatus,
        /// Attempted target status.
        to: ParticipantStatus,
    },
}

impl From<TransitionError> for LraError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Lra { from, to, .. } => LraError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            TransitionError::Participant { from, to, .. } => LraError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
        }
    }
}
