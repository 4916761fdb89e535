//! # Status Enums and Transition Tables
//!
//! Saga and participant lifecycles are plain enums validated against a
//! central transition table. Every status change in the crate goes through
//! [`LraStatus::can_transition_to`] or [`ParticipantStatus::can_transition_to`];
//! nothing assigns a status field without consulting the table.
//!
//! ## Saga lifecycle
//!
//! ```text
//! Active ──close()──▶ Closing ──(participants resolved)──▶ Closed
//!   │                    │                                   │
//!   │                    └──(parent cancelled)──┐            │(parent cancelled)
//!   │                                           ▼            ▼
//!   └──cancel()/timeout──────────────────▶ Cancelling ◀──────┘
//!                                                │
//!                                                ▼
//!                                            Cancelled
//! ```
//!
//! The two edges into `Cancelling` from `Closing`/`Closed` exist only for
//! nested sagas whose parent is cancelled; the coordinator never takes them
//! for a root saga.

use serde::{Deserialize, Serialize};

use lra_core::ValidationError;

/// Saga-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LraStatus {
    /// Accepting participants; no termination requested yet.
    Active,
    /// Close requested; participants are being completed.
    Closing,
    /// Cancel requested or deadline elapsed; participants are being compensated.
    Cancelling,
    /// Every participant reached a completion end state. Terminal.
    Closed,
    /// Every participant reached a compensation end state. Terminal.
    Cancelled,
}

impl LraStatus {
    /// The canonical status name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Closing => "Closing",
            Self::Cancelling => "Cancelling",
            Self::Closed => "Closed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Convert a canonical status name to an `LraStatus`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Active" => Some(Self::Active),
            "Closing" => Some(Self::Closing),
            "Cancelling" => Some(Self::Cancelling),
            "Closed" => Some(Self::Closed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status is terminal (`Closed` or `Cancelled`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// Whether the saga is still being driven by the coordinator.
    pub fn is_recovering(&self) -> bool {
        !self.is_terminal()
    }

    /// The set of valid target statuses from this status.
    pub fn valid_transitions(&self) -> &'static [LraStatus] {
        match self {
            Self::Active => &[Self::Closing, Self::Cancelling],
            Self::Closing => &[Self::Closed, Self::Cancelling],
            Self::Cancelling => &[Self::Cancelled],
            Self::Closed => &[Self::Cancelling],
            Self::Cancelled => &[],
        }
    }

    /// Whether `self → target` is an edge of the transition table.
    pub fn can_transition_to(&self, target: LraStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl std::fmt::Display for LraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LraStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.trim()).ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

/// Participant-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantStatus {
    /// Enlisted, nothing asked of it yet.
    Active,
    /// Complete has been requested and not yet confirmed.
    Completing,
    /// Compensate has been requested and not yet confirmed.
    Compensating,
    /// Completion confirmed.
    Completed,
    /// Compensation confirmed.
    Compensated,
    /// Completion given up on (retry budget exhausted or self-reported).
    FailedToComplete,
    /// Compensation given up on (retry budget exhausted or self-reported).
    FailedToCompensate,
}

impl ParticipantStatus {
    /// The canonical status name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completing => "Completing",
            Self::Compensating => "Compensating",
            Self::Completed => "Completed",
            Self::Compensated => "Compensated",
            Self::FailedToComplete => "FailedToComplete",
            Self::FailedToCompensate => "FailedToCompensate",
        }
    }

    /// Convert a canonical status name to a `ParticipantStatus`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Active" => Some(Self::Active),
            "Completing" => Some(Self::Completing),
            "Compensating" => Some(Self::Compensating),
            "Completed" => Some(Self::Completed),
            "Compensated" => Some(Self::Compensated),
            "FailedToComplete" => Some(Self::FailedToComplete),
            "FailedToCompensate" => Some(Self::FailedToCompensate),
            _ => None,
        }
    }

    /// Whether this is one of the four end states a participant can report.
    pub fn is_end_state(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Compensated | Self::FailedToComplete | Self::FailedToCompensate
        )
    }

    /// Whether this is a `FailedTo*` status (the participant is owed a forget).
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::FailedToComplete | Self::FailedToCompensate)
    }

    /// Whether no further action of `kind` is needed for this status.
    ///
    /// A participant that failed to complete is not compensated afterwards:
    /// it is settled by a forget call instead.
    pub fn is_resolved_for(&self, kind: TerminationKind) -> bool {
        match kind {
            TerminationKind::Complete => {
                matches!(self, Self::Completed | Self::FailedToComplete)
                    || self.is_resolved_for(TerminationKind::Compensate)
            }
            TerminationKind::Compensate => matches!(
                self,
                Self::Compensated | Self::FailedToCompensate | Self::FailedToComplete
            ),
        }
    }

    /// The set of valid target statuses from this status.
    pub fn valid_transitions(&self) -> &'static [ParticipantStatus] {
        match self {
            Self::Active => &[
                Self::Completing,
                Self::Compensating,
                Self::Completed,
                Self::Compensated,
                Self::FailedToComplete,
                Self::FailedToCompensate,
            ],
            Self::Completing => &[
                Self::Completed,
                Self::FailedToComplete,
                Self::Compensating,
                Self::Compensated,
                Self::FailedToCompensate,
            ],
            // A participant may report that its earlier completion failed.
            Self::Compensating => &[
                Self::Compensated,
                Self::FailedToCompensate,
                Self::FailedToComplete,
            ],
            Self::Completed => &[
                Self::Compensating,
                Self::Compensated,
                Self::FailedToCompensate,
            ],
            Self::Compensated | Self::FailedToComplete | Self::FailedToCompensate => &[],
        }
    }

    /// Whether `self → target` is an edge of the transition table.
    pub fn can_transition_to(&self, target: ParticipantStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl std::fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParticipantStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s.trim()).ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

/// Which way a saga is being terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationKind {
    /// Close: drive participants to `Completed`.
    Complete,
    /// Cancel: drive participants to `Compensated`.
    Compensate,
}

impl TerminationKind {
    /// The saga status while this termination is in progress.
    pub fn in_progress_status(&self) -> LraStatus {
        match self {
            Self::Complete => LraStatus::Closing,
            Self::Compensate => LraStatus::Cancelling,
        }
    }

    /// The saga status once this termination finished.
    pub fn final_status(&self) -> LraStatus {
        match self {
            Self::Complete => LraStatus::Closed,
            Self::Compensate => LraStatus::Cancelled,
        }
    }

    /// The termination a saga status implies, if any.
    pub fn for_status(status: LraStatus) -> Option<Self> {
        match status {
            LraStatus::Closing | LraStatus::Closed => Some(Self::Complete),
            LraStatus::Cancelling | LraStatus::Cancelled => Some(Self::Compensate),
            LraStatus::Active => None,
        }
    }

    /// Participant status while the call is outstanding.
    pub fn participant_in_progress(&self) -> ParticipantStatus {
        match self {
            Self::Complete => ParticipantStatus::Completing,
            Self::Compensate => ParticipantStatus::Compensating,
        }
    }

    /// Participant status on confirmed success.
    pub fn participant_success(&self) -> ParticipantStatus {
        match self {
            Self::Complete => ParticipantStatus::Completed,
            Self::Compensate => ParticipantStatus::Compensated,
        }
    }

    /// Participant status once the retry budget is exhausted.
    pub fn participant_failure(&self) -> ParticipantStatus {
        match self {
            Self::Complete => ParticipantStatus::FailedToComplete,
            Self::Compensate => ParticipantStatus::FailedToCompensate,
        }
    }
}

impl std::fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::Compensate => f.write_str("compensate"),
        }
    }
}

/// Progress of the one-shot "after LRA" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AfterState {
    /// Not attempted successfully yet.
    #[default]
    NotSent,
    /// A send is in flight.
    Sending,
    /// Delivered, or given up on after the after-retry budget ran out.
    Sent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_LRA: [LraStatus; 5] = [
        LraStatus::Active,
        LraStatus::Closing,
        LraStatus::Cancelling,
        LraStatus::Closed,
        LraStatus::Cancelled,
    ];

    const ALL_PARTICIPANT: [ParticipantStatus; 7] = [
        ParticipantStatus::Active,
        ParticipantStatus::Completing,
        ParticipantStatus::Compensating,
        ParticipantStatus::Completed,
        ParticipantStatus::Compensated,
        ParticipantStatus::FailedToComplete,
        ParticipantStatus::FailedToCompensate,
    ];

    #[test]
    fn nothing_returns_to_active() {
        for s in ALL_LRA {
            assert!(!s.can_transition_to(LraStatus::Active), "{s} -> Active");
        }
        for s in ALL_PARTICIPANT {
            assert!(
                !s.can_transition_to(ParticipantStatus::Active),
                "{s} -> Active"
            );
        }
    }

    #[test]
    fn cancelled_is_a_sink() {
        assert!(LraStatus::Cancelled.valid_transitions().is_empty());
        assert!(LraStatus::Cancelled.is_terminal());
    }

    #[test]
    fn closing_cannot_skip_to_cancelled() {
        assert!(!LraStatus::Closing.can_transition_to(LraStatus::Cancelled));
        assert!(!LraStatus::Active.can_transition_to(LraStatus::Closed));
    }

    #[test]
    fn failed_to_complete_resolves_both_kinds() {
        let s = ParticipantStatus::FailedToComplete;
        assert!(s.is_resolved_for(TerminationKind::Complete));
        assert!(s.is_resolved_for(TerminationKind::Compensate));
    }

    #[test]
    fn compensating_accepts_reported_completion_failure() {
        let s = ParticipantStatus::Compensating;
        assert!(s.can_transition_to(ParticipantStatus::FailedToComplete));
        assert!(!s.can_transition_to(ParticipantStatus::Completed));
    }

    #[test]
    fn completed_is_not_resolved_for_compensation() {
        let s = ParticipantStatus::Completed;
        assert!(s.is_resolved_for(TerminationKind::Complete));
        assert!(!s.is_resolved_for(TerminationKind::Compensate));
        assert!(s.can_transition_to(ParticipantStatus::Compensating));
    }

    #[test]
    fn status_names_round_trip() {
        for s in ALL_LRA {
            assert_eq!(LraStatus::from_name(s.as_str()), Some(s));
            assert_eq!(s.as_str().parse::<LraStatus>().unwrap(), s);
        }
        for s in ALL_PARTICIPANT {
            assert_eq!(ParticipantStatus::from_name(s.as_str()), Some(s));
        }
        assert!("Finished".parse::<LraStatus>().is_err());
    }

    #[test]
    fn serde_uses_canonical_names() {
        assert_eq!(
            serde_json::to_string(&LraStatus::Cancelling).unwrap(),
            "\"Cancelling\""
        );
        assert_eq!(
            serde_json::to_string(&ParticipantStatus::FailedToCompensate).unwrap(),
            "\"FailedToCompensate\""
        );
    }

    #[test]
    fn termination_kind_maps_statuses() {
        assert_eq!(
            TerminationKind::for_status(LraStatus::Closing),
            Some(TerminationKind::Complete)
        );
        assert_eq!(
            TerminationKind::for_status(LraStatus::Cancelled),
            Some(TerminationKind::Compensate)
        );
        assert_eq!(TerminationKind::for_status(LraStatus::Active), None);
        assert_eq!(
            TerminationKind::Compensate.participant_failure(),
            ParticipantStatus::FailedToCompensate
        );
    }

    proptest! {
        /// Once resolved for compensation a participant stays resolved.
        #[test]
        fn resolved_compensation_is_absorbing(i in 0usize..7, j in 0usize..7) {
            let from = ALL_PARTICIPANT[i];
            let to = ALL_PARTICIPANT[j];
            if from.is_resolved_for(TerminationKind::Compensate) && from.can_transition_to(to) {
                prop_assert!(to.is_resolved_for(TerminationKind::Compensate));
            }
        }

        #[test]
        fn terminal_lra_only_reopens_to_cancelling(i in 0usize..5, j in 0usize..5) {
            let from = ALL_LRA[i];
            let to = ALL_LRA[j];
            if from.is_terminal() && from.can_transition_to(to) {
                prop_assert_eq!(from, LraStatus::Closed);
                prop_assert_eq!(to, LraStatus::Cancelling);
            }
        }
    }
}
