//! # Participant Lifecycle
//!
//! One record per enlisted compensator. The coordinator never mutates a
//! participant while talking to it: a call is *planned* under the saga lock
//! ([`Participant::begin_termination`] and friends), performed with the lock
//! released, then *recorded* under the lock again. The in-flight flag set
//! during planning is the compare-and-set that keeps a direct `close` and a
//! concurrent recovery sweep from calling the same participant twice.
//!
//! ## Retry budgets
//!
//! Each participant carries three independent budgets: one for
//! complete/compensate, one for the after notification and one for forget.
//! A retryable outcome spends one unit. An exhausted termination budget
//! turns the participant into `FailedToComplete`/`FailedToCompensate`, an
//! exhausted after budget marks the notification as given up, and an
//! exhausted forget budget stops forget calls with an operator error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use lra_core::ParticipantId;

use crate::descriptor::CompensatorLinks;
use crate::error::TransitionError;
use crate::status::{AfterState, ParticipantStatus, TerminationKind};

/// Default number of attempts for each participant budget.
pub const DEFAULT_ATTEMPTS: u32 = 30;

/// Initial retry budgets handed to a participant when it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    /// Complete/compensate attempts.
    pub attempts: u32,
    /// After-notification attempts.
    pub after_attempts: u32,
    /// Forget attempts.
    pub forget_attempts: u32,
}

impl RetryBudget {
    /// The same budget for all three call kinds.
    pub fn uniform(attempts: u32) -> Self {
        Self {
            attempts,
            after_attempts: attempts,
            forget_attempts: attempts,
        }
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::uniform(DEFAULT_ATTEMPTS)
    }
}

// ─── Calls and outcomes ──────────────────────────────────────────────

/// What a planned participant call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// `PUT` to the complete or compensate endpoint.
    Terminate(TerminationKind),
    /// `PUT` to the after endpoint.
    After,
    /// `DELETE` to the forget endpoint.
    Forget,
}

/// A participant call planned under the saga lock, executed without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    /// The participant being called.
    pub participant: ParticipantId,
    /// The call to make.
    pub action: CallAction,
    /// Endpoint for the call.
    pub endpoint: Url,
    /// Status endpoint to poll when a termination call does not settle.
    pub status_endpoint: Option<Url>,
}

/// Result of a complete/compensate attempt, after any status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The participant confirmed (`200`, or `410` from either endpoint).
    Succeeded,
    /// The participant reported an end state through its status endpoint.
    Reported(ParticipantStatus),
    /// Not settled yet (`202`, other codes, transport failures).
    Retry {
        /// Description of what went wrong, for logs.
        reason: String,
    },
}

// ─── Participant ─────────────────────────────────────────────────────

/// An enlisted participant of one saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    id: ParticipantId,
    links: CompensatorLinks,
    status: ParticipantStatus,
    #[serde(default)]
    after: AfterState,
    #[serde(default)]
    forgotten: bool,
    remaining_attempts: u32,
    remaining_after_attempts: u32,
    remaining_forget_attempts: u32,
    joined_at: DateTime<Utc>,
    #[serde(skip)]
    in_flight: bool,
}

impl Participant {
    /// Enlist a participant with the given endpoints.
    pub fn new(links: CompensatorLinks, budget: RetryBudget, now: DateTime<Utc>) -> Self {
        Self {
            id: ParticipantId::new(),
            links,
            status: ParticipantStatus::Active,
            after: AfterState::NotSent,
            forgotten: false,
            remaining_attempts: budget.attempts,
            remaining_after_attempts: budget.after_attempts,
            remaining_forget_attempts: budget.forget_attempts,
            joined_at: now,
            in_flight: false,
        }
    }

    /// Participant identifier (the last segment of its recovery URI).
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Registered endpoints.
    pub fn links(&self) -> &CompensatorLinks {
        &self.links
    }

    /// Current status.
    pub fn status(&self) -> ParticipantStatus {
        self.status
    }

    /// After-notification progress.
    pub fn after_state(&self) -> AfterState {
        self.after
    }

    /// Whether a forget call succeeded.
    pub fn is_forgotten(&self) -> bool {
        self.forgotten
    }

    /// Remaining complete/compensate attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.remaining_attempts
    }

    /// Remaining after-notification attempts.
    pub fn remaining_after_attempts(&self) -> u32 {
        self.remaining_after_attempts
    }

    /// Remaining forget attempts.
    pub fn remaining_forget_attempts(&self) -> u32 {
        self.remaining_forget_attempts
    }

    /// When the participant joined.
    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Whether a call to this participant is currently outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Listener-only participants have no complete/compensate endpoint.
    pub fn is_listener_only(&self) -> bool {
        self.links.is_listener_only()
    }

    /// Whether no `kind` call is owed to this participant.
    pub fn is_resolved_for(&self, kind: TerminationKind) -> bool {
        self.is_listener_only() || self.status.is_resolved_for(kind)
    }

    /// Move to `target` if the transition table allows it.
    ///
    /// Transitioning to the current status is a no-op.
    pub fn transition(&mut self, target: ParticipantStatus) -> Result<(), TransitionError> {
        if self.status == target {
            return Ok(());
        }
        if !self.status.can_transition_to(target) {
            return Err(TransitionError::Participant {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    // ── Complete / compensate ──

    /// Plan a complete/compensate call.
    ///
    /// Returns `None` when nothing is owed, a call is already in flight, or
    /// the participant has no endpoint for `kind` (it is then resolved
    /// directly to the success status).
    pub fn begin_termination(&mut self, kind: TerminationKind) -> Option<PendingCall> {
        if self.in_flight || self.is_resolved_for(kind) {
            return None;
        }
        let endpoint = match kind {
            TerminationKind::Complete => self.links.complete.clone(),
            TerminationKind::Compensate => self.links.compensate.clone(),
        };
        let Some(endpoint) = endpoint else {
            if let Err(e) = self.transition(kind.participant_success()) {
                tracing::warn!(participant = %self.id, error = %e, "cannot resolve participant without endpoint");
            }
            return None;
        };
        if let Err(e) = self.transition(kind.participant_in_progress()) {
            tracing::warn!(participant = %self.id, error = %e, "participant cannot start {kind}");
            return None;
        }
        self.in_flight = true;
        Some(PendingCall {
            participant: self.id,
            action: CallAction::Terminate(kind),
            endpoint,
            status_endpoint: self.links.status.clone(),
        })
    }

    /// Record the outcome of a call planned by [`begin_termination`].
    ///
    /// Returns the participant status afterwards.
    ///
    /// [`begin_termination`]: Participant::begin_termination
    pub fn record_termination(
        &mut self,
        kind: TerminationKind,
        outcome: TerminationOutcome,
    ) -> ParticipantStatus {
        self.in_flight = false;
        let reason = match outcome {
            TerminationOutcome::Succeeded => {
                match self.transition(kind.participant_success()) {
                    Ok(()) => return self.status,
                    Err(e) => e.to_string(),
                }
            }
            TerminationOutcome::Reported(reported) if reported.is_end_state() => {
                match self.transition(reported) {
                    Ok(()) => return self.status,
                    Err(e) => e.to_string(),
                }
            }
            TerminationOutcome::Reported(reported) => format!("participant reports {reported}"),
            TerminationOutcome::Retry { reason } => reason,
        };

        self.remaining_attempts = self.remaining_attempts.saturating_sub(1);
        if self.remaining_attempts == 0 {
            tracing::error!(
                participant = %self.id,
                %reason,
                "{kind} retry budget exhausted, giving up"
            );
            if let Err(e) = self.transition(kind.participant_failure()) {
                tracing::warn!(participant = %self.id, error = %e, "cannot mark participant failed");
            }
        } else {
            tracing::debug!(
                participant = %self.id,
                %reason,
                remaining = self.remaining_attempts,
                "{kind} not settled, will retry"
            );
        }
        self.status
    }

    // ── After notification ──

    /// Whether an after notification is still owed.
    pub fn owes_after(&self) -> bool {
        self.links.after.is_some() && self.after != AfterState::Sent
    }

    /// Plan the after notification.
    pub fn begin_after(&mut self) -> Option<PendingCall> {
        if self.in_flight || self.after != AfterState::NotSent {
            return None;
        }
        let endpoint = self.links.after.clone()?;
        self.after = AfterState::Sending;
        self.in_flight = true;
        Some(PendingCall {
            participant: self.id,
            action: CallAction::After,
            endpoint,
            status_endpoint: None,
        })
    }

    /// Record whether the after notification was delivered.
    pub fn record_after(&mut self, delivered: bool) {
        self.in_flight = false;
        if delivered {
            self.after = AfterState::Sent;
            return;
        }
        self.remaining_after_attempts = self.remaining_after_attempts.saturating_sub(1);
        if self.remaining_after_attempts == 0 {
            tracing::error!(participant = %self.id, "after notification retry budget exhausted, giving up");
            self.after = AfterState::Sent;
        } else {
            self.after = AfterState::NotSent;
        }
    }

    /// Owe the after notification again, for a closed nested saga that is
    /// reopened for compensation.
    pub(crate) fn rearm_after(&mut self) {
        if self.links.after.is_some() && self.after == AfterState::Sent {
            self.after = AfterState::NotSent;
        }
    }

    // ── Forget ──

    /// Whether a forget call is still owed.
    ///
    /// `FailedTo*` participants are always owed one; `include_completed`
    /// extends that to `Completed` participants (the completed participants
    /// of a closed child whose root also closed).
    pub fn owes_forget(&self, include_completed: bool) -> bool {
        let eligible = self.status.is_failed()
            || (include_completed && self.status == ParticipantStatus::Completed);
        eligible
            && self.links.forget.is_some()
            && !self.forgotten
            && self.remaining_forget_attempts > 0
    }

    /// Plan a forget call.
    pub fn begin_forget(&mut self, include_completed: bool) -> Option<PendingCall> {
        if self.in_flight || !self.owes_forget(include_completed) {
            return None;
        }
        let endpoint = self.links.forget.clone()?;
        self.in_flight = true;
        Some(PendingCall {
            participant: self.id,
            action: CallAction::Forget,
            endpoint,
            status_endpoint: None,
        })
    }

    /// Record whether the forget call was accepted.
    pub fn record_forget(&mut self, accepted: bool) {
        self.in_flight = false;
        if accepted {
            self.forgotten = true;
            return;
        }
        self.remaining_forget_attempts = self.remaining_forget_attempts.saturating_sub(1);
        if self.remaining_forget_attempts == 0 {
            tracing::error!(
                participant = %self.id,
                status = %self.status,
                "forget retry budget exhausted, participant must be cleaned up manually"
            );
        }
    }

    /// Clear transient sending state after loading from a snapshot.
    pub fn reset_in_flight(&mut self) {
        self.in_flight = false;
        if self.after == AfterState::Sending {
            self.after = AfterState::NotSent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(descriptor: &str) -> CompensatorLinks {
        CompensatorLinks::parse(descriptor).unwrap()
    }

    fn full() -> Participant {
        Participant::new(
            links(
                "<http://p/complete>; rel=\"complete\", <http://p/compensate>; rel=\"compensate\", \
                 <http://p/forget>; rel=\"forget\", <http://p/status>; rel=\"status\", \
                 <http://p/after>; rel=\"after\"",
            ),
            RetryBudget::uniform(3),
            Utc::now(),
        )
    }

    #[test]
    fn begin_termination_marks_in_progress_and_in_flight() {
        let mut p = full();
        let call = p.begin_termination(TerminationKind::Complete).unwrap();
        assert_eq!(call.action, CallAction::Terminate(TerminationKind::Complete));
        assert_eq!(call.endpoint.as_str(), "http://p/complete");
        assert_eq!(call.status_endpoint.unwrap().as_str(), "http://p/status");
        assert_eq!(p.status(), ParticipantStatus::Completing);
        assert!(p.is_in_flight());
    }

    #[test]
    fn in_flight_participant_is_not_planned_twice() {
        let mut p = full();
        assert!(p.begin_termination(TerminationKind::Complete).is_some());
        assert!(p.begin_termination(TerminationKind::Complete).is_none());
    }

    #[test]
    fn success_completes() {
        let mut p = full();
        p.begin_termination(TerminationKind::Complete);
        let s = p.record_termination(TerminationKind::Complete, TerminationOutcome::Succeeded);
        assert_eq!(s, ParticipantStatus::Completed);
        assert!(!p.is_in_flight());
        assert_eq!(p.remaining_attempts(), 3);
        assert!(p.begin_termination(TerminationKind::Complete).is_none());
    }

    #[test]
    fn retries_exhaust_into_failure() {
        let mut p = full();
        for _ in 0..3 {
            p.begin_termination(TerminationKind::Compensate).unwrap();
            p.record_termination(
                TerminationKind::Compensate,
                TerminationOutcome::Retry {
                    reason: "503".into(),
                },
            );
        }
        assert_eq!(p.status(), ParticipantStatus::FailedToCompensate);
        assert_eq!(p.remaining_attempts(), 0);
        assert!(p.begin_termination(TerminationKind::Compensate).is_none());
    }

    #[test]
    fn reported_end_state_is_adopted() {
        let mut p = full();
        p.begin_termination(TerminationKind::Complete);
        let s = p.record_termination(
            TerminationKind::Complete,
            TerminationOutcome::Reported(ParticipantStatus::FailedToComplete),
        );
        assert_eq!(s, ParticipantStatus::FailedToComplete);
        assert!(p.owes_forget(false));
    }

    #[test]
    fn completion_failure_reported_during_compensation_is_adopted() {
        let mut p = full();
        p.begin_termination(TerminationKind::Compensate);
        let s = p.record_termination(
            TerminationKind::Compensate,
            TerminationOutcome::Reported(ParticipantStatus::FailedToComplete),
        );
        assert_eq!(s, ParticipantStatus::FailedToComplete);
        assert_eq!(p.remaining_attempts(), 3);
        assert!(p.is_resolved_for(TerminationKind::Compensate));
    }

    #[test]
    fn reported_non_end_state_counts_as_retry() {
        let mut p = full();
        p.begin_termination(TerminationKind::Complete);
        let s = p.record_termination(
            TerminationKind::Complete,
            TerminationOutcome::Reported(ParticipantStatus::Completing),
        );
        assert_eq!(s, ParticipantStatus::Completing);
        assert_eq!(p.remaining_attempts(), 2);
    }

    #[test]
    fn missing_endpoint_resolves_directly() {
        let mut p = Participant::new(
            links("<http://p/compensate>; rel=\"compensate\""),
            RetryBudget::default(),
            Utc::now(),
        );
        assert!(p.begin_termination(TerminationKind::Complete).is_none());
        assert_eq!(p.status(), ParticipantStatus::Completed);
    }

    #[test]
    fn completed_participant_can_be_compensated() {
        let mut p = full();
        p.begin_termination(TerminationKind::Complete);
        p.record_termination(TerminationKind::Complete, TerminationOutcome::Succeeded);
        let call = p.begin_termination(TerminationKind::Compensate).unwrap();
        assert_eq!(call.endpoint.as_str(), "http://p/compensate");
        assert_eq!(p.status(), ParticipantStatus::Compensating);
    }

    #[test]
    fn listener_only_is_always_resolved() {
        let mut p = Participant::new(
            links("<http://p/after>; rel=\"after\""),
            RetryBudget::default(),
            Utc::now(),
        );
        assert!(p.is_resolved_for(TerminationKind::Complete));
        assert!(p.is_resolved_for(TerminationKind::Compensate));
        assert!(p.begin_termination(TerminationKind::Compensate).is_none());
        assert_eq!(p.status(), ParticipantStatus::Active);
        assert!(p.owes_after());
    }

    #[test]
    fn after_gives_up_when_budget_runs_out() {
        let mut p = full();
        for _ in 0..3 {
            p.begin_after().unwrap();
            p.record_after(false);
        }
        assert_eq!(p.after_state(), AfterState::Sent);
        assert!(!p.owes_after());
        assert!(p.begin_after().is_none());
    }

    #[test]
    fn forget_only_for_failed_unless_completed_included() {
        let mut p = full();
        p.begin_termination(TerminationKind::Complete);
        p.record_termination(TerminationKind::Complete, TerminationOutcome::Succeeded);
        assert!(p.begin_forget(false).is_none());
        let call = p.begin_forget(true).unwrap();
        assert_eq!(call.action, CallAction::Forget);
        p.record_forget(true);
        assert!(p.is_forgotten());
        assert!(!p.owes_forget(true));
    }

    #[test]
    fn forget_stops_after_budget() {
        let mut p = full();
        p.transition(ParticipantStatus::FailedToComplete).unwrap();
        for _ in 0..3 {
            p.begin_forget(false).unwrap();
            p.record_forget(false);
        }
        assert!(!p.owes_forget(false));
        assert!(!p.is_forgotten());
    }

    #[test]
    fn backward_transition_rejected() {
        let mut p = full();
        p.transition(ParticipantStatus::Compensated).unwrap();
        let err = p.transition(ParticipantStatus::Completing).unwrap_err();
        assert!(matches!(err, TransitionError::Participant { .. }));
    }

    #[test]
    fn in_flight_flag_is_not_persisted() {
        let mut p = full();
        p.begin_after().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("in_flight"));
        let mut loaded: Participant = serde_json::from_str(&json).unwrap();
        assert!(!loaded.is_in_flight());
        assert_eq!(loaded.after_state(), AfterState::Sending);
        loaded.reset_in_flight();
        assert_eq!(loaded.after_state(), AfterState::NotSent);
    }
}
