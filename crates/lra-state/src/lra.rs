//! # Saga Record
//!
//! [`Lra`] holds one saga: its status, deadline, nesting links and
//! participants. Every method is synchronous and I/O free; the coordinator
//! holds the saga lock while calling them and releases it before any
//! participant call.
//!
//! Children are stored as ids. The coordinator looks them up in the registry
//! and tells [`Lra::try_finish`] whether they are all terminal, so a parent
//! never finishes before its children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lra_core::{LraError, LraId, ParticipantId, TimeLimit};

use crate::descriptor::CompensatorLinks;
use crate::error::TransitionError;
use crate::participant::{Participant, PendingCall, RetryBudget, TerminationOutcome};
use crate::status::{LraStatus, TerminationKind};

/// A long running action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lra {
    id: LraId,
    #[serde(default)]
    parent_id: Option<LraId>,
    #[serde(default)]
    children: Vec<LraId>,
    client_id: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    deadline: Option<DateTime<Utc>>,
    status: LraStatus,
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ready_to_delete_at: Option<DateTime<Utc>>,
}

impl Lra {
    /// Create a new `Active` saga.
    pub fn new(
        client_id: impl Into<String>,
        parent_id: Option<LraId>,
        time_limit: TimeLimit,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LraId::new(),
            parent_id,
            children: Vec::new(),
            client_id: client_id.into(),
            created_at: now,
            deadline: time_limit.deadline_from(now),
            status: LraStatus::Active,
            participants: Vec::new(),
            finished_at: None,
            ready_to_delete_at: None,
        }
    }

    /// Saga identifier.
    pub fn id(&self) -> LraId {
        self.id
    }

    /// Enclosing saga, if nested.
    pub fn parent_id(&self) -> Option<LraId> {
        self.parent_id
    }

    /// Whether this saga has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Nested sagas, in start order.
    pub fn children(&self) -> &[LraId] {
        &self.children
    }

    /// Caller-supplied label.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Absolute deadline, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Current status.
    pub fn status(&self) -> LraStatus {
        self.status
    }

    /// Enlisted participants, in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id() == id)
    }

    /// When the saga reached its terminal status.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// When the registry may purge the saga.
    pub fn ready_to_delete_at(&self) -> Option<DateTime<Utc>> {
        self.ready_to_delete_at
    }

    /// Whether the purge time has passed.
    pub fn is_ready_to_delete(&self, now: DateTime<Utc>) -> bool {
        self.ready_to_delete_at.is_some_and(|at| at <= now)
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }

    /// The termination this saga is undergoing (or underwent).
    pub fn termination_kind(&self) -> Option<TerminationKind> {
        TerminationKind::for_status(self.status)
    }

    /// Register a nested saga.
    pub fn add_child(&mut self, child: LraId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    fn transition(&mut self, target: LraStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(TransitionError::Lra {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        tracing::info!(lra = %self.id, from = %self.status, to = %target, "LRA status change");
        self.status = target;
        Ok(())
    }

    fn gone(&self) -> LraError {
        LraError::Gone {
            id: self.id,
            reason: format!("LRA is {}", self.status),
        }
    }

    // ── Participants ──

    /// Enlist a participant and return its id.
    ///
    /// Joining with an endpoint set that is already enlisted returns the
    /// existing participant. A positive `time_limit` can only move the
    /// deadline earlier.
    pub fn join(
        &mut self,
        links: CompensatorLinks,
        time_limit: TimeLimit,
        budget: RetryBudget,
        now: DateTime<Utc>,
    ) -> Result<ParticipantId, LraError> {
        if self.status == LraStatus::Active && self.is_expired(now) {
            return Err(LraError::PreconditionFailed(self.id));
        }
        if self.status != LraStatus::Active {
            return Err(self.gone());
        }

        if let Some(requested) = time_limit.deadline_from(now) {
            self.deadline = Some(match self.deadline {
                Some(current) => current.min(requested),
                None => requested,
            });
        }

        if let Some(existing) = self.participants.iter().find(|p| p.links() == &links) {
            return Ok(existing.id());
        }
        let participant = Participant::new(links, budget, now);
        let id = participant.id();
        self.participants.push(participant);
        tracing::debug!(lra = %self.id, participant = %id, "participant joined");
        Ok(id)
    }

    /// Remove participants registered with exactly `links`. Returns how many
    /// were removed.
    pub fn leave(&mut self, links: &CompensatorLinks) -> usize {
        let before = self.participants.len();
        self.participants.retain(|p| p.links() != links);
        before - self.participants.len()
    }

    // ── Status changes ──

    /// Caller-requested close. Accepted from `Active` and (idempotently)
    /// `Closing`.
    pub fn request_close(&mut self) -> Result<(), LraError> {
        match self.status {
            LraStatus::Active => Ok(self.transition(LraStatus::Closing)?),
            LraStatus::Closing => Ok(()),
            _ => Err(self.gone()),
        }
    }

    /// Caller-requested cancel. Accepted from `Active` and (idempotently)
    /// `Cancelling`.
    pub fn request_cancel(&mut self) -> Result<(), LraError> {
        match self.status {
            LraStatus::Active => Ok(self.transition(LraStatus::Cancelling)?),
            LraStatus::Cancelling => Ok(()),
            _ => Err(self.gone()),
        }
    }

    /// Close driven by the parent saga. Returns whether the saga still needs
    /// completing. A child past its own deadline is cancelled instead.
    pub fn close_from_parent(&mut self, now: DateTime<Utc>) -> bool {
        if self.expire(now) {
            return false;
        }
        match self.status {
            LraStatus::Active => self.transition(LraStatus::Closing).is_ok(),
            LraStatus::Closing => true,
            _ => false,
        }
    }

    /// Cancel driven by the parent saga. A closed child is reopened for
    /// compensation. Returns whether the saga still needs compensating.
    pub fn cancel_from_parent(&mut self) -> bool {
        match self.status {
            LraStatus::Active | LraStatus::Closing => self.transition(LraStatus::Cancelling).is_ok(),
            LraStatus::Closed => {
                self.finished_at = None;
                for p in &mut self.participants {
                    p.rearm_after();
                }
                self.transition(LraStatus::Cancelling).is_ok()
            }
            LraStatus::Cancelling => true,
            LraStatus::Cancelled => false,
        }
    }

    /// Move an `Active` saga past its deadline to `Cancelling`. Returns
    /// whether it did.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == LraStatus::Active && self.is_expired(now) {
            tracing::info!(lra = %self.id, "LRA time limit elapsed, cancelling");
            return self.transition(LraStatus::Cancelling).is_ok();
        }
        false
    }

    // ── Termination ──

    /// Plan complete/compensate calls for every participant still owed one.
    pub fn begin_termination_round(&mut self) -> Vec<PendingCall> {
        if !matches!(self.status, LraStatus::Closing | LraStatus::Cancelling) {
            return Vec::new();
        }
        let Some(kind) = self.termination_kind() else {
            return Vec::new();
        };
        self.participants
            .iter_mut()
            .filter_map(|p| p.begin_termination(kind))
            .collect()
    }

    /// Record a termination outcome. Outcomes for participants that left in
    /// the meantime are dropped.
    pub fn record_termination(
        &mut self,
        participant: ParticipantId,
        kind: TerminationKind,
        outcome: TerminationOutcome,
    ) {
        let lra = self.id;
        match self.participants.iter_mut().find(|p| p.id() == participant) {
            Some(p) => {
                let status = p.record_termination(kind, outcome);
                tracing::debug!(%lra, %participant, %status, "termination outcome recorded");
            }
            None => {
                tracing::debug!(%lra, %participant, "outcome for departed participant dropped");
            }
        }
    }

    /// Whether every participant is resolved for the current termination.
    pub fn participants_resolved(&self) -> bool {
        match self.termination_kind() {
            Some(kind) => self.participants.iter().all(|p| p.is_resolved_for(kind)),
            None => false,
        }
    }

    /// Move to `Closed`/`Cancelled` once participants and children allow it.
    ///
    /// Returns whether the saga is terminal afterwards.
    pub fn try_finish(&mut self, children_terminal: bool, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return true;
        }
        let Some(kind) = self.termination_kind() else {
            return false;
        };
        if !children_terminal || !self.participants_resolved() {
            return false;
        }
        if self.transition(kind.final_status()).is_err() {
            return false;
        }
        self.finished_at = Some(now);
        true
    }

    // ── After and forget ──

    /// Plan after notifications. Only a terminal saga sends them.
    pub fn begin_after_round(&mut self) -> Vec<PendingCall> {
        if !self.status.is_terminal() {
            return Vec::new();
        }
        self.participants
            .iter_mut()
            .filter_map(Participant::begin_after)
            .collect()
    }

    /// Record an after-notification result.
    pub fn record_after(&mut self, participant: ParticipantId, delivered: bool) {
        if let Some(p) = self.participants.iter_mut().find(|p| p.id() == participant) {
            p.record_after(delivered);
        }
    }

    /// Plan forget calls. Only a terminal saga sends them.
    pub fn begin_forget_round(&mut self, include_completed: bool) -> Vec<PendingCall> {
        if !self.status.is_terminal() {
            return Vec::new();
        }
        self.participants
            .iter_mut()
            .filter_map(|p| p.begin_forget(include_completed))
            .collect()
    }

    /// Record a forget result.
    pub fn record_forget(&mut self, participant: ParticipantId, accepted: bool) {
        if let Some(p) = self.participants.iter_mut().find(|p| p.id() == participant) {
            p.record_forget(accepted);
        }
    }

    /// Terminal, with no after or forget call still owed.
    pub fn is_settled(&self, include_completed: bool) -> bool {
        self.status.is_terminal()
            && self
                .participants
                .iter()
                .all(|p| !p.is_in_flight() && !p.owes_after() && !p.owes_forget(include_completed))
    }

    /// Schedule the purge. The first schedule wins.
    pub fn mark_ready_to_delete(&mut self, at: DateTime<Utc>) {
        if self.ready_to_delete_at.is_none() {
            self.ready_to_delete_at = Some(at);
        }
    }

    /// Clear transient sending state after loading from a snapshot.
    pub fn reset_in_flight(&mut self) {
        for p in &mut self.participants {
            p.reset_in_flight();
        }
    }
}
