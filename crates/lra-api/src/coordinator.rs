//! # Termination Engine
//!
//! [`Coordinator`] owns the registry and the participant client and drives
//! sagas to their terminal status. Request handlers call it directly for
//! `start`, `join`, `close` and friends; the recovery loop calls
//! [`Coordinator::sweep`].
//!
//! ## Driving a saga
//!
//! [`Coordinator::drive`] works on a saga and everything nested below it:
//!
//! 1. **Propagate.** Parents first, a `Closing` saga closes its children
//!    (cancelling any past their own deadline) and a `Cancelling` saga
//!    cancels them (reopening closed ones).
//! 2. **Terminate.** Children first, each saga whose children are all
//!    terminal calls complete/compensate on its unresolved participants,
//!    then finishes if every participant is resolved.
//! 3. **Settle.** Each terminal saga sends outstanding forget calls, then
//!    outstanding after notifications.
//! 4. **Schedule cleanup.** A terminal root whose whole tree is settled is
//!    marked for deletion after the grace period.
//!
//! Each participant call is planned under the saga lock, executed with no
//! lock held, and recorded under the lock again. Every step only touches
//! unresolved participants, so driving the same saga twice is harmless.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use lra_client::{CallContext, ParticipantCallError, ParticipantClient};
use lra_core::{LraError, LraId, ParticipantId, TimeLimit};
use lra_state::{CallAction, CompensatorLinks, Lra, LraStatus, PendingCall};

use crate::config::CoordinatorConfig;
use crate::registry::{Registry, SharedLra};

/// A saga still being recovered, as listed by `GET /recovery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveringLra {
    /// The LRA URI.
    pub lra_id: String,
    /// Current status.
    pub status: LraStatus,
}

/// The LRA coordinator.
#[derive(Debug)]
pub struct Coordinator {
    registry: Registry,
    client: ParticipantClient,
    config: CoordinatorConfig,
    sweeps: watch::Sender<u64>,
}

impl Coordinator {
    /// Create a coordinator over `registry`.
    pub fn new(registry: Registry, config: CoordinatorConfig) -> Result<Self, ParticipantCallError> {
        let client = ParticipantClient::new(config.participant)?;
        let (sweeps, _) = watch::channel(0);
        Ok(Self {
            registry,
            client,
            config,
            sweeps,
        })
    }

    /// The saga registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Completed recovery sweeps since startup.
    pub fn sweep_count(&self) -> u64 {
        *self.sweeps.borrow()
    }

    /// The externally visible URI of an LRA.
    pub fn lra_uri(&self, id: LraId) -> String {
        id.uri(&self.config.base_url)
    }

    /// The recovery URI handed to a participant on join.
    pub fn recovery_uri(&self, id: LraId, participant: ParticipantId) -> String {
        format!("{}/recovery/{participant}", self.lra_uri(id))
    }

    fn lookup(&self, id: LraId) -> Result<SharedLra, LraError> {
        self.registry.get(&id).ok_or(LraError::NotFound(id))
    }

    // ── Protocol operations ──

    /// Start a saga, optionally nested under `parent`.
    pub fn start(
        &self,
        client_id: &str,
        parent: Option<LraId>,
        time_limit: TimeLimit,
    ) -> Result<LraId, LraError> {
        let now = Utc::now();
        let Some(parent_id) = parent else {
            let lra = Lra::new(client_id, None, time_limit, now);
            let id = lra.id();
            self.registry.put(lra);
            tracing::info!(lra = %id, client_id, "LRA started");
            return Ok(id);
        };

        let parent = self.lookup(parent_id)?;
        let mut parent = parent.lock();
        parent.expire(now);
        if parent.status() != LraStatus::Active {
            return Err(LraError::Gone {
                id: parent_id,
                reason: format!("parent LRA is {}", parent.status()),
            });
        }
        let lra = Lra::new(client_id, Some(parent_id), time_limit, now);
        let id = lra.id();
        self.registry.put(lra);
        parent.add_child(id);
        tracing::info!(lra = %id, parent = %parent_id, client_id, "nested LRA started");
        Ok(id)
    }

    /// Enlist a participant. Returns its id.
    pub fn join(
        &self,
        id: LraId,
        links: CompensatorLinks,
        time_limit: TimeLimit,
    ) -> Result<ParticipantId, LraError> {
        let shared = self.lookup(id)?;
        let mut lra = shared.lock();
        lra.join(links, time_limit, self.config.retry_budget, Utc::now())
    }

    /// Remove a participant. Returns how many records were removed.
    pub fn leave(&self, id: LraId, links: &CompensatorLinks) -> Result<usize, LraError> {
        let shared = self.lookup(id)?;
        let removed = shared.lock().leave(links);
        tracing::debug!(lra = %id, removed, "participant left");
        Ok(removed)
    }

    /// Current status of a saga.
    pub fn status(&self, id: LraId) -> Result<LraStatus, LraError> {
        Ok(self.lookup(id)?.lock().status())
    }

    /// A copy of a saga.
    pub fn info(&self, id: LraId) -> Result<Lra, LraError> {
        Ok(self.lookup(id)?.lock().clone())
    }

    /// All sagas, optionally filtered by status.
    pub fn list(&self, status: Option<LraStatus>) -> Vec<Lra> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|l| status.map_or(true, |s| l.status() == s))
            .collect()
    }

    /// Sagas that are not terminal yet.
    pub fn recovering(&self) -> Vec<RecoveringLra> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|l| l.status().is_recovering())
            .map(|l| RecoveringLra {
                lra_id: self.lra_uri(l.id()),
                status: l.status(),
            })
            .collect()
    }

    /// Close a saga and run one termination attempt.
    pub async fn close(&self, id: LraId) -> Result<LraStatus, LraError> {
        let shared = self.lookup(id)?;
        let (expired, requested) = {
            let mut lra = shared.lock();
            let expired = lra.expire(Utc::now());
            (expired, lra.request_close())
        };
        // An overdue saga is compensated even though the close is refused.
        if expired || requested.is_ok() {
            self.drive(id).await;
        }
        requested?;
        let status = shared.lock().status();
        Ok(status)
    }

    /// Cancel a saga and run one termination attempt.
    pub async fn cancel(&self, id: LraId) -> Result<LraStatus, LraError> {
        let shared = self.lookup(id)?;
        shared.lock().request_cancel()?;
        self.drive(id).await;
        let status = shared.lock().status();
        Ok(status)
    }

    /// Wait for the sweep in progress and one full sweep after it, bounded
    /// by the configured cap, then list the sagas still recovering.
    pub async fn recovery(&self) -> Vec<RecoveringLra> {
        let mut rx = self.sweeps.subscribe();
        let target = *rx.borrow() + 2;
        let waited = tokio::time::timeout(self.config.recovery_wait, rx.wait_for(|n| *n >= target)).await;
        if waited.is_err() {
            tracing::debug!(target, "recovery wait capped, returning current view");
        }
        self.recovering()
    }

    // ── Recovery sweep ──

    /// One pass over the registry: purge expired records, time out overdue
    /// sagas and drive everything that still has work to do.
    pub async fn sweep(&self) {
        let now = Utc::now();
        for id in self.registry.ids() {
            let Some(shared) = self.registry.get(&id) else {
                continue;
            };
            let (purge, needs_drive, parent) = {
                let mut lra = shared.lock();
                if lra.is_ready_to_delete(now) {
                    (true, false, None)
                } else {
                    lra.expire(now);
                    let needs_drive = match lra.status() {
                        LraStatus::Active => false,
                        LraStatus::Closing | LraStatus::Cancelling => true,
                        LraStatus::Closed | LraStatus::Cancelled => {
                            lra.ready_to_delete_at().is_none()
                        }
                    };
                    (false, needs_drive, lra.parent_id())
                }
            };

            if purge {
                self.registry.remove(&id);
                tracing::info!(lra = %id, "finished LRA purged");
                continue;
            }
            if !needs_drive {
                continue;
            }
            // A nested saga whose parent is being driven is handled as part
            // of the parent's tree.
            if parent.is_some_and(|p| self.is_driving(p)) {
                continue;
            }
            self.drive(id).await;
        }
        self.sweeps.send_modify(|n| *n += 1);
    }

    fn is_driving(&self, id: LraId) -> bool {
        self.registry
            .get(&id)
            .is_some_and(|l| l.lock().status() != LraStatus::Active)
    }

    // ── Driving ──

    /// Drive `id` and its nested sagas as far as they can go right now.
    pub async fn drive(&self, id: LraId) {
        let tree = self.subtree(id);
        if tree.is_empty() {
            return;
        }
        self.propagate(&tree);

        for (lra_id, shared) in &tree {
            self.terminate_one(*lra_id, shared).await;
        }

        let root_closed = tree.last().is_some_and(|(_, root)| {
            let root = root.lock();
            root.is_root() && root.status() == LraStatus::Closed
        });
        for (lra_id, shared) in &tree {
            let include_completed = root_closed && *lra_id != id;
            self.settle_one(*lra_id, shared, include_completed).await;
        }

        self.schedule_cleanup(id, &tree, root_closed);
    }

    /// `id` and its descendants, children before parents.
    fn subtree(&self, id: LraId) -> Vec<(LraId, SharedLra)> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            let Some(shared) = self.registry.get(&current) else {
                continue;
            };
            if expanded {
                order.push((current, shared));
                continue;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.push((current, true));
            let children = shared.lock().children().to_vec();
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }
        order
    }

    fn propagate(&self, tree: &[(LraId, SharedLra)]) {
        let now = Utc::now();
        for (_, shared) in tree.iter().rev() {
            let (status, children) = {
                let lra = shared.lock();
                (lra.status(), lra.children().to_vec())
            };
            for child in children {
                let Some(child) = self.registry.get(&child) else {
                    continue;
                };
                let mut child = child.lock();
                match status {
                    LraStatus::Closing => {
                        child.close_from_parent(now);
                    }
                    LraStatus::Cancelling => {
                        child.cancel_from_parent();
                    }
                    _ => {}
                }
            }
        }
    }

    fn children_terminal(&self, children: &[LraId]) -> bool {
        children.iter().all(|c| {
            self.registry
                .get(c)
                .map_or(true, |child| child.lock().status().is_terminal())
        })
    }

    async fn terminate_one(&self, id: LraId, shared: &SharedLra) {
        let children = {
            let lra = shared.lock();
            if !matches!(lra.status(), LraStatus::Closing | LraStatus::Cancelling) {
                return;
            }
            lra.children().to_vec()
        };
        if !self.children_terminal(&children) {
            tracing::debug!(lra = %id, "waiting for nested LRAs");
            return;
        }

        let (calls, parent) = {
            let mut lra = shared.lock();
            (lra.begin_termination_round(), lra.parent_id())
        };
        for call in calls {
            let CallAction::Terminate(kind) = call.action else {
                continue;
            };
            let ctx = self.call_context(id, parent, call.participant);
            let outcome = self
                .client
                .terminate(&call.endpoint, call.status_endpoint.as_ref(), kind, &ctx)
                .await;
            shared.lock().record_termination(call.participant, kind, outcome);
        }

        let children_terminal = self.children_terminal(&children);
        shared.lock().try_finish(children_terminal, Utc::now());
    }

    async fn settle_one(&self, id: LraId, shared: &SharedLra, include_completed: bool) {
        let (forgets, parent) = {
            let mut lra = shared.lock();
            (lra.begin_forget_round(include_completed), lra.parent_id())
        };
        for call in forgets {
            let ctx = self.call_context(id, parent, call.participant);
            let accepted = match self.client.forget(&call.endpoint, &ctx).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(lra = %id, participant = %call.participant, error = %e, "forget failed");
                    false
                }
            };
            shared.lock().record_forget(call.participant, accepted);
        }

        let (afters, status) = {
            let mut lra = shared.lock();
            (lra.begin_after_round(), lra.status())
        };
        for call in afters {
            self.send_after(id, parent, status, &call, shared).await;
        }
    }

    async fn send_after(
        &self,
        id: LraId,
        parent: Option<LraId>,
        status: LraStatus,
        call: &PendingCall,
        shared: &SharedLra,
    ) {
        let ctx = self.call_context(id, parent, call.participant);
        let delivered = match self.client.after(&call.endpoint, status, &ctx).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(lra = %id, participant = %call.participant, error = %e, "after notification failed");
                false
            }
        };
        shared.lock().record_after(call.participant, delivered);
    }

    fn schedule_cleanup(&self, id: LraId, tree: &[(LraId, SharedLra)], root_closed: bool) {
        let Some((_, root)) = tree.last() else {
            return;
        };
        {
            let root = root.lock();
            if !root.is_root() || !root.status().is_terminal() || root.ready_to_delete_at().is_some()
            {
                return;
            }
        }
        let settled = tree
            .iter()
            .all(|(lra_id, shared)| shared.lock().is_settled(root_closed && *lra_id != id));
        if !settled {
            return;
        }

        let at = purge_time(Utc::now(), self.config.delete_grace_delta());
        for (_, shared) in tree {
            shared.lock().mark_ready_to_delete(at);
        }
        tracing::info!(lra = %id, nested = tree.len() - 1, ready_to_delete_at = %at, "LRA settled");
    }

    fn call_context(
        &self,
        id: LraId,
        parent: Option<LraId>,
        participant: ParticipantId,
    ) -> CallContext {
        CallContext {
            lra_uri: self.lra_uri(id),
            parent_uri: parent.map(|p| self.lra_uri(p)),
            recovery_uri: self.recovery_uri(id, participant),
        }
    }
}

fn purge_time(now: DateTime<Utc>, grace: chrono::Duration) -> DateTime<Utc> {
    now.checked_add_signed(grace).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn coordinator() -> Coordinator {
        let mut config = CoordinatorConfig::with_base_url("http://coordinator.test/lra-coordinator");
        config.delete_grace = Duration::ZERO;
        config.recovery_wait = Duration::from_millis(50);
        Coordinator::new(Registry::new(), config).unwrap()
    }

    #[tokio::test]
    async fn close_without_participants_closes() {
        let c = coordinator();
        let id = c.start("c", None, TimeLimit::NONE).unwrap();
        assert_eq!(c.close(id).await.unwrap(), LraStatus::Closed);
        assert!(matches!(c.cancel(id).await, Err(LraError::Gone { .. })));
        assert!(matches!(c.close(id).await, Err(LraError::Gone { .. })));
    }

    #[tokio::test]
    async fn unknown_lra_is_not_found() {
        let c = coordinator();
        let id = LraId::new();
        assert!(matches!(c.status(id), Err(LraError::NotFound(_))));
        assert!(matches!(c.close(id).await, Err(LraError::NotFound(_))));
        assert!(matches!(
            c.start("c", Some(id), TimeLimit::NONE),
            Err(LraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn nested_start_requires_active_parent() {
        let c = coordinator();
        let parent = c.start("p", None, TimeLimit::NONE).unwrap();
        let child = c.start("c", Some(parent), TimeLimit::NONE).unwrap();
        assert_eq!(c.info(parent).unwrap().children(), &[child]);
        assert_eq!(c.info(child).unwrap().parent_id(), Some(parent));

        c.cancel(parent).await.unwrap();
        assert!(matches!(
            c.start("late", Some(parent), TimeLimit::NONE),
            Err(LraError::Gone { .. })
        ));
    }

    #[tokio::test]
    async fn closing_parent_closes_active_children_first() {
        let c = coordinator();
        let parent = c.start("p", None, TimeLimit::NONE).unwrap();
        let child = c.start("c", Some(parent), TimeLimit::NONE).unwrap();
        let grandchild = c.start("g", Some(child), TimeLimit::NONE).unwrap();

        assert_eq!(c.close(parent).await.unwrap(), LraStatus::Closed);
        assert_eq!(c.status(child).unwrap(), LraStatus::Closed);
        assert_eq!(c.status(grandchild).unwrap(), LraStatus::Closed);

        let child_done = c.info(child).unwrap().finished_at().unwrap();
        let parent_done = c.info(parent).unwrap().finished_at().unwrap();
        assert!(child_done <= parent_done);
    }

    #[tokio::test]
    async fn cancelling_parent_reopens_closed_child() {
        let c = coordinator();
        let parent = c.start("p", None, TimeLimit::NONE).unwrap();
        let child = c.start("c", Some(parent), TimeLimit::NONE).unwrap();
        assert_eq!(c.close(child).await.unwrap(), LraStatus::Closed);
        assert_eq!(c.cancel(parent).await.unwrap(), LraStatus::Cancelled);
        assert_eq!(c.status(child).unwrap(), LraStatus::Cancelled);
    }

    #[tokio::test]
    async fn sweep_expires_and_purges() {
        let c = coordinator();
        let id = c.start("c", None, TimeLimit::from_millis(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        c.sweep().await;
        assert_eq!(c.status(id).unwrap(), LraStatus::Cancelled);
        assert!(c.info(id).unwrap().ready_to_delete_at().is_some());
        assert_eq!(c.sweep_count(), 1);

        c.sweep().await;
        assert!(matches!(c.status(id), Err(LraError::NotFound(_))));
    }

    #[tokio::test]
    async fn join_after_timeout_is_precondition_failed() {
        let c = coordinator();
        let id = c.start("c", None, TimeLimit::from_millis(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let links = CompensatorLinks::parse("<http://p/c>; rel=\"compensate\"").unwrap();
        assert!(matches!(
            c.join(id, links, TimeLimit::NONE),
            Err(LraError::PreconditionFailed(_))
        ));
    }

    #[tokio::test]
    async fn recovery_lists_unfinished_lras_after_wait_cap() {
        let c = coordinator();
        let active = c.start("a", None, TimeLimit::NONE).unwrap();
        let done = c.start("d", None, TimeLimit::NONE).unwrap();
        c.close(done).await.unwrap();

        let listed = c.recovery().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].lra_id, c.lra_uri(active));
        assert_eq!(listed[0].status, LraStatus::Active);
    }

    #[test]
    fn recovery_uri_extends_lra_uri() {
        let c = coordinator();
        let id = LraId::new();
        let pid = ParticipantId::new();
        assert_eq!(
            c.recovery_uri(id, pid),
            format!("http://coordinator.test/lra-coordinator/{id}/recovery/{pid}")
        );
    }
}
