//! Optimistic mutation engine
//!
//! Applies a tentative transition to the store immediately, issues the RPC,
//! then either confirms (merging any authoritative server values) or rolls
//! back to the pre-transition snapshot.
//!
//! # Rollback rule
//!
//! The engine keeps a full snapshot, never a diff, together with the store
//! version its own write produced. A rollback only restores the snapshot if
//! the entity still carries that version. If a push event (or any other
//! write) advanced it while the request was in flight, the newer state is
//! kept and the conflict is logged.
//!
//! ```text
//!   apply_optimistic ──► store write (version v, pending)
//!          │
//!          ▼
//!        RPC ──ok──► commit: clear pending, merge server truth
//!          │
//!          └─err──► version == v ? restore snapshot : keep newer state
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::lifecycle::Liveness;
use crate::model::{Votable, VoteAction, VoteDirection, VotePatch};
use crate::rate_limit::{ActionKind, Permit, RateLimiter};
use crate::store::{Entity, StoreHandle};
use crate::weight::VoterContext;

/// Why a mutation was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same key already in flight or cooling down
    InFlight,
    /// Caller-supplied disabled flag (permissions, logged out, ...)
    Disabled,
    /// Entity not in the store
    Missing,
}

/// Final state of one optimistic mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Nothing happened: no state change, no RPC
    Skipped(SkipReason),
    /// Server confirmed
    Committed,
    /// Server refused or was unreachable; snapshot restored
    RolledBack(SyncError),
    /// Server refused or was unreachable, but newer state arrived while the
    /// request was in flight and was kept
    Conflict(SyncError),
    /// The owning view unmounted before the RPC settled
    Detached,
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, MutationOutcome::Skipped(_))
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            MutationOutcome::RolledBack(e) | MutationOutcome::Conflict(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Applied {
    /// Entity rewritten in place at this version
    Updated(u64),
    /// Entity removed; tombstone at this version
    Removed(u64),
}

#[derive(Debug, Clone)]
struct Snapshot<E> {
    entity_id: String,
    before: E,
    position: usize,
    applied: Applied,
}

/// An optimistic write awaiting its server verdict.
///
/// Settle it with [`commit`](Self::commit), [`commit_with`](Self::commit_with)
/// or [`rollback`](Self::rollback). Dropping it unsettled keeps the local
/// state and clears the pending marks. The rate-limiter permit is released
/// in every case.
pub struct PendingMutation<E: Entity> {
    store: StoreHandle<E>,
    liveness: Liveness,
    kind: ActionKind,
    key: String,
    snapshots: Vec<Snapshot<E>>,
    permit: Option<Permit>,
    settled: bool,
}

impl<E: Entity> PendingMutation<E> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Ids touched by this mutation
    pub fn entity_ids(&self) -> Vec<&str> {
        self.snapshots.iter().map(|s| s.entity_id.as_str()).collect()
    }

    /// Confirm without server data
    pub fn commit(self) -> MutationOutcome {
        self.commit_with(|_| {})
    }

    /// Confirm and overwrite local fields with authoritative server values.
    /// `merge` runs once per touched entity that is still present.
    pub fn commit_with<F>(mut self, mut merge: F) -> MutationOutcome
    where
        F: FnMut(&mut E),
    {
        self.settled = true;
        if !self.liveness.is_alive() {
            debug!(key = %self.key, action = self.kind.as_str(), "Commit after unmount ignored");
            return MutationOutcome::Detached;
        }

        let mut store = self.store.write();
        for snapshot in &self.snapshots {
            store.set_pending(&snapshot.entity_id, false);
            if let Applied::Updated(_) = snapshot.applied {
                store.update(&snapshot.entity_id, &mut merge);
            }
        }
        debug!(key = %self.key, action = self.kind.as_str(), "Optimistic mutation committed");
        MutationOutcome::Committed
    }

    /// Revert to the pre-transition snapshot where nothing newer has been
    /// written since.
    pub fn rollback(mut self, error: SyncError) -> MutationOutcome {
        self.settled = true;
        if !self.liveness.is_alive() {
            debug!(key = %self.key, action = self.kind.as_str(), "Rollback after unmount ignored");
            return MutationOutcome::Detached;
        }

        let mut conflicts = 0usize;
        {
            let mut store = self.store.write();
            for snapshot in self.snapshots.drain(..) {
                store.set_pending(&snapshot.entity_id, false);

                let restorable = match snapshot.applied {
                    Applied::Updated(version) => {
                        store.get(&snapshot.entity_id).map(|e| e.version()) == Some(version)
                    }
                    Applied::Removed(version) => {
                        store.removal_version(&snapshot.entity_id) == Some(version)
                    }
                };

                if !restorable {
                    conflicts += 1;
                    info!(
                        entity_id = %snapshot.entity_id,
                        action = self.kind.as_str(),
                        "Rollback skipped: entity changed while request was in flight"
                    );
                    continue;
                }

                match snapshot.applied {
                    Applied::Updated(_) => {
                        store.upsert(snapshot.before);
                    }
                    Applied::Removed(_) => {
                        store.restore(snapshot.before, snapshot.position);
                    }
                }
            }
        }

        warn!(
            key = %self.key,
            action = self.kind.as_str(),
            error = %error,
            conflicts,
            "Optimistic mutation failed"
        );

        if conflicts > 0 {
            MutationOutcome::Conflict(error)
        } else {
            MutationOutcome::RolledBack(error)
        }
    }

    /// Commit or roll back depending on the RPC result
    pub fn settle<R, M>(self, result: Result<Option<R>>, merge: M) -> MutationOutcome
    where
        M: FnOnce(&mut E, R),
    {
        match result {
            Ok(Some(data)) => {
                let mut once = Some((merge, data));
                self.commit_with(|entity| {
                    if let Some((merge, data)) = once.take() {
                        merge(entity, data);
                    }
                })
            }
            Ok(None) => self.commit(),
            Err(error) => self.rollback(error),
        }
    }
}

impl<E: Entity> Drop for PendingMutation<E> {
    fn drop(&mut self) {
        if !self.settled {
            let mut store = self.store.write();
            for snapshot in &self.snapshots {
                store.set_pending(&snapshot.entity_id, false);
            }
        }
        self.permit.take();
    }
}

/// Engine bound to one store and one view
pub struct OptimisticEngine<E: Entity> {
    store: StoreHandle<E>,
    limiter: Arc<RateLimiter>,
    liveness: Liveness,
    rpc_timeout: Duration,
}

impl<E: Entity> Clone for OptimisticEngine<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            limiter: Arc::clone(&self.limiter),
            liveness: self.liveness.clone(),
            rpc_timeout: self.rpc_timeout,
        }
    }
}

impl<E: Entity> OptimisticEngine<E> {
    pub fn new(
        store: StoreHandle<E>,
        limiter: Arc<RateLimiter>,
        liveness: Liveness,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            store,
            limiter,
            liveness,
            rpc_timeout,
        }
    }

    pub fn store(&self) -> &StoreHandle<E> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    fn pending(&self, key: &str, kind: ActionKind, permit: Permit, snapshots: Vec<Snapshot<E>>) -> PendingMutation<E> {
        PendingMutation {
            store: self.store.clone(),
            liveness: self.liveness.clone(),
            kind,
            key: key.to_string(),
            snapshots,
            permit: Some(permit),
            settled: false,
        }
    }

    // =========================================================================
    // Tentative writes
    // =========================================================================

    /// Apply `transition` to one entity now. Returns the pending mutation
    /// and whatever the transition computed (typically the RPC argument).
    pub fn apply_optimistic<T, F>(
        &self,
        entity_id: &str,
        kind: ActionKind,
        disabled: bool,
        transition: F,
    ) -> std::result::Result<(PendingMutation<E>, T), SkipReason>
    where
        F: FnOnce(&mut E) -> T,
    {
        if disabled {
            return Err(SkipReason::Disabled);
        }

        let mut store = self.store.write();
        let (before, position) = match (store.get(entity_id), store.position(entity_id)) {
            (Some(entity), Some(position)) => (entity.clone(), position),
            _ => return Err(SkipReason::Missing),
        };
        let permit = self
            .limiter
            .try_acquire(entity_id, kind)
            .ok_or(SkipReason::InFlight)?;

        let mut output = None;
        let version = store
            .update(entity_id, |entity| output = Some(transition(entity)))
            .ok_or(SkipReason::Missing)?;
        let output = output.ok_or(SkipReason::Missing)?;
        store.set_pending(entity_id, true);
        drop(store);

        debug!(entity_id, action = kind.as_str(), version, "Applied optimistic update");

        let snapshot = Snapshot {
            entity_id: entity_id.to_string(),
            before,
            position,
            applied: Applied::Updated(version),
        };
        Ok((self.pending(entity_id, kind, permit, vec![snapshot]), output))
    }

    /// Remove one entity now (delete, leave, ban)
    pub fn apply_removal(
        &self,
        entity_id: &str,
        kind: ActionKind,
        disabled: bool,
    ) -> std::result::Result<PendingMutation<E>, SkipReason> {
        if disabled {
            return Err(SkipReason::Disabled);
        }

        let mut store = self.store.write();
        let position = store.position(entity_id).ok_or(SkipReason::Missing)?;
        let permit = self
            .limiter
            .try_acquire(entity_id, kind)
            .ok_or(SkipReason::InFlight)?;

        let before = store.remove(entity_id).ok_or(SkipReason::Missing)?;
        let version = store.removal_version(entity_id).ok_or(SkipReason::Missing)?;
        // keeps the tombstone pinned until the server answers
        store.set_pending(entity_id, true);
        drop(store);

        debug!(entity_id, action = kind.as_str(), version, "Applied optimistic removal");

        let snapshot = Snapshot {
            entity_id: entity_id.to_string(),
            before,
            position,
            applied: Applied::Removed(version),
        };
        Ok(self.pending(entity_id, kind, permit, vec![snapshot]))
    }

    /// Apply `transition` to every entity matching `select`, as one
    /// mutation guarded by `batch_key`. Each entity keeps its own snapshot,
    /// so a failed batch only reverts the entities nothing else touched.
    pub fn apply_batch<P, F>(
        &self,
        batch_key: &str,
        kind: ActionKind,
        disabled: bool,
        select: P,
        mut transition: F,
    ) -> std::result::Result<PendingMutation<E>, SkipReason>
    where
        P: Fn(&E) -> bool,
        F: FnMut(&mut E),
    {
        if disabled {
            return Err(SkipReason::Disabled);
        }

        let mut store = self.store.write();
        let targets: Vec<(E, usize)> = store
            .items()
            .enumerate()
            .filter(|(_, e)| select(e))
            .map(|(position, e)| (e.clone(), position))
            .collect();
        if targets.is_empty() {
            return Err(SkipReason::Missing);
        }

        let permit = self
            .limiter
            .try_acquire(batch_key, kind)
            .ok_or(SkipReason::InFlight)?;

        let mut snapshots = Vec::with_capacity(targets.len());
        for (before, position) in targets {
            let entity_id = before.id().to_string();
            if let Some(version) = store.update(&entity_id, &mut transition) {
                store.set_pending(&entity_id, true);
                snapshots.push(Snapshot {
                    entity_id,
                    before,
                    position,
                    applied: Applied::Updated(version),
                });
            }
        }
        drop(store);

        debug!(batch_key, action = kind.as_str(), count = snapshots.len(), "Applied optimistic batch");
        Ok(self.pending(batch_key, kind, permit, snapshots))
    }

    // =========================================================================
    // Full round trips
    // =========================================================================

    /// Await an RPC under the client-side deadline
    pub async fn call<R, Fut>(&self, rpc: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        tokio::time::timeout(self.rpc_timeout, rpc)
            .await
            .unwrap_or_else(|_| Err(SyncError::Timeout(self.rpc_timeout)))
    }

    /// Transition, RPC, then commit (merging server data) or roll back
    pub async fn run<T, R, F, Fut, M, Tr>(
        &self,
        entity_id: &str,
        kind: ActionKind,
        disabled: bool,
        transition: Tr,
        rpc: F,
        merge: M,
    ) -> MutationOutcome
    where
        Tr: FnOnce(&mut E) -> T,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<Option<R>>>,
        M: FnOnce(&mut E, R),
    {
        let (pending, input) = match self.apply_optimistic(entity_id, kind, disabled, transition) {
            Ok(applied) => applied,
            Err(reason) => return MutationOutcome::Skipped(reason),
        };
        let result = self.call(rpc(input)).await;
        pending.settle(result, merge)
    }

    /// Optimistic removal, RPC, then commit or restore
    pub async fn run_removal<R, Fut>(
        &self,
        entity_id: &str,
        kind: ActionKind,
        disabled: bool,
        rpc: Fut,
    ) -> MutationOutcome
    where
        Fut: Future<Output = Result<Option<R>>>,
    {
        let pending = match self.apply_removal(entity_id, kind, disabled) {
            Ok(pending) => pending,
            Err(reason) => return MutationOutcome::Skipped(reason),
        };
        match self.call(rpc).await {
            Ok(_) => pending.commit(),
            Err(error) => pending.rollback(error),
        }
    }
}

impl<E: Entity + Votable> OptimisticEngine<E> {
    /// Click an arrow on a post or comment. Clicking the active direction
    /// removes the vote; the other one switches it in a single step. A
    /// logged-out viewer (`voter` is `None`) is disabled.
    pub async fn vote<F, Fut>(
        &self,
        entity_id: &str,
        direction: VoteDirection,
        voter: Option<&VoterContext>,
        rpc: F,
    ) -> MutationOutcome
    where
        F: FnOnce(VoteAction) -> Fut,
        Fut: Future<Output = Result<Option<VotePatch>>>,
    {
        let weight = voter.map_or(1.0, VoterContext::weight);
        let viewer_id = voter.map(|v| v.user_id.clone()).unwrap_or_default();

        self.run(
            entity_id,
            ActionKind::Vote,
            voter.is_none(),
            |entity| entity.click_vote(direction, weight),
            rpc,
            |entity, receipt: VotePatch| entity.merge_votes(&receipt, &viewer_id),
        )
        .await
    }
}
