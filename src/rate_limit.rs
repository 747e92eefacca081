//! Per-(entity, action) mutation guard
//!
//! A key is blocked while its mutation is in flight and for a cooldown
//! window counted from the moment it was acquired. Blocked attempts are
//! dropped, never queued: these are idempotent user toggles, so the next
//! deliberate click is the retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Kind of optimistic action, part of the limiter key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Vote,
    Save,
    MemberRole,
    MemberRemove,
    MemberBan,
    NotificationRead,
    NotificationReadAll,
    NotificationDelete,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Vote => "vote",
            ActionKind::Save => "save",
            ActionKind::MemberRole => "member_role",
            ActionKind::MemberRemove => "member_remove",
            ActionKind::MemberBan => "member_ban",
            ActionKind::NotificationRead => "notification_read",
            ActionKind::NotificationReadAll => "notification_read_all",
            ActionKind::NotificationDelete => "notification_delete",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    acquired_at: Instant,
    in_flight: bool,
}

type SlotKey = (String, ActionKind);

/// Acquisitions between sweeps of cooled-down slots
const PRUNE_EVERY: usize = 64;

/// Cooldown guard shared by every mutation of one view
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<ActionKind, Duration>,
    default_window: Duration,
    slots: DashMap<SlotKey, Slot>,
    acquisitions: AtomicUsize,
}

impl RateLimiter {
    pub fn new(default_window: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            default_window,
            slots: DashMap::new(),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Override the window for one action kind
    pub fn with_window(mut self, kind: ActionKind, window: Duration) -> Self {
        self.windows.insert(kind, window);
        self
    }

    pub fn window_for(&self, kind: ActionKind) -> Duration {
        self.windows.get(&kind).copied().unwrap_or(self.default_window)
    }

    /// Try to claim `(entity_id, kind)`. `None` means the caller must do
    /// nothing: no state change, no RPC.
    pub fn try_acquire(self: &Arc<Self>, entity_id: &str, kind: ActionKind) -> Option<Permit> {
        if (self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY == 0 {
            self.prune();
        }

        let now = Instant::now();
        let window = self.window_for(kind);
        let key = (entity_id.to_string(), kind);

        // Entry API holds the shard lock across check-and-set
        let mut fresh = false;
        let mut slot = self.slots.entry(key.clone()).or_insert_with(|| {
            fresh = true;
            Slot {
                acquired_at: now,
                in_flight: false,
            }
        });

        let cooled = !slot.in_flight && now.duration_since(slot.acquired_at) >= window;

        if !(fresh || cooled) {
            debug!(
                entity_id,
                action = kind.as_str(),
                in_flight = slot.in_flight,
                "Dropped mutation: key is busy or cooling down"
            );
            return None;
        }

        *slot = Slot {
            acquired_at: now,
            in_flight: true,
        };
        drop(slot);

        Some(Permit {
            limiter: Arc::clone(self),
            key: Some(key),
        })
    }

    /// Whether `(entity_id, kind)` would currently be refused
    pub fn is_blocked(&self, entity_id: &str, kind: ActionKind) -> bool {
        let key = (entity_id.to_string(), kind);
        match self.slots.get(&key) {
            Some(slot) => {
                slot.in_flight || Instant::now().duration_since(slot.acquired_at) < self.window_for(kind)
            }
            None => false,
        }
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.slots.len()
    }

    /// Drop slots whose cooldown is over
    pub fn prune(&self) {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|(_, kind), slot| {
            slot.in_flight || now.duration_since(slot.acquired_at) < self.window_for(*kind)
        });
        debug!(pruned = before.saturating_sub(self.slots.len()), "Pruned rate limiter slots");
    }

    /// End the in-flight phase. A slot whose window already ran out while
    /// the request was outstanding is forgotten on the spot.
    fn release(&self, key: &SlotKey) {
        let window = self.window_for(key.1);
        let now = Instant::now();
        let expired = self
            .slots
            .remove_if(key, |_, slot| now.duration_since(slot.acquired_at) >= window);
        if expired.is_some() {
            return;
        }
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.in_flight = false;
        }
    }
}

/// Proof of an acquired key; released when dropped, whatever the outcome
#[derive(Debug)]
pub struct Permit {
    limiter: Arc<RateLimiter>,
    key: Option<SlotKey>,
}

impl Permit {
    pub fn entity_id(&self) -> &str {
        self.key.as_ref().map(|(id, _)| id.as_str()).unwrap_or_default()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.limiter.release(&key);
        }
    }
}
