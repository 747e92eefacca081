//! View lifetime tracking
//!
//! In-flight RPCs are never cancelled. When the owning view goes away their
//! completions must stop touching state, so every view carries a
//! [`Liveness`] token and a [`ViewMount`] that holds its push subscriptions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::transport::Subscription;

/// Shared "is the view still mounted" flag
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the view unmounted; irreversible
    pub fn end(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Push subscriptions of one mounted view.
///
/// Unmounting (explicitly or by drop) disposes every subscription and ends
/// the view's liveness.
pub struct ViewMount {
    name: String,
    liveness: Liveness,
    subscriptions: Vec<Subscription>,
}

impl ViewMount {
    pub fn new(name: impl Into<String>, liveness: Liveness) -> Self {
        Self {
            name: name.into(),
            liveness,
            subscriptions: Vec::new(),
        }
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn extend(&mut self, subscriptions: impl IntoIterator<Item = Subscription>) {
        self.subscriptions.extend(subscriptions);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_mounted(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn unmount(&mut self) {
        if !self.subscriptions.is_empty() {
            debug!(view = %self.name, count = self.subscriptions.len(), "Disposing view subscriptions");
        }
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
        self.liveness.end();
    }
}

impl Drop for ViewMount {
    fn drop(&mut self) {
        self.unmount();
    }
}
