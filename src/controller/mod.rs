//! Per-view controllers
//!
//! A controller owns one view's store, optimistic engine, reconciler and
//! "load more" cursor. Its `mount` hands back a [`ViewMount`](crate::ViewMount);
//! dropping that unsubscribes from the bus and turns every late RPC
//! completion into a no-op.

mod comments;
mod feed;
mod members;
mod notifications;

pub use comments::{CommentRow, CommentSection};
pub use feed::FeedController;
pub use members::MemberDirectory;
pub use notifications::{DesktopNotifier, NotificationCenter};

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::engine::MutationOutcome;
use crate::error::SyncError;

/// Dismissible user-facing error of one view
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    message: Arc<Mutex<Option<String>>>,
}

impl ErrorSlot {
    pub fn get(&self) -> Option<String> {
        self.message.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn dismiss(&self) {
        self.message.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub(crate) fn set(&self, error: &SyncError) {
        *self.message.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.user_message());
    }

    /// Surface a rolled-back mutation. Conflicts stay silent: the view
    /// already shows the newer state.
    pub(crate) fn record(&self, outcome: &MutationOutcome) {
        match outcome {
            MutationOutcome::RolledBack(error) => self.set(error),
            MutationOutcome::Conflict(error) => {
                debug!(error = %error, "Mutation failed behind a newer update; not surfaced");
            }
            _ => {}
        }
    }
}
