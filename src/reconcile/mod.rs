//! Push event reconcilers
//!
//! The second write path into the entity store. Events are applied in
//! arrival order, each one as a single synchronous store write, and are
//! never replayed: a full fetch is the resync point. Malformed events are
//! logged and dropped.

mod comments;
mod feed;
mod members;

pub use comments::CommentReconciler;
pub use feed::{FeedReconciler, FeedScope};
pub use members::{MemberReconciler, MemberScope};

/// What a push event did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// New entity inserted
    Inserted,
    /// Existing entity rewritten
    Updated,
    /// Entity removed (or already gone)
    Removed,
    /// Event belongs to a different scope
    OutOfScope,
    /// In scope but nothing to do (unknown id, duplicate, wrong ordering)
    Ignored,
}

impl Applied {
    pub fn changed_store(self) -> bool {
        matches!(self, Applied::Inserted | Applied::Updated | Applied::Removed)
    }
}
