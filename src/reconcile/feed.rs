//! Feed reconciler: `community_post_*` events into the post store

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::Applied;
use crate::api::FeedSort;
use crate::events::{FeedEvent, FEED_EVENTS};
use crate::model::Post;
use crate::store::StoreHandle;
use crate::transport::{EventBus, PushMessage, Subscription};

/// Which posts the feed currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedScope {
    /// `None` for the cross-community home feed
    pub community_id: Option<String>,
    pub sort: FeedSort,
}

impl FeedScope {
    pub fn community(community_id: impl Into<String>, sort: FeedSort) -> Self {
        Self {
            community_id: Some(community_id.into()),
            sort,
        }
    }

    pub fn accepts(&self, community_id: &str) -> bool {
        self.community_id.as_deref().map_or(true, |c| c == community_id)
    }
}

#[derive(Clone)]
pub struct FeedReconciler {
    store: StoreHandle<Post>,
    scope: Arc<RwLock<FeedScope>>,
    viewer_id: Arc<str>,
}

impl FeedReconciler {
    pub fn new(store: StoreHandle<Post>, scope: FeedScope, viewer_id: &str) -> Self {
        Self {
            store,
            scope: Arc::new(RwLock::new(scope)),
            viewer_id: Arc::from(viewer_id),
        }
    }

    pub fn scope(&self) -> FeedScope {
        self.scope.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_scope(&self, scope: FeedScope) {
        *self.scope.write().unwrap_or_else(PoisonError::into_inner) = scope;
    }

    pub fn apply(&self, event: FeedEvent) -> Applied {
        let scope = self.scope();
        if !scope.accepts(event.community_id()) {
            debug!(
                community_id = event.community_id(),
                post_id = event.post_id(),
                "Dropped out-of-scope feed event"
            );
            return Applied::OutOfScope;
        }

        let mut store = self.store.write();
        match event {
            FeedEvent::Created { post, .. } => {
                // Under ranked sorts a new post would not sit at the head
                if !scope.sort.is_recency() {
                    return Applied::Ignored;
                }
                if store.prepend_one(post) {
                    Applied::Inserted
                } else {
                    Applied::Ignored
                }
            }
            FeedEvent::Updated { patch, .. } => match store.update(&patch.id, |p| patch.apply_to(p)) {
                Some(_) => Applied::Updated,
                None => Applied::Ignored,
            },
            FeedEvent::Deleted { post_id, .. } => {
                store.remove(&post_id);
                Applied::Removed
            }
            FeedEvent::VoteUpdated { post_id, patch, .. } => {
                let viewer = &*self.viewer_id;
                match store.update(&post_id, |p| patch.apply(&mut p.votes, viewer)) {
                    Some(_) => Applied::Updated,
                    None => Applied::Ignored,
                }
            }
        }
    }

    /// Parse and apply one bus message
    pub fn handle(&self, message: &PushMessage) -> Applied {
        match FeedEvent::parse(message) {
            Ok(Some(event)) => self.apply(event),
            Ok(None) => Applied::Ignored,
            Err(e) => {
                warn!(event = %message.event, error = %e, "Dropped malformed feed event");
                Applied::Ignored
            }
        }
    }

    /// Subscribe to every feed event
    pub fn attach(&self, bus: &dyn EventBus) -> Vec<Subscription> {
        FEED_EVENTS
            .iter()
            .map(|event| {
                let reconciler = self.clone();
                bus.subscribe(
                    event,
                    Arc::new(move |message: &PushMessage| {
                        reconciler.handle(message);
                    }),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PostPatch, VoteDirection, VotePatch};

    fn reconciler(sort: FeedSort) -> FeedReconciler {
        let store = StoreHandle::new();
        store.write().append_page(
            vec![
                Post::new("p1", "c1", "first").with_score(5.0),
                Post::new("p2", "c1", "second"),
            ],
            true,
        );
        FeedReconciler::new(store, FeedScope::community("c1", sort), "viewer")
    }

    #[test]
    fn test_created_prepends_only_under_recency_sort() {
        let newest = reconciler(FeedSort::New);
        let created = FeedEvent::Created {
            community_id: "c1".into(),
            post: Post::new("p9", "c1", "fresh"),
        };
        assert_eq!(newest.apply(created.clone()), Applied::Inserted);
        assert_eq!(newest.store.read().ids(), vec!["p9", "p1", "p2"]);
        assert_eq!(newest.apply(created.clone()), Applied::Ignored);

        let hot = reconciler(FeedSort::Hot);
        assert_eq!(hot.apply(created), Applied::Ignored);
        assert_eq!(hot.store.len(), 2);
    }

    #[test]
    fn test_other_community_is_dropped() {
        let r = reconciler(FeedSort::New);
        let event = FeedEvent::Created {
            community_id: "c2".into(),
            post: Post::new("x", "c2", "elsewhere"),
        };
        assert_eq!(r.apply(event), Applied::OutOfScope);
        assert!(r.store.get("x").is_none());
    }

    #[test]
    fn test_update_never_inserts_fragments() {
        let r = reconciler(FeedSort::New);
        let patch = PostPatch {
            id: "ghost".into(),
            title: Some("partial".into()),
            ..Default::default()
        };
        assert_eq!(
            r.apply(FeedEvent::Updated { community_id: "c1".into(), patch }),
            Applied::Ignored
        );
        assert!(r.store.get("ghost").is_none());
    }

    #[test]
    fn test_vote_update_leaves_content_alone() {
        let r = reconciler(FeedSort::Hot);
        r.store.write().update("p1", |p| p.title = "edited locally".into());

        let patch = VotePatch {
            score: Some(12.0),
            user_vote: Some(Some(VoteDirection::Down)),
            voter_id: Some("someone-else".into()),
            ..Default::default()
        };
        r.apply(FeedEvent::VoteUpdated {
            community_id: "c1".into(),
            post_id: "p1".into(),
            patch,
        });

        let post = r.store.get("p1").unwrap();
        assert_eq!(post.votes.score, 12.0);
        assert_eq!(post.votes.user_vote, None);
        assert_eq!(post.title, "edited locally");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let r = reconciler(FeedSort::Hot);
        let delete = FeedEvent::Deleted {
            community_id: "c1".into(),
            post_id: "p1".into(),
        };
        r.apply(delete.clone());
        r.apply(delete);
        assert_eq!(r.store.read().ids(), vec!["p2"]);
    }

    #[test]
    fn test_replayed_creation_after_delete_stays_deleted() {
        let r = reconciler(FeedSort::New);
        let created = FeedEvent::Created {
            community_id: "c1".into(),
            post: Post::new("p9", "c1", "fresh"),
        };
        r.apply(created.clone());
        r.apply(FeedEvent::Deleted {
            community_id: "c1".into(),
            post_id: "p9".into(),
        });

        assert_eq!(r.apply(created), Applied::Ignored);
        assert_eq!(r.store.read().ids(), vec!["p1", "p2"]);
    }

    #[test]
    fn test_home_feed_accepts_every_community() {
        let scope = FeedScope::default();
        assert!(scope.accepts("c1"));
        assert!(scope.accepts("c42"));
    }
}
