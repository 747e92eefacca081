//! Comment reconciler: `comment_*` events into one post's thread

use std::sync::{Arc, PoisonError};

use tracing::{debug, warn};

use super::Applied;
use crate::events::{CommentEvent, COMMENT_EVENTS};
use crate::model::{Comment, Votable};
use crate::store::StoreHandle;
use crate::thread::SharedThread;
use crate::transport::{EventBus, PushMessage, Subscription};

#[derive(Clone)]
pub struct CommentReconciler {
    store: StoreHandle<Comment>,
    thread: SharedThread,
    post_id: Arc<str>,
    viewer_id: Arc<str>,
}

impl CommentReconciler {
    pub fn new(store: StoreHandle<Comment>, thread: SharedThread, post_id: &str, viewer_id: &str) -> Self {
        Self {
            store,
            thread,
            post_id: Arc::from(post_id),
            viewer_id: Arc::from(viewer_id),
        }
    }

    pub fn apply(&self, event: CommentEvent) -> Applied {
        if event.post_id() != &*self.post_id {
            debug!(post_id = event.post_id(), "Dropped comment event for another post");
            return Applied::OutOfScope;
        }

        match event {
            CommentEvent::Created { comment, .. } => {
                let mut thread = self.thread.write().unwrap_or_else(PoisonError::into_inner);
                let mut store = self.store.write();
                let parent_gone = comment
                    .parent_id
                    .as_deref()
                    .is_some_and(|parent| store.removal_version(parent).is_some());
                if parent_gone {
                    return Applied::Ignored;
                }

                let id = comment.id.clone();
                let parent_id = comment.parent_id.clone();
                if !store.prepend_one(comment) {
                    return Applied::Ignored;
                }
                thread.insert(&id, parent_id.as_deref());
                Applied::Inserted
            }
            CommentEvent::Edited { comment_id, content, .. } => {
                match self.store.write().update(&comment_id, |c| c.content = content) {
                    Some(_) => Applied::Updated,
                    None => Applied::Ignored,
                }
            }
            CommentEvent::Deleted { comment_id, .. } => {
                let mut thread = self.thread.write().unwrap_or_else(PoisonError::into_inner);
                let mut store = self.store.write();
                for id in thread.remove(&comment_id) {
                    store.remove(&id);
                }
                Applied::Removed
            }
            CommentEvent::VoteUpdated { comment_id, patch, .. } => {
                let viewer = &*self.viewer_id;
                match self.store.write().update(&comment_id, |c| c.merge_votes(&patch, viewer)) {
                    Some(_) => Applied::Updated,
                    None => Applied::Ignored,
                }
            }
        }
    }

    pub fn handle(&self, message: &PushMessage) -> Applied {
        match CommentEvent::parse(message) {
            Ok(Some(event)) => self.apply(event),
            Ok(None) => Applied::Ignored,
            Err(e) => {
                warn!(event = %message.event, error = %e, "Dropped malformed comment event");
                Applied::Ignored
            }
        }
    }

    pub fn attach(&self, bus: &dyn EventBus) -> Vec<Subscription> {
        COMMENT_EVENTS
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
