//! Comment section of one post: threaded display, votes and live comment
//! events

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::ErrorSlot;
use crate::api::{page_result, CommentPage, CommunityApi};
use crate::config::SyncConfig;
use crate::engine::{MutationOutcome, OptimisticEngine};
use crate::error::Result;
use crate::lifecycle::{Liveness, ViewMount};
use crate::model::{Comment, VoteDirection};
use crate::reconcile::CommentReconciler;
use crate::store::StoreHandle;
use crate::thread::{CommentThread, SharedThread, ThreadItem};
use crate::transport::EventBus;
use crate::weight::VoterContext;

/// One rendered row of the comment section
#[derive(Debug, Clone, PartialEq)]
pub enum CommentRow {
    Comment { comment: Comment, depth: usize },
    /// Link to the replies cut off below `parent_id`
    ContinueThread { parent_id: String, depth: usize, hidden: usize },
}

pub struct CommentSection {
    api: Arc<dyn CommunityApi>,
    engine: OptimisticEngine<Comment>,
    thread: SharedThread,
    reconciler: CommentReconciler,
    post_id: String,
    voter: Option<VoterContext>,
    max_depth: usize,
    errors: ErrorSlot,
}

impl CommentSection {
    pub fn new(
        api: Arc<dyn CommunityApi>,
        config: &SyncConfig,
        post_id: impl Into<String>,
        voter: Option<VoterContext>,
    ) -> Self {
        let post_id = post_id.into();
        let store = StoreHandle::new();
        let thread: SharedThread = Arc::new(RwLock::new(CommentThread::new()));
        let engine = OptimisticEngine::new(
            store.clone(),
            Arc::new(config.rate_limiter()),
            Liveness::new(),
            config.rpc_timeout(),
        );
        let viewer_id = voter.as_ref().map(|v| v.user_id.as_str()).unwrap_or_default();
        let reconciler = CommentReconciler::new(store, Arc::clone(&thread), &post_id, viewer_id);

        Self {
            api,
            engine,
            thread,
            reconciler,
            post_id,
            voter,
            max_depth: config.max_thread_depth,
            errors: ErrorSlot::default(),
        }
    }

    pub fn store(&self) -> &StoreHandle<Comment> {
        self.engine.store()
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn comment(&self, comment_id: &str) -> Option<Comment> {
        self.store().get(comment_id)
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.get()
    }

    pub fn dismiss_error(&self) {
        self.errors.dismiss();
    }

    /// The thread in display order, cut at the configured depth
    pub fn rows(&self) -> Vec<CommentRow> {
        let thread = self.thread.read().unwrap_or_else(PoisonError::into_inner);
        self.resolve(&thread.visible(self.max_depth))
    }

    /// The replies behind a "continue thread" link, re-based at depth 0
    pub fn rows_from(&self, comment_id: &str) -> Vec<CommentRow> {
        let thread = self.thread.read().unwrap_or_else(PoisonError::into_inner);
        self.resolve(&thread.visible_from(comment_id, self.max_depth))
    }

    fn resolve(&self, items: &[ThreadItem<'_>]) -> Vec<CommentRow> {
        let store = self.store().read();
        items
            .iter()
            .filter_map(|item| match *item {
                ThreadItem::Comment { id, depth } => store.get(id).map(|comment| CommentRow::Comment {
                    comment: comment.clone(),
                    depth,
                }),
                ThreadItem::ContinueThread {
                    parent_id,
                    depth,
                    hidden,
                } => Some(CommentRow::ContinueThread {
                    parent_id: parent_id.to_string(),
                    depth,
                    hidden,
                }),
            })
            .collect()
    }

    /// Fetch every comment of the post and rebuild the thread
    pub async fn load(&self) -> Result<usize> {
        let generation = {
            let mut store = self.store().write();
            if !store.begin_reload() {
                return Ok(0);
            }
            store.load_generation()
        };

        let result = self.fetch().await;
        if !self.engine.liveness().is_alive() {
            return Ok(0);
        }

        let mut thread = self.thread.write().unwrap_or_else(PoisonError::into_inner);
        let mut store = self.store().write();
        if store.load_generation() != generation {
            return Ok(0);
        }
        match result {
            Ok(comments) => {
                store.replace_all(comments, false);
                thread.clear();
                for comment in store.items() {
                    thread.insert(&comment.id, comment.parent_id.as_deref());
                }
                debug!(
                    post_id = %self.post_id,
                    count = store.len(),
                    orphans = thread.orphan_count(),
                    "Comments loaded"
                );
                Ok(store.len())
            }
            Err(e) => {
                store.abort_load();
                warn!(post_id = %self.post_id, error = %e, "Comment load failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<Comment>> {
        let CommentPage {
            success,
            error,
            comments,
        } = self.engine.call(self.api.get_comments(&self.post_id)).await?;
        page_result(success, error)?;
        Ok(comments)
    }

    pub async fn vote(&self, comment_id: &str, direction: VoteDirection) -> MutationOutcome {
        let outcome = self
            .engine
            .vote(comment_id, direction, self.voter.as_ref(), |action| async move {
                self.api.vote_comment(comment_id, action).await?.into_result()
            })
            .await;

        self.errors.record(&outcome);
        outcome
    }

    pub fn mount(&self, bus: &dyn EventBus) -> ViewMount {
        let mut mount = ViewMount::new("comments", self.engine.liveness().clone());
        mount.extend(self.reconciler.attach(bus));
        mount
    }
}
