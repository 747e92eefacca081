//! Post feed: paging, votes, saves and live post events

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ErrorSlot;
use crate::api::{page_result, CommunityApi, FeedSort, PostPage, PostQuery, TimeRange};
use crate::config::SyncConfig;
use crate::engine::{MutationOutcome, OptimisticEngine};
use crate::error::Result;
use crate::lifecycle::{Liveness, ViewMount};
use crate::model::{Post, VoteDirection};
use crate::rate_limit::ActionKind;
use crate::reconcile::{FeedReconciler, FeedScope};
use crate::store::StoreHandle;
use crate::transport::EventBus;
use crate::weight::VoterContext;

pub struct FeedController {
    api: Arc<dyn CommunityApi>,
    engine: OptimisticEngine<Post>,
    reconciler: FeedReconciler,
    /// `None` while logged out; every mutation is then disabled
    voter: Option<VoterContext>,
    page_size: u32,
    time_range: TimeRange,
    errors: ErrorSlot,
}

impl FeedController {
    pub fn new(
        api: Arc<dyn CommunityApi>,
        config: &SyncConfig,
        scope: FeedScope,
        voter: Option<VoterContext>,
    ) -> Self {
        let store = StoreHandle::new();
        let engine = OptimisticEngine::new(
            store.clone(),
            Arc::new(config.rate_limiter()),
            Liveness::new(),
            config.rpc_timeout(),
        );
        let viewer_id = voter.as_ref().map(|v| v.user_id.as_str()).unwrap_or_default();
        let reconciler = FeedReconciler::new(store, scope, viewer_id);

        Self {
            api,
            engine,
            reconciler,
            voter,
            page_size: config.page_size,
            time_range: TimeRange::default(),
            errors: ErrorSlot::default(),
        }
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    // =========================================================================
    // Read projections
    // =========================================================================

    pub fn store(&self) -> &StoreHandle<Post> {
        self.engine.store()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.store().snapshot()
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.store().get(post_id)
    }

    pub fn scope(&self) -> FeedScope {
        self.reconciler.scope()
    }

    pub fn has_more(&self) -> bool {
        self.store().read().pagination().has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.store().read().pagination().is_loading()
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.get()
    }

    pub fn dismiss_error(&self) {
        self.errors.dismiss();
    }

    // =========================================================================
    // Paging
    // =========================================================================

    async fn fetch(&self, page: u32) -> Result<(Vec<Post>, bool)> {
        let scope = self.reconciler.scope();
        let query = PostQuery {
            page,
            limit: self.page_size,
            sort: scope.sort,
            time_range: self.time_range,
            community_id: scope.community_id,
        };
        let PostPage {
            success,
            error,
            posts,
            pagination,
        } = self.engine.call(self.api.get_posts(&query)).await?;
        page_result(success, error)?;
        Ok((posts, pagination.has_more))
    }

    /// Fetch the next page. Returns the number of new posts; `Ok(0)` when a
    /// load is already outstanding, the feed is exhausted, or the sort
    /// changed while the page was in flight.
    pub async fn load_more(&self) -> Result<usize> {
        let (page, generation) = {
            let mut store = self.store().write();
            match store.begin_load() {
                Some(page) => (page, store.load_generation()),
                None => {
                    debug!("Load more suppressed");
                    return Ok(0);
                }
            }
        };

        let result = self.fetch(page).await;
        if !self.engine.liveness().is_alive() {
            return Ok(0);
        }

        let mut store = self.store().write();
        if store.load_generation() != generation {
            debug!(page, "Discarded feed page fetched under a previous sort");
            return Ok(0);
        }
        match result {
            Ok((posts, has_more)) => {
                let added = store.append_page(posts, has_more);
                debug!(page, added, has_more, "Feed page loaded");
                Ok(added)
            }
            Err(e) => {
                store.abort_load();
                warn!(page, error = %e, "Feed page load failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    /// Refetch the first page and replace the list with it
    pub async fn refresh(&self) -> Result<usize> {
        let generation = {
            let mut store = self.store().write();
            if !store.begin_reload() {
                debug!("Refresh suppressed; a load is outstanding");
                return Ok(0);
            }
            store.load_generation()
        };

        let result = self.fetch(1).await;
        if !self.engine.liveness().is_alive() {
            return Ok(0);
        }

        let mut store = self.store().write();
        if store.load_generation() != generation {
            debug!("Discarded feed refresh superseded by a newer one");
            return Ok(0);
        }
        match result {
            Ok((posts, has_more)) => {
                let count = posts.len();
                store.replace_all(posts, has_more);
                Ok(count)
            }
            Err(e) => {
                store.abort_load();
                warn!(error = %e, "Feed refresh failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    /// Switch ordering and reload from the first page. A page still in
    /// flight under the old ordering is dropped when it lands.
    pub async fn set_sort(&self, sort: FeedSort) -> Result<usize> {
        let mut scope = self.reconciler.scope();
        if scope.sort == sort {
            return Ok(0);
        }
        scope.sort = sort;
        info!(sort = ?sort, "Feed sort changed");
        self.reconciler.set_scope(scope);
        self.store().write().invalidate_loads();
        self.refresh().await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Click an arrow on a post. Clicking the active direction removes the
    /// vote; the other direction switches it in one step.
    pub async fn vote(&self, post_id: &str, direction: VoteDirection) -> MutationOutcome {
        let outcome = self
            .engine
            .vote(post_id, direction, self.voter.as_ref(), |action| async move {
                self.api.vote_post(post_id, action).await?.into_result()
            })
            .await;

        self.errors.record(&outcome);
        outcome
    }

    pub async fn toggle_save(&self, post_id: &str) -> MutationOutcome {
        let outcome = self
            .engine
            .run(
                post_id,
                ActionKind::Save,
                self.voter.is_none(),
                |post| {
                    post.saved = !post.saved;
                    post.saved
                },
                |saved| async move { self.api.save_post(post_id, saved).await?.into_result() },
                |_, ()| {},
            )
            .await;

        self.errors.record(&outcome);
        outcome
    }

    // =========================================================================
    // Lifetime
    // =========================================================================

    /// Subscribe to live post events. Drop the returned mount when the view
    /// goes away.
    pub fn mount(&self, bus: &dyn EventBus) -> ViewMount {
        let mut mount = ViewMount::new("feed", self.engine.liveness().clone());
        mount.extend(self.reconciler.attach(bus));
        mount
    }
}
