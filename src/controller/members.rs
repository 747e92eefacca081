//! Community member directory: paging, role changes, removals and bans

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::ErrorSlot;
use crate::api::{page_result, CommunityApi, MemberPage, MemberQuery, MemberSort};
use crate::config::SyncConfig;
use crate::engine::{MutationOutcome, OptimisticEngine, SkipReason};
use crate::error::Result;
use crate::lifecycle::{Liveness, ViewMount};
use crate::model::{Member, MemberRole};
use crate::rate_limit::ActionKind;
use crate::reconcile::{MemberReconciler, MemberScope};
use crate::store::StoreHandle;
use crate::transport::EventBus;

#[derive(Debug, Clone, Default, PartialEq)]
struct MemberFilter {
    search: Option<String>,
    role: Option<MemberRole>,
}

pub struct MemberDirectory {
    api: Arc<dyn CommunityApi>,
    engine: OptimisticEngine<Member>,
    reconciler: MemberReconciler,
    /// Role of the viewer in this community; gates every mutation
    actor_role: MemberRole,
    filter: RwLock<MemberFilter>,
    page_size: u32,
    errors: ErrorSlot,
}

impl MemberDirectory {
    pub fn new(
        api: Arc<dyn CommunityApi>,
        config: &SyncConfig,
        community_id: impl Into<String>,
        actor_role: MemberRole,
    ) -> Self {
        let store = StoreHandle::new();
        let engine = OptimisticEngine::new(
            store.clone(),
            Arc::new(config.rate_limiter()),
            Liveness::new(),
            config.rpc_timeout(),
        );
        let reconciler = MemberReconciler::new(store, MemberScope::new(community_id, config.member_sort));

        Self {
            api,
            engine,
            reconciler,
            actor_role,
            filter: RwLock::new(MemberFilter::default()),
            page_size: config.page_size,
            errors: ErrorSlot::default(),
        }
    }

    pub fn store(&self) -> &StoreHandle<Member> {
        self.engine.store()
    }

    pub fn members(&self) -> Vec<Member> {
        self.store().snapshot()
    }

    pub fn member(&self, user_id: &str) -> Option<Member> {
        self.store().get(user_id)
    }

    pub fn community_id(&self) -> String {
        self.reconciler.scope().community_id
    }

    pub fn actor_role(&self) -> MemberRole {
        self.actor_role
    }

    pub fn has_more(&self) -> bool {
        self.store().read().pagination().has_more()
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.get()
    }

    pub fn dismiss_error(&self) {
        self.errors.dismiss();
    }

    /// Whether the viewer may change `user_id`'s role to `new_role`
    pub fn can_assign(&self, user_id: &str, new_role: MemberRole) -> bool {
        self.member(user_id).map_or(false, |m| {
            m.role != new_role && self.actor_role.can_assign(m.role, new_role)
        })
    }

    /// Whether the viewer may remove or ban `user_id`
    pub fn can_manage(&self, user_id: &str) -> bool {
        self.member(user_id)
            .map_or(false, |m| self.actor_role.can_manage(m.role))
    }

    // =========================================================================
    // Paging
    // =========================================================================

    async fn fetch(&self, page: u32) -> Result<(Vec<Member>, bool)> {
        let scope = self.reconciler.scope();
        let filter = self.filter.read().unwrap_or_else(PoisonError::into_inner).clone();
        let query = MemberQuery {
            page,
            limit: self.page_size,
            sort: scope.sort,
            search: filter.search,
            role: filter.role,
        };
        let MemberPage {
            success,
            error,
            members,
            pagination,
        } = self
            .engine
            .call(self.api.get_community_members(&scope.community_id, &query))
            .await?;
        page_result(success, error)?;
        Ok((members, pagination.has_more))
    }

    pub async fn load_more(&self) -> Result<usize> {
        let (page, generation) = {
            let mut store = self.store().write();
            match store.begin_load() {
                Some(page) => (page, store.load_generation()),
                None => return Ok(0),
            }
        };

        let result = self.fetch(page).await;
        if !self.engine.liveness().is_alive() {
            return Ok(0);
        }

        let mut store = self.store().write();
        if store.load_generation() != generation {
            debug!(page, "Discarded member page fetched under a previous query");
            return Ok(0);
        }
        match result {
            Ok((members, has_more)) => Ok(store.append_page(members, has_more)),
            Err(e) => {
                store.abort_load();
                warn!(page, error = %e, "Member page load failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    pub async fn refresh(&self) -> Result<usize> {
        let generation = {
            let mut store = self.store().write();
            if !store.begin_reload() {
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
            debug!("Discarded member refresh superseded by a newer query");
            return Ok(0);
        }
        match result {
            Ok((members, has_more)) => {
                let count = members.len();
                store.replace_all(members, has_more);
                Ok(count)
            }
            Err(e) => {
                store.abort_load();
                warn!(error = %e, "Member refresh failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    /// Query changed: disown any fetch in flight and reload page one
    async fn reload(&self) -> Result<usize> {
        self.store().write().invalidate_loads();
        self.refresh().await
    }

    pub async fn set_sort(&self, sort: MemberSort) -> Result<usize> {
        let mut scope = self.reconciler.scope();
        if scope.sort == sort {
            return Ok(0);
        }
        scope.sort = sort;
        self.reconciler.set_scope(scope);
        self.reload().await
    }

    /// Narrow the list by username search and/or role, then reload
    pub async fn set_filter(&self, search: Option<String>, role: Option<MemberRole>) -> Result<usize> {
        let filter = MemberFilter { search, role };
        {
            let mut current = self.filter.write().unwrap_or_else(PoisonError::into_inner);
            if *current == filter {
                return Ok(0);
            }
            *current = filter;
        }
        self.reload().await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn update_role(&self, user_id: &str, new_role: MemberRole) -> MutationOutcome {
        if self.member(user_id).is_none() {
            return MutationOutcome::Skipped(SkipReason::Missing);
        }
        let community_id = self.community_id();
        let disabled = !self.can_assign(user_id, new_role);

        let outcome = self
            .engine
            .run(
                user_id,
                ActionKind::MemberRole,
                disabled,
                |member| {
                    member.role = new_role;
                },
                |()| async move {
                    self.api
                        .update_member_role(&community_id, user_id, new_role)
                        .await?
                        .into_result()
                },
                |member, server: Member| {
                    member.role = server.role;
                    member.username = server.username;
                    member.post_count = server.post_count;
                    member.karma = server.karma;
                },
            )
            .await;

        if outcome.is_committed() {
            info!(user_id, role = new_role.as_str(), "Member role updated");
        }
        self.errors.record(&outcome);
        outcome
    }

    pub async fn remove(&self, user_id: &str, reason: Option<&str>) -> MutationOutcome {
        if self.member(user_id).is_none() {
            return MutationOutcome::Skipped(SkipReason::Missing);
        }
        let community_id = self.community_id();
        let disabled = !self.can_manage(user_id);
        let rpc = async {
            self.api
                .remove_member(&community_id, user_id, reason)
                .await?
                .into_result()
        };

        let outcome = self
            .engine
            .run_removal(user_id, ActionKind::MemberRemove, disabled, rpc)
            .await;
        debug!(user_id, outcome = ?outcome, "Member removal settled");
        self.errors.record(&outcome);
        outcome
    }

    pub async fn ban(&self, user_id: &str, reason: Option<&str>) -> MutationOutcome {
        if self.member(user_id).is_none() {
            return MutationOutcome::Skipped(SkipReason::Missing);
        }
        let community_id = self.community_id();
        let disabled = !self.can_manage(user_id);
        let rpc = async {
            self.api
                .ban_member(&community_id, user_id, reason)
                .await?
                .into_result()
        };

        let outcome = self
            .engine
            .run_removal(user_id, ActionKind::MemberBan, disabled, rpc)
            .await;
        debug!(user_id, outcome = ?outcome, "Member ban settled");
        self.errors.record(&outcome);
        outcome
    }

    pub fn mount(&self, bus: &dyn EventBus) -> ViewMount {
        let mut mount = ViewMount::new("members", self.engine.liveness().clone());
        mount.extend(self.reconciler.attach(bus));
        mount
    }
}
