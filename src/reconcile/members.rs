//! Member reconciler: `member_*` events into one community's member list

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::Applied;
use crate::api::MemberSort;
use crate::events::{MemberEvent, MEMBER_EVENTS};
use crate::model::Member;
use crate::store::StoreHandle;
use crate::transport::{EventBus, PushMessage, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub struct MemberScope {
    pub community_id: String,
    pub sort: MemberSort,
}

impl MemberScope {
    pub fn new(community_id: impl Into<String>, sort: MemberSort) -> Self {
        Self {
            community_id: community_id.into(),
            sort,
        }
    }
}

#[derive(Clone)]
pub struct MemberReconciler {
    store: StoreHandle<Member>,
    scope: Arc<RwLock<MemberScope>>,
}

impl MemberReconciler {
    pub fn new(store: StoreHandle<Member>, scope: MemberScope) -> Self {
        Self {
            store,
            scope: Arc::new(RwLock::new(scope)),
        }
    }

    pub fn scope(&self) -> MemberScope {
        self.scope.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_scope(&self, scope: MemberScope) {
        *self.scope.write().unwrap_or_else(PoisonError::into_inner) = scope;
    }

    pub fn apply(&self, event: MemberEvent) -> Applied {
        let scope = self.scope();
        if event.community_id() != scope.community_id {
            debug!(community_id = event.community_id(), "Dropped member event for another community");
            return Applied::OutOfScope;
        }

        let mut store = self.store.write();
        match event {
            MemberEvent::Joined { member, .. } => {
                if store.contains(&member.id) {
                    return Applied::Ignored;
                }
                if scope.sort == MemberSort::Newest {
                    // a join is a new membership, even for someone who left
                    store.forget_removal(&member.id);
                    store.prepend_one(member);
                    Applied::Inserted
                } else if !store.pagination().has_more() {
                    // Fully loaded list: the tail is a safe place
                    store.upsert(member);
                    Applied::Inserted
                } else {
                    // Would belong on a page not fetched yet
                    Applied::Ignored
                }
            }
            MemberEvent::RoleUpdated { user_id, role, .. } => match store.update(&user_id, |m| m.role = role) {
                Some(_) => Applied::Updated,
                None => Applied::Ignored,
            },
            MemberEvent::Left { user_id, .. } | MemberEvent::Banned { user_id, .. } => {
                store.remove(&user_id);
                Applied::Removed
            }
        }
    }

    pub fn handle(&self, message: &PushMessage) -> Applied {
        match MemberEvent::parse(message) {
            Ok(Some(event)) => self.apply(event),
            Ok(None) => Applied::Ignored,
            Err(e) => {
                warn!(event = %message.event, error = %e, "Dropped malformed member event");
                Applied::Ignored
            }
        }
    }

    pub fn attach(&self, bus: &dyn EventBus) -> Vec<Subscription> {
        MEMBER_EVENTS
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
