//! Notification stream consumer
//!
//! One deduplicated list, newest first. The unread badge is always derived
//! from that list; there is no separate counter to drift.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use super::ErrorSlot;
use crate::api::{page_result, CommunityApi, NotificationPage};
use crate::config::SyncConfig;
use crate::engine::{MutationOutcome, OptimisticEngine, SkipReason};
use crate::error::Result;
use crate::events::NOTIFICATION;
use crate::lifecycle::{Liveness, ViewMount};
use crate::model::{Notification, NotificationData};
use crate::rate_limit::ActionKind;
use crate::store::StoreHandle;
use crate::transport::{EventBus, PushMessage};

/// Limiter key shared by every "mark all read"
const MARK_ALL_KEY: &str = "*";

/// Host desktop notification facility
pub trait DesktopNotifier: Send + Sync {
    fn permission_granted(&self) -> bool;

    fn notify(&self, title: &str, body: &str);
}

#[derive(Clone)]
pub struct NotificationCenter {
    api: Arc<dyn CommunityApi>,
    engine: OptimisticEngine<Notification>,
    notifier: Option<Arc<dyn DesktopNotifier>>,
    desktop_title: Arc<str>,
    fallback_body: Arc<str>,
    page_size: u32,
    errors: ErrorSlot,
}

impl NotificationCenter {
    pub fn new(api: Arc<dyn CommunityApi>, config: &SyncConfig) -> Self {
        let engine = OptimisticEngine::new(
            StoreHandle::new(),
            Arc::new(config.rate_limiter()),
            Liveness::new(),
            config.rpc_timeout(),
        );

        Self {
            api,
            engine,
            notifier: None,
            desktop_title: Arc::from(config.desktop_title.as_str()),
            fallback_body: Arc::from(config.desktop_fallback_body.as_str()),
            page_size: config.page_size,
            errors: ErrorSlot::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DesktopNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &StoreHandle<Notification> {
        self.engine.store()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.store().snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.store().read().items().filter(|n| !n.read).count()
    }

    /// The "mark all read" control is only offered with something unread
    pub fn can_mark_all_read(&self) -> bool {
        self.unread_count() > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.get()
    }

    pub fn dismiss_error(&self) {
        self.errors.dismiss();
    }

    // =========================================================================
    // Inbound stream
    // =========================================================================

    /// Consume one raw stream message. Returns whether it was new.
    pub fn ingest(&self, raw: &str) -> bool {
        match Notification::parse(raw) {
            Ok(notification) => self.ingest_notification(notification),
            Err(e) => {
                warn!(error = %e, "Dropped malformed notification");
                false
            }
        }
    }

    pub fn ingest_notification(&self, notification: Notification) -> bool {
        if !self.engine.liveness().is_alive() {
            return false;
        }

        let kind = notification.kind();
        let body = match &notification.data {
            NotificationData::AwardReceived(award) => award.message.clone(),
            _ => None,
        };

        let id = notification.id.clone();
        if !self.store().write().prepend_one(notification) {
            trace!(notification_id = %id, "Duplicate notification ignored");
            return false;
        }
        debug!(notification_id = %id, kind = ?kind, "Notification received");

        if kind.is_desktop_notifiable() {
            if let Some(notifier) = self.notifier.as_ref().filter(|n| n.permission_granted()) {
                let body = body.unwrap_or_else(|| self.fallback_body.to_string());
                notifier.notify(&self.desktop_title, &body);
            }
        }
        true
    }

    /// Consume a raw message stream until it ends. Returns how many
    /// notifications were new.
    pub async fn pump<S>(&self, stream: S) -> usize
    where
        S: Stream<Item = String>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut added = 0;
        while let Some(raw) = stream.next().await {
            if self.ingest(&raw) {
                added += 1;
            }
        }
        added
    }

    /// Receive `notification` events from the bus
    pub fn mount(&self, bus: &dyn EventBus) -> ViewMount {
        let center = self.clone();
        let subscription = bus.subscribe(
            NOTIFICATION,
            Arc::new(move |message: &PushMessage| match Notification::from_value(message.payload.clone()) {
                Ok(notification) => {
                    center.ingest_notification(notification);
                }
                Err(e) => warn!(error = %e, "Dropped malformed notification"),
            }),
        );

        let mut mount = ViewMount::new("notifications", self.engine.liveness().clone());
        mount.push(subscription);
        mount
    }

    // =========================================================================
    // Paging
    // =========================================================================

    async fn fetch(&self, page: u32) -> Result<(Vec<Notification>, bool)> {
        let NotificationPage {
            success,
            error,
            notifications,
            pagination,
        } = self
            .engine
            .call(self.api.get_notifications(page, self.page_size))
            .await?;
        page_result(success, error)?;
        Ok((notifications, pagination.has_more))
    }

    /// Initial load; replaces whatever the list holds
    pub async fn load(&self) -> Result<usize> {
        if !self.store().write().begin_reload() {
            return Ok(0);
        }

        let result = self.fetch(1).await;
        if !self.engine.liveness().is_alive() {
            return Ok(0);
        }

        match result {
            Ok((notifications, has_more)) => {
                let count = notifications.len();
                self.store().write().replace_all(notifications, has_more);
                Ok(count)
            }
            Err(e) => {
                self.store().write().abort_load();
                warn!(error = %e, "Notification load failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    pub async fn load_more(&self) -> Result<usize> {
        let page = match self.store().write().begin_load() {
            Some(page) => page,
            None => return Ok(0),
        };

        let result = self.fetch(page).await;
        if !self.engine.liveness().is_alive() {
            return Ok(0);
        }

        match result {
            Ok((notifications, has_more)) => Ok(self.store().write().append_page(notifications, has_more)),
            Err(e) => {
                self.store().write().abort_load();
                warn!(page, error = %e, "Notification page load failed");
                self.errors.set(&e);
                Err(e)
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn mark_read(&self, notification_id: &str) -> MutationOutcome {
        let already_read = self.store().get(notification_id).map_or(false, |n| n.read);

        let outcome = self
            .engine
            .run(
                notification_id,
                ActionKind::NotificationRead,
                already_read,
                |n| n.read = true,
                |_| async move {
                    self.api
                        .mark_notification_read(notification_id)
                        .await?
                        .into_result()
                },
                |_, ()| {},
            )
            .await;

        self.errors.record(&outcome);
        outcome
    }

    pub async fn mark_all_read(&self) -> MutationOutcome {
        let pending = match self.engine.apply_batch(
            MARK_ALL_KEY,
            ActionKind::NotificationReadAll,
            !self.can_mark_all_read(),
            |n| !n.read,
            |n| n.read = true,
        ) {
            Ok(pending) => pending,
            // Nothing unread is the same as the control being hidden
            Err(SkipReason::Missing) => return MutationOutcome::Skipped(SkipReason::Disabled),
            Err(reason) => return MutationOutcome::Skipped(reason),
        };

        let result = self
            .engine
            .call(async { self.api.mark_all_notifications_read().await?.into_result() })
            .await;
        let outcome = pending.settle(result, |_, ()| {});

        self.errors.record(&outcome);
        outcome
    }

    pub async fn delete(&self, notification_id: &str) -> MutationOutcome {
        let rpc = async {
            self.api
                .delete_notification(notification_id)
                .await?
                .into_result()
        };
        let outcome = self
            .engine
            .run_removal(notification_id, ActionKind::NotificationDelete, false, rpc)
            .await;

        self.errors.record(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::api::{ApiResponse, CommentPage, MemberPage, MemberQuery, PageInfo, PostPage, PostQuery};
    use crate::error::SyncError;
    use crate::model::{Member, MemberRole, VoteAction, VotePatch};

    /// Only the notification endpoints answer; everything else is a
    /// transport failure.
    struct InboxApi;

    #[async_trait]
    impl CommunityApi for InboxApi {
        async fn vote_post(&self, _: &str, _: VoteAction) -> Result<ApiResponse<VotePatch>> {
            Err(SyncError::Network("unused".into()))
        }
        async fn save_post(&self, _: &str, _: bool) -> Result<ApiResponse<()>> {
            Err(SyncError::Network("unused".into()))
        }
        async fn get_comments(&self, _: &str) -> Result<CommentPage> {
            Err(SyncError::Network("unused".into()))
        }
        async fn vote_comment(&self, _: &str, _: VoteAction) -> Result<ApiResponse<VotePatch>> {
            Err(SyncError::Network("unused".into()))
        }
        async fn update_member_role(&self, _: &str, _: &str, _: MemberRole) -> Result<ApiResponse<Member>> {
            Err(SyncError::Network("unused".into()))
        }
        async fn remove_member(&self, _: &str, _: &str, _: Option<&str>) -> Result<ApiResponse<()>> {
            Err(SyncError::Network("unused".into()))
        }
        async fn ban_member(&self, _: &str, _: &str, _: Option<&str>) -> Result<ApiResponse<()>> {
            Err(SyncError::Network("unused".into()))
        }
        async fn get_posts(&self, _: &PostQuery) -> Result<PostPage> {
            Err(SyncError::Network("unused".into()))
        }
        async fn get_community_members(&self, _: &str, _: &MemberQuery) -> Result<MemberPage> {
            Err(SyncError::Network("unused".into()))
        }
        async fn get_notifications(&self, _: u32, _: u32) -> Result<NotificationPage> {
            Ok(NotificationPage {
                success: true,
                error: None,
                notifications: vec![],
                pagination: PageInfo::default(),
            })
        }
        async fn mark_notification_read(&self, _: &str) -> Result<ApiResponse<()>> {
            Ok(ApiResponse::ok(None))
        }
        async fn mark_all_notifications_read(&self) -> Result<ApiResponse<()>> {
            Ok(ApiResponse::ok(None))
        }
        async fn delete_notification(&self, _: &str) -> Result<ApiResponse<()>> {
            Ok(ApiResponse::failed("Notification not found"))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        granted: bool,
        shown: Mutex<Vec<(String, String)>>,
    }

    impl DesktopNotifier for RecordingNotifier {
        fn permission_granted(&self) -> bool {
            self.granted
        }

        fn notify(&self, title: &str, body: &str) {
            self.shown.lock().unwrap().push((title.to_string(), body.to_string()));
        }
    }

    fn center_with(notifier: Arc<RecordingNotifier>) -> NotificationCenter {
        NotificationCenter::new(Arc::new(InboxApi), &SyncConfig::for_testing()).with_notifier(notifier)
    }

    const AWARD: &str = r#"{"id":"n1","type":"award_received","read":false,
        "timestamp":"2026-01-01T00:00:00Z","data":{"awardName":"Gold"}}"#;
    const REPLY: &str = r#"{"id":"n2","type":"comment_reply","read":false,
        "timestamp":"2026-01-01T00:01:00Z","data":{"postId":"p1","authorName":"ann"}}"#;

    #[test]
    fn test_ingest_dedupes_and_prepends() {
        let center = center_with(Arc::new(RecordingNotifier::default()));
        assert!(center.ingest(AWARD));
        assert!(center.ingest(REPLY));
        assert!(!center.ingest(AWARD));

        let ids: Vec<String> = center.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
        assert_eq!(center.unread_count(), 2);
    }

    #[test]
    fn test_award_raises_desktop_notification_with_fallback_body() {
        let notifier = Arc::new(RecordingNotifier {
            granted: true,
            ..Default::default()
        });
        let center = center_with(Arc::clone(&notifier));
        center.ingest(AWARD);
        center.ingest(REPLY);

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0], ("CRYB".to_string(), "You received an award!".to_string()));
    }

    #[test]
    fn test_no_desktop_notification_without_permission() {
        let notifier = Arc::new(RecordingNotifier::default());
        let center = center_with(Arc::clone(&notifier));
        center.ingest(AWARD);
        assert!(notifier.shown.lock().unwrap().is_empty());
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn test_malformed_message_dropped() {
        let center = center_with(Arc::new(RecordingNotifier::default()));
        assert!(!center.ingest(r#"{"id":"n3","type":"carrier_pigeon"}"#));
        assert!(center.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_mark_all_read_zeroes_badge() {
        let center = center_with(Arc::new(RecordingNotifier::default()));
        center.ingest(AWARD);
        center.ingest(REPLY);

        assert!(center.mark_all_read().await.is_committed());
        assert_eq!(center.unread_count(), 0);
        assert!(!center.can_mark_all_read());
        assert_eq!(
            center.mark_all_read().await,
            MutationOutcome::Skipped(SkipReason::Disabled)
        );
    }

    #[tokio::test]
    async fn test_failed_delete_restores_in_place() {
        let center = center_with(Arc::new(RecordingNotifier::default()));
        center.ingest(AWARD);
        center.ingest(REPLY);

        let outcome = center.delete("n1").await;
        assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
        assert_eq!(center.last_error().as_deref(), Some("Notification not found"));

        let ids: Vec<String> = center.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
    }
}
