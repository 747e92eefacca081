//! Scripted community API shared by the integration tests
//!
//! Every endpoint answers `success: true` unless a reply was scripted for
//! it. While holding, each call parks on a `Notify` until released, which
//! lets a test observe the optimistic state mid-flight.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use cryb_sync_core::api::{CommentPage, MemberPage, MemberQuery, NotificationPage, PageInfo, PostPage, PostQuery};
use cryb_sync_core::model::{Comment, Member, MemberRole, Notification, Post, VoteAction, VotePatch};
use cryb_sync_core::{ApiResponse, CommunityApi, Result, SyncError};

/// How the next call to an endpoint answers
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    /// `success: false` with this message
    Reject(String),
    /// Transport failure
    NetworkDown,
}

#[derive(Default)]
pub struct MockApi {
    calls: Mutex<HashMap<&'static str, usize>>,
    scripts: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    holding: AtomicBool,
    gate: Notify,

    post_pages: Mutex<VecDeque<(Vec<Post>, bool)>>,
    member_pages: Mutex<VecDeque<(Vec<Member>, bool)>>,
    notification_pages: Mutex<VecDeque<(Vec<Notification>, bool)>>,
    comment_pages: Mutex<VecDeque<Vec<Comment>>>,
    vote_receipt: Mutex<Option<VotePatch>>,

    pub votes: Mutex<Vec<(String, VoteAction)>>,
    pub comment_votes: Mutex<Vec<(String, VoteAction)>>,
    pub post_queries: Mutex<Vec<PostQuery>>,
    pub member_queries: Mutex<Vec<MemberQuery>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for the next call to `endpoint`
    pub fn script(&self, endpoint: &'static str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(reply);
    }

    /// Park every subsequent call until [`release`](Self::release)
    pub fn hold(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    /// Let one parked (or the next) call through
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn stop_holding(&self) {
        self.holding.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn push_posts(&self, posts: Vec<Post>, has_more: bool) {
        self.post_pages.lock().unwrap().push_back((posts, has_more));
    }

    pub fn push_members(&self, members: Vec<Member>, has_more: bool) {
        self.member_pages.lock().unwrap().push_back((members, has_more));
    }

    pub fn push_notifications(&self, notifications: Vec<Notification>, has_more: bool) {
        self.notification_pages
            .lock()
            .unwrap()
            .push_back((notifications, has_more));
    }

    pub fn push_comments(&self, comments: Vec<Comment>) {
        self.comment_pages.lock().unwrap().push_back(comments);
    }

    pub fn set_vote_receipt(&self, receipt: VotePatch) {
        *self.vote_receipt.lock().unwrap() = Some(receipt);
    }

    /// Count the call, wait at the gate if holding, then resolve the
    /// scripted reply. `Ok(Some(msg))` is a business rejection.
    async fn enter(&self, endpoint: &'static str) -> Result<Option<String>> {
        *self.calls.lock().unwrap().entry(endpoint).or_default() += 1;

        if self.holding.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Ok);

        match reply {
            Reply::Ok => Ok(None),
            Reply::Reject(message) => Ok(Some(message)),
            Reply::NetworkDown => Err(SyncError::Network("connection refused".into())),
        }
    }

    async fn envelope<T>(&self, endpoint: &'static str, data: Option<T>) -> Result<ApiResponse<T>> {
        Ok(match self.enter(endpoint).await? {
            None => ApiResponse::ok(data),
            Some(message) => ApiResponse::failed(message),
        })
    }
}

#[async_trait]
impl CommunityApi for MockApi {
    async fn vote_post(&self, post_id: &str, action: VoteAction) -> Result<ApiResponse<VotePatch>> {
        self.votes.lock().unwrap().push((post_id.to_string(), action));
        let receipt = self.vote_receipt.lock().unwrap().clone();
        self.envelope("vote_post", receipt).await
    }

    async fn save_post(&self, _post_id: &str, _saved: bool) -> Result<ApiResponse<()>> {
        self.envelope("save_post", None).await
    }

    async fn get_comments(&self, _post_id: &str) -> Result<CommentPage> {
        let rejection = self.enter("get_comments").await?;
        let comments = self.comment_pages.lock().unwrap().pop_front().unwrap_or_default();
        Ok(CommentPage {
            success: rejection.is_none(),
            error: rejection,
            comments,
        })
    }

    async fn vote_comment(&self, comment_id: &str, action: VoteAction) -> Result<ApiResponse<VotePatch>> {
        self.comment_votes.lock().unwrap().push((comment_id.to_string(), action));
        let receipt = self.vote_receipt.lock().unwrap().clone();
        self.envelope("vote_comment", receipt).await
    }

    async fn update_member_role(
        &self,
        community_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> Result<ApiResponse<Member>> {
        let member = Member::new(user_id, community_id, role);
        self.envelope("update_member_role", Some(member)).await
    }

    async fn remove_member(&self, _community_id: &str, _user_id: &str, _reason: Option<&str>) -> Result<ApiResponse<()>> {
        self.envelope("remove_member", None).await
    }

    async fn ban_member(&self, _community_id: &str, _user_id: &str, _reason: Option<&str>) -> Result<ApiResponse<()>> {
        self.envelope("ban_member", None).await
    }

    async fn get_posts(&self, query: &PostQuery) -> Result<PostPage> {
        self.post_queries.lock().unwrap().push(query.clone());
        let rejection = self.enter("get_posts").await?;
        let (posts, has_more) = self.post_pages.lock().unwrap().pop_front().unwrap_or_default();
        Ok(PostPage {
            success: rejection.is_none(),
            error: rejection,
            posts,
            pagination: PageInfo { has_more, total: None },
        })
    }

    async fn get_community_members(&self, _community_id: &str, query: &MemberQuery) -> Result<MemberPage> {
        self.member_queries.lock().unwrap().push(query.clone());
        let rejection = self.enter("get_community_members").await?;
        let (members, has_more) = self.member_pages.lock().unwrap().pop_front().unwrap_or_default();
        Ok(MemberPage {
            success: rejection.is_none(),
            error: rejection,
            members,
            pagination: PageInfo { has_more, total: None },
        })
    }

    async fn get_notifications(&self, _page: u32, _limit: u32) -> Result<NotificationPage> {
        let rejection = self.enter("get_notifications").await?;
        let (notifications, has_more) = self
            .notification_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(NotificationPage {
            success: rejection.is_none(),
            error: rejection,
            notifications,
            pagination: PageInfo { has_more, total: None },
        })
    }

    async fn mark_notification_read(&self, _notification_id: &str) -> Result<ApiResponse<()>> {
        self.envelope("mark_notification_read", None).await
    }

    async fn mark_all_notifications_read(&self) -> Result<ApiResponse<()>> {
        self.envelope("mark_all_notifications_read", None).await
    }

    async fn delete_notification(&self, _notification_id: &str) -> Result<ApiResponse<()>> {
        self.envelope("delete_notification", None).await
    }
}
