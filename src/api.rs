//! RPC surface consumed from the community API service
//!
//! Shapes only; the HTTP client lives with the host application. An `Err`
//! from any method is a transport failure, while a response with
//! `success: false` is a business failure carrying a user-facing message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::model::{Comment, Member, MemberRole, Notification, Post, VoteAction, VotePatch};

/// Generic `{success, error?, data?}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }

    /// Fold a business failure into [`SyncError::Rejected`]
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(SyncError::Rejected(
                self.error.unwrap_or_else(|| "Request failed".to_string()),
            ))
        }
    }
}

/// `{hasMore}` block of list responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl FeedSort {
    /// Newly created posts belong at the head of the list
    pub fn is_recency(self) -> bool {
        matches!(self, FeedSort::New)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Hour,
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: FeedSort,
    pub time_range: TimeRange,
    pub community_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberSort {
    #[default]
    Role,
    Newest,
    Oldest,
    Karma,
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: MemberSort,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<MemberRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPage {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub pagination: PageInfo,
}

/// Every comment of one post, flat; the client builds the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Check the `success` flag of a list response
pub(crate) fn page_result(success: bool, error: Option<String>) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(SyncError::Rejected(error.unwrap_or_else(|| "Request failed".to_string())))
    }
}

/// Community API service
#[async_trait]
pub trait CommunityApi: Send + Sync {
    /// Cast, switch, or remove the viewer's vote. The receipt may carry
    /// authoritative vote figures.
    async fn vote_post(&self, post_id: &str, action: VoteAction) -> Result<ApiResponse<VotePatch>>;

    async fn save_post(&self, post_id: &str, saved: bool) -> Result<ApiResponse<()>>;

    async fn get_comments(&self, post_id: &str) -> Result<CommentPage>;

    async fn vote_comment(&self, comment_id: &str, action: VoteAction) -> Result<ApiResponse<VotePatch>>;

    async fn update_member_role(
        &self,
        community_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> Result<ApiResponse<Member>>;

    async fn remove_member(
        &self,
        community_id: &str,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<ApiResponse<()>>;

    async fn ban_member(
        &self,
        community_id: &str,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<ApiResponse<()>>;

    async fn get_posts(&self, query: &PostQuery) -> Result<PostPage>;

    async fn get_community_members(&self, community_id: &str, query: &MemberQuery) -> Result<MemberPage>;

    async fn get_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<ApiResponse<()>>;

    async fn mark_all_notifications_read(&self) -> Result<ApiResponse<()>>;

    async fn delete_notification(&self, notification_id: &str) -> Result<ApiResponse<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_failure_surfaces_message() {
        let response: ApiResponse<()> =
            serde_json::from_str(r#"{"success": false, "error": "Post is locked"}"#).unwrap();
        assert_eq!(
            response.into_result().unwrap_err(),
            SyncError::Rejected("Post is locked".into())
        );
    }

    #[test]
    fn test_success_without_data() {
        let response: ApiResponse<VotePatch> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), None);
    }

    #[test]
    fn test_post_page_shape() {
        let page: PostPage = serde_json::from_str(
            r#"{"success": true, "posts": [], "pagination": {"hasMore": true}}"#,
        )
        .unwrap();
        assert!(page.pagination.has_more);
    }

    #[test]
    fn test_comment_page_shape() {
        let page: CommentPage = serde_json::from_str(
            r#"{"success": true, "comments": [
                {"id": "k1", "postId": "p1", "createdAt": "2026-04-01T08:00:00Z", "score": 3}
            ]}"#,
        )
        .unwrap();
        assert_eq!(page.comments[0].votes.score, 3.0);
        assert_eq!(page.comments[0].parent_id, None);
    }

    #[test]
    fn test_only_new_sort_is_recency() {
        assert!(FeedSort::New.is_recency());
        assert!(!FeedSort::Hot.is_recency());
        assert!(!FeedSort::Top.is_recency());
    }
}
