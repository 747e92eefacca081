//! Push event payloads
//!
//! Feed and member events carry the `communityId` they belong to, comment
//! events the `postId` of their thread. Parsing turns a
//! [`PushMessage`] into a tagged variant; an unknown event name is not an
//! error (`Ok(None)`), a known name with a bad payload is.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::model::{Comment, Member, MemberRole, Post, PostPatch, VotePatch};
use crate::transport::PushMessage;

pub const POST_CREATED: &str = "community_post_created";
pub const POST_UPDATED: &str = "community_post_updated";
pub const POST_DELETED: &str = "community_post_deleted";
pub const POST_VOTE_UPDATED: &str = "community_post_vote_updated";

pub const MEMBER_JOINED: &str = "member_joined";
pub const MEMBER_LEFT: &str = "member_left";
pub const MEMBER_ROLE_UPDATED: &str = "member_role_updated";
pub const MEMBER_BANNED: &str = "member_banned";

pub const COMMENT_CREATED: &str = "comment_created";
pub const COMMENT_UPDATED: &str = "comment_updated";
pub const COMMENT_DELETED: &str = "comment_deleted";
pub const COMMENT_VOTE_UPDATED: &str = "comment_vote_updated";

/// Notification stream event name on the bus
pub const NOTIFICATION: &str = "notification";

pub const FEED_EVENTS: [&str; 4] = [POST_CREATED, POST_UPDATED, POST_DELETED, POST_VOTE_UPDATED];
pub const MEMBER_EVENTS: [&str; 4] = [MEMBER_JOINED, MEMBER_LEFT, MEMBER_ROLE_UPDATED, MEMBER_BANNED];
pub const COMMENT_EVENTS: [&str; 4] = [COMMENT_CREATED, COMMENT_UPDATED, COMMENT_DELETED, COMMENT_VOTE_UPDATED];

fn decode<T: DeserializeOwned>(message: &PushMessage) -> Result<T> {
    serde_json::from_value(message.payload.clone()).map_err(|e| SyncError::MalformedEvent {
        event: message.event.clone(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Feed events
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostCreated {
    community_id: String,
    post: Post,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostUpdated {
    community_id: String,
    #[serde(alias = "updates")]
    post: PostPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDeleted {
    community_id: String,
    post_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostVoteUpdated {
    community_id: String,
    post_id: String,
    #[serde(flatten)]
    votes: VotePatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Created { community_id: String, post: Post },
    Updated { community_id: String, patch: PostPatch },
    Deleted { community_id: String, post_id: String },
    VoteUpdated { community_id: String, post_id: String, patch: VotePatch },
}

impl FeedEvent {
    pub fn parse(message: &PushMessage) -> Result<Option<Self>> {
        let event = match message.event.as_str() {
            POST_CREATED => {
                let p: PostCreated = decode(message)?;
                FeedEvent::Created {
                    community_id: p.community_id,
                    post: p.post,
                }
            }
            POST_UPDATED => {
                let p: PostUpdated = decode(message)?;
                FeedEvent::Updated {
                    community_id: p.community_id,
                    patch: p.post,
                }
            }
            POST_DELETED => {
                let p: PostDeleted = decode(message)?;
                FeedEvent::Deleted {
                    community_id: p.community_id,
                    post_id: p.post_id,
                }
            }
            POST_VOTE_UPDATED => {
                let p: PostVoteUpdated = decode(message)?;
                FeedEvent::VoteUpdated {
                    community_id: p.community_id,
                    post_id: p.post_id,
                    patch: p.votes,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn community_id(&self) -> &str {
        match self {
            FeedEvent::Created { community_id, .. }
            | FeedEvent::Updated { community_id, .. }
            | FeedEvent::Deleted { community_id, .. }
            | FeedEvent::VoteUpdated { community_id, .. } => community_id,
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            FeedEvent::Created { post, .. } => &post.id,
            FeedEvent::Updated { patch, .. } => &patch.id,
            FeedEvent::Deleted { post_id, .. } | FeedEvent::VoteUpdated { post_id, .. } => post_id,
        }
    }
}

// =============================================================================
// Member events
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberJoined {
    community_id: String,
    member: Member,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberGone {
    community_id: String,
    user_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRoleUpdated {
    community_id: String,
    user_id: String,
    #[serde(alias = "newRole")]
    role: MemberRole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberEvent {
    Joined { community_id: String, member: Member },
    Left { community_id: String, user_id: String },
    RoleUpdated { community_id: String, user_id: String, role: MemberRole },
    Banned { community_id: String, user_id: String, reason: Option<String> },
}

impl MemberEvent {
    pub fn parse(message: &PushMessage) -> Result<Option<Self>> {
        let event = match message.event.as_str() {
            MEMBER_JOINED => {
                let p: MemberJoined = decode(message)?;
                MemberEvent::Joined {
                    community_id: p.community_id,
                    member: p.member,
                }
            }
            MEMBER_LEFT => {
                let p: MemberGone = decode(message)?;
                MemberEvent::Left {
                    community_id: p.community_id,
                    user_id: p.user_id,
                }
            }
            MEMBER_ROLE_UPDATED => {
                let p: MemberRoleUpdated = decode(message)?;
                MemberEvent::RoleUpdated {
                    community_id: p.community_id,
                    user_id: p.user_id,
                    role: p.role,
                }
            }
            MEMBER_BANNED => {
                let p: MemberGone = decode(message)?;
                MemberEvent::Banned {
                    community_id: p.community_id,
                    user_id: p.user_id,
                    reason: p.reason,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn community_id(&self) -> &str {
        match self {
            MemberEvent::Joined { community_id, .. }
            | MemberEvent::Left { community_id, .. }
            | MemberEvent::RoleUpdated { community_id, .. }
            | MemberEvent::Banned { community_id, .. } => community_id,
        }
    }
}

// =============================================================================
// Comment events
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentCreated {
    post_id: String,
    comment: Comment,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentEdited {
    post_id: String,
    comment_id: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentDeleted {
    post_id: String,
    comment_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentVoteUpdated {
    post_id: String,
    comment_id: String,
    #[serde(flatten)]
    votes: VotePatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentEvent {
    Created { post_id: String, comment: Comment },
    Edited { post_id: String, comment_id: String, content: String },
    Deleted { post_id: String, comment_id: String },
    VoteUpdated { post_id: String, comment_id: String, patch: VotePatch },
}

impl CommentEvent {
    pub fn parse(message: &PushMessage) -> Result<Option<Self>> {
        let event = match message.event.as_str() {
            COMMENT_CREATED => {
                let p: CommentCreated = decode(message)?;
                CommentEvent::Created {
                    post_id: p.post_id,
                    comment: p.comment,
                }
            }
            COMMENT_UPDATED => {
                let p: CommentEdited = decode(message)?;
                CommentEvent::Edited {
                    post_id: p.post_id,
                    comment_id: p.comment_id,
                    content: p.content,
                }
            }
            COMMENT_DELETED => {
                let p: CommentDeleted = decode(message)?;
                CommentEvent::Deleted {
                    post_id: p.post_id,
                    comment_id: p.comment_id,
                }
            }
            COMMENT_VOTE_UPDATED => {
                let p: CommentVoteUpdated = decode(message)?;
                CommentEvent::VoteUpdated {
                    post_id: p.post_id,
                    comment_id: p.comment_id,
                    patch: p.votes,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Post whose thread the event belongs to
    pub fn post_id(&self) -> &str {
        match self {
            CommentEvent::Created { post_id, .. }
            | CommentEvent::Edited { post_id, .. }
            | CommentEvent::Deleted { post_id, .. }
            | CommentEvent::VoteUpdated { post_id, .. } => post_id,
        }
    }
}
