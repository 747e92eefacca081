//! Notifications
//!
//! The wire object is `{id, type, read, timestamp, data}` where the shape of
//! `data` depends on `type`. Locally the pair becomes one tagged variant so
//! each kind only carries its own fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::store::Entity;

/// Closed set of notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AwardReceived,
    CommentReply,
    PostReply,
    Mention,
    Follow,
    CommunityInvite,
    ModAction,
    System,
}

impl NotificationKind {
    /// Kinds that also raise a desktop notification
    pub fn is_desktop_notifiable(self) -> bool {
        matches!(self, NotificationKind::AwardReceived)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardPayload {
    #[serde(default)]
    pub award_name: String,
    #[serde(default)]
    pub giver_name: Option<String>,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub comment_id: Option<String>,
    /// Custom message from the giver
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPayload {
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub comment_id: Option<String>,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionPayload {
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub comment_id: Option<String>,
    #[serde(default)]
    pub author_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowPayload {
    #[serde(default)]
    pub follower_id: String,
    #[serde(default)]
    pub follower_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    #[serde(default)]
    pub community_id: String,
    #[serde(default)]
    pub community_name: String,
    #[serde(default)]
    pub inviter_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModActionPayload {
    #[serde(default)]
    pub community_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPayload {
    #[serde(default)]
    pub message: String,
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationData {
    AwardReceived(AwardPayload),
    CommentReply(ReplyPayload),
    PostReply(ReplyPayload),
    Mention(MentionPayload),
    Follow(FollowPayload),
    CommunityInvite(InvitePayload),
    ModAction(ModActionPayload),
    System(SystemPayload),
}

impl NotificationData {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationData::AwardReceived(_) => NotificationKind::AwardReceived,
            NotificationData::CommentReply(_) => NotificationKind::CommentReply,
            NotificationData::PostReply(_) => NotificationKind::PostReply,
            NotificationData::Mention(_) => NotificationKind::Mention,
            NotificationData::Follow(_) => NotificationKind::Follow,
            NotificationData::CommunityInvite(_) => NotificationKind::CommunityInvite,
            NotificationData::ModAction(_) => NotificationKind::ModAction,
            NotificationData::System(_) => NotificationKind::System,
        }
    }

    fn from_wire(kind: NotificationKind, data: serde_json::Value) -> serde_json::Result<Self> {
        // A kind without payload still deserializes into its all-default struct
        let data = if data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            data
        };

        Ok(match kind {
            NotificationKind::AwardReceived => NotificationData::AwardReceived(serde_json::from_value(data)?),
            NotificationKind::CommentReply => NotificationData::CommentReply(serde_json::from_value(data)?),
            NotificationKind::PostReply => NotificationData::PostReply(serde_json::from_value(data)?),
            NotificationKind::Mention => NotificationData::Mention(serde_json::from_value(data)?),
            NotificationKind::Follow => NotificationData::Follow(serde_json::from_value(data)?),
            NotificationKind::CommunityInvite => NotificationData::CommunityInvite(serde_json::from_value(data)?),
            NotificationKind::ModAction => NotificationData::ModAction(serde_json::from_value(data)?),
            NotificationKind::System => NotificationData::System(serde_json::from_value(data)?),
        })
    }

    fn to_wire(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            NotificationData::AwardReceived(p) => serde_json::to_value(p),
            NotificationData::CommentReply(p) | NotificationData::PostReply(p) => serde_json::to_value(p),
            NotificationData::Mention(p) => serde_json::to_value(p),
            NotificationData::Follow(p) => serde_json::to_value(p),
            NotificationData::CommunityInvite(p) => serde_json::to_value(p),
            NotificationData::ModAction(p) => serde_json::to_value(p),
            NotificationData::System(p) => serde_json::to_value(p),
        }
    }
}

/// Wire representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNotification {
    id: String,
    #[serde(rename = "type")]
    kind: NotificationKind,
    #[serde(default)]
    read: bool,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireNotification", into = "WireNotification")]
pub struct Notification {
    pub id: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
    pub data: NotificationData,
    pub version: u64,
}

impl TryFrom<WireNotification> for Notification {
    type Error = serde_json::Error;

    fn try_from(wire: WireNotification) -> serde_json::Result<Self> {
        Ok(Self {
            data: NotificationData::from_wire(wire.kind, wire.data)?,
            id: wire.id,
            read: wire.read,
            timestamp: wire.timestamp,
            version: 0,
        })
    }
}

impl From<Notification> for WireNotification {
    fn from(n: Notification) -> Self {
        WireNotification {
            kind: n.data.kind(),
            data: n.data.to_wire().unwrap_or(serde_json::Value::Null),
            id: n.id,
            read: n.read,
            timestamp: n.timestamp,
        }
    }
}

impl Notification {
    pub fn new(id: impl Into<String>, data: NotificationData) -> Self {
        Self {
            id: id.into(),
            read: false,
            timestamp: Utc::now(),
            data,
            version: 0,
        }
    }

    /// Parse one stream message
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::MalformedEvent {
            event: "notification".to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse an already-decoded push payload
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| SyncError::MalformedEvent {
            event: "notification".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn kind(&self) -> NotificationKind {
        self.data.kind()
    }
}

impl Entity for Notification {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_award() {
        let n = Notification::parse(
            r#"{"id":"n1","type":"award_received","read":false,"timestamp":"2024-05-01T10:00:00Z",
                "data":{"awardName":"Gold","giverName":"alice","postId":"p9"}}"#,
        )
        .unwrap();

        assert_eq!(n.kind(), NotificationKind::AwardReceived);
        match &n.data {
            NotificationData::AwardReceived(award) => {
                assert_eq!(award.award_name, "Gold");
                assert_eq!(award.message, None);
            }
            other => panic!("expected award, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_without_data() {
        let n = Notification::parse(
            r#"{"id":"n2","type":"system","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(n.kind(), NotificationKind::System);
        assert!(!n.read);
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let err = Notification::parse(
            r#"{"id":"n3","type":"teleport","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::MalformedEvent { .. }));
    }

    #[test]
    fn test_serializes_back_to_wire_shape() {
        let n = Notification::new(
            "n4",
            NotificationData::Follow(FollowPayload {
                follower_id: "u2".into(),
                follower_name: "bob".into(),
            }),
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "follow");
        assert_eq!(json["data"]["followerName"], "bob");
    }
}
