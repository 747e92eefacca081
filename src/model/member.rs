//! Community membership

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Entity;

/// Member role, declared from least to most privileged so `Ord` follows
/// privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Moderator,
    Admin,
    Owner,
}

impl Default for MemberRole {
    fn default() -> Self {
        MemberRole::Member
    }
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Moderator => "moderator",
            MemberRole::Admin => "admin",
            MemberRole::Owner => "owner",
        }
    }

    /// Whether an actor with this role may remove, ban, or re-role `target`
    pub fn can_manage(self, target: MemberRole) -> bool {
        self >= MemberRole::Moderator && self > target
    }

    /// Whether an actor with this role may move `target` to `new_role`
    pub fn can_assign(self, target: MemberRole, new_role: MemberRole) -> bool {
        self.can_manage(target) && self > new_role
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// User id; unique within one community's member list
    #[serde(alias = "userId")]
    pub id: String,
    pub community_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub post_count: u32,
    #[serde(default)]
    pub karma: i64,
    #[serde(skip)]
    pub version: u64,
}

impl Member {
    pub fn new(id: impl Into<String>, community_id: impl Into<String>, role: MemberRole) -> Self {
        Self {
            id: id.into(),
            community_id: community_id.into(),
            username: String::new(),
            role,
            joined_at: Utc::now(),
            post_count: 0,
            karma: 0,
            version: 0,
        }
    }
}

impl Entity for Member {
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
