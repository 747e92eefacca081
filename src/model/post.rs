//! Feed posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vote::{VoteState, Votable};
use crate::store::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub community_id: String,
    #[serde(default)]
    pub author_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(flatten)]
    pub votes: VoteState,
    /// Local store version, never on the wire
    #[serde(skip)]
    pub version: u64,
}

impl Post {
    pub fn new(id: impl Into<String>, community_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            community_id: community_id.into(),
            author_id: String::new(),
            title: title.into(),
            content: String::new(),
            created_at: Utc::now(),
            saved: false,
            pinned: false,
            comment_count: 0,
            votes: VoteState::default(),
            version: 0,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.votes.score = score;
        self
    }
}

impl Entity for Post {
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

impl Votable for Post {
    fn votes(&self) -> &VoteState {
        &self.votes
    }

    fn votes_mut(&mut self) -> &mut VoteState {
        &mut self.votes
    }
}

/// Content fields of a `community_post_updated` event.
///
/// Vote figures are deliberately absent; they travel in
/// `community_post_vote_updated` and are merged separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub comment_count: Option<u32>,
}

impl PostPatch {
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(pinned) = self.pinned {
            post.pinned = pinned;
        }
        if let Some(count) = self.comment_count {
            post.comment_count = count;
        }
    }
}
