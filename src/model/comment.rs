//! Comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vote::{VoteState, Votable};
use crate::store::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    /// `None` for top-level comments
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub votes: VoteState,
    #[serde(skip)]
    pub version: u64,
}

impl Comment {
    pub fn new(id: impl Into<String>, post_id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            post_id: post_id.into(),
            parent_id: parent_id.map(str::to_string),
            author_id: String::new(),
            content: String::new(),
            created_at: Utc::now(),
            votes: VoteState::default(),
            version: 0,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.votes.score = score;
        self
    }
}

impl Entity for Comment {
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

impl Votable for Comment {
    fn votes(&self) -> &VoteState {
        &self.votes
    }

    fn votes_mut(&mut self) -> &mut VoteState {
        &mut self.votes
    }
}
