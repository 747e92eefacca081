//! Vote state shared by posts and comments
//!
//! A vote click is a pure transition on [`VoteState`]: it removes the old
//! weighted contribution and adds the new one, so replaying it against the
//! same inputs always lands on the same score.

use serde::{Deserialize, Deserializer, Serialize};

/// Direction of an active vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn sign(self) -> f64 {
        match self {
            VoteDirection::Up => 1.0,
            VoteDirection::Down => -1.0,
        }
    }
}

/// Wire action sent to `vote_post`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Up,
    Down,
    Remove,
}

impl VoteAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteAction::Up => "up",
            VoteAction::Down => "down",
            VoteAction::Remove => "remove",
        }
    }
}

impl From<VoteDirection> for VoteAction {
    fn from(direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => VoteAction::Up,
            VoteDirection::Down => VoteAction::Down,
        }
    }
}

/// Vote fields of a votable entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteState {
    /// Sum of weighted votes. Kept fractional so toggles cancel exactly;
    /// see [`VoteState::display_score`] for the integer shown on screen.
    #[serde(default)]
    pub score: f64,

    /// The viewer's active vote, `None` when not voted
    #[serde(default)]
    pub user_vote: Option<VoteDirection>,

    /// Unweighted upvote count (display fuzzing only)
    #[serde(default, rename = "upvotes", alias = "rawUpvotes")]
    pub raw_upvotes: u32,

    /// Unweighted downvote count (display fuzzing only)
    #[serde(default, rename = "downvotes", alias = "rawDownvotes")]
    pub raw_downvotes: u32,

    /// Weight the viewer's active vote was cast with. Unknown for votes
    /// that arrived from the server, in which case the current weight is
    /// used to take it back.
    #[serde(skip)]
    pub user_vote_weight: Option<f64>,
}

impl VoteState {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    /// Integer score for display
    pub fn display_score(&self) -> i64 {
        self.score.round() as i64
    }

    /// Apply a click on `clicked` with the viewer's current `weight`.
    ///
    /// Clicking the active direction removes the vote, clicking the other
    /// direction switches in a single step, clicking with no vote sets it.
    /// Returns the action to send to the server.
    pub fn click(&mut self, clicked: VoteDirection, weight: f64) -> VoteAction {
        if let Some(previous) = self.user_vote {
            let old_weight = self.user_vote_weight.unwrap_or(weight);
            self.score -= previous.sign() * old_weight;
            match previous {
                VoteDirection::Up => self.raw_upvotes = self.raw_upvotes.saturating_sub(1),
                VoteDirection::Down => self.raw_downvotes = self.raw_downvotes.saturating_sub(1),
            }

            if previous == clicked {
                self.user_vote = None;
                self.user_vote_weight = None;
                return VoteAction::Remove;
            }
        }

        self.score += clicked.sign() * weight;
        match clicked {
            VoteDirection::Up => self.raw_upvotes += 1,
            VoteDirection::Down => self.raw_downvotes += 1,
        }
        self.user_vote = Some(clicked);
        self.user_vote_weight = Some(weight);
        clicked.into()
    }
}

/// Implemented by entities that carry a [`VoteState`] (posts, comments)
pub trait Votable {
    fn votes(&self) -> &VoteState;
    fn votes_mut(&mut self) -> &mut VoteState;

    fn click_vote(&mut self, direction: VoteDirection, weight: f64) -> VoteAction {
        self.votes_mut().click(direction, weight)
    }

    /// Take authoritative figures from a receipt or push event
    fn merge_votes(&mut self, patch: &VotePatch, viewer_id: &str) {
        patch.apply(self.votes_mut(), viewer_id);
    }
}

/// Authoritative vote figures, from a vote RPC receipt or a
/// `*_vote_updated` push event. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePatch {
    #[serde(default)]
    pub score: Option<f64>,

    #[serde(default)]
    pub upvotes: Option<u32>,

    #[serde(default)]
    pub downvotes: Option<u32>,

    /// Absent: leave the viewer's vote alone. `null`: the vote was cleared.
    #[serde(default, deserialize_with = "deserialize_present")]
    pub user_vote: Option<Option<VoteDirection>>,

    /// Who cast the vote that triggered this update, when known
    #[serde(default, alias = "userId")]
    pub voter_id: Option<String>,
}

impl VotePatch {
    /// Merge into `state`. The viewer's own vote is only overwritten when
    /// the patch is about the viewer (or does not say whose vote it was).
    pub fn apply(&self, state: &mut VoteState, viewer_id: &str) {
        if let Some(score) = self.score {
            state.score = score;
        }
        if let Some(up) = self.upvotes {
            state.raw_upvotes = up;
        }
        if let Some(down) = self.downvotes {
            state.raw_downvotes = down;
        }

        let about_viewer = self.voter_id.as_deref().map_or(true, |v| v == viewer_id);
        if let (Some(user_vote), true) = (self.user_vote, about_viewer) {
            if state.user_vote != user_vote {
                state.user_vote_weight = None;
            }
            state.user_vote = user_vote;
        }
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<VoteDirection>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<VoteDirection>::deserialize(deserializer).map(Some)
}
