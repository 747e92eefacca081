//! Vote weight calculation
//!
//! Pure function of (karma, community rules, voter). It runs inside the
//! optimistic path and again whenever a vote is taken back, so it must give
//! the same answer for the same inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Karma tiers: (minimum karma, base weight), highest first
const KARMA_TIERS: [(i64, f64); 5] = [
    (50_000, 3.0),
    (10_000, 2.5),
    (5_000, 2.0),
    (1_000, 1.5),
    (100, 1.2),
];

/// Weight for karma below the first tier
const BASE_WEIGHT: f64 = 1.0;

/// Default bonus for users on a community's trusted list
pub const DEFAULT_TRUSTED_BONUS: f64 = 1.2;

/// Per-community voting rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityRules {
    #[serde(default)]
    pub high_karma_bonus: bool,
    #[serde(default)]
    pub high_karma_threshold: i64,
    #[serde(default = "default_multiplier")]
    pub high_karma_multiplier: f64,
    /// Upper bound on any single vote
    #[serde(default)]
    pub max_vote_weight: Option<f64>,
    #[serde(default)]
    pub trusted_users: HashSet<String>,
    #[serde(default = "default_trusted_bonus")]
    pub trusted_bonus: f64,
}

fn default_multiplier() -> f64 { 1.0 }
fn default_trusted_bonus() -> f64 { DEFAULT_TRUSTED_BONUS }

impl Default for CommunityRules {
    fn default() -> Self {
        Self {
            high_karma_bonus: false,
            high_karma_threshold: 0,
            high_karma_multiplier: default_multiplier(),
            max_vote_weight: None,
            trusted_users: HashSet::new(),
            trusted_bonus: default_trusted_bonus(),
        }
    }
}

impl CommunityRules {
    pub fn with_high_karma_bonus(mut self, threshold: i64, multiplier: f64) -> Self {
        self.high_karma_bonus = true;
        self.high_karma_threshold = threshold;
        self.high_karma_multiplier = multiplier;
        self
    }

    pub fn with_max_weight(mut self, max: f64) -> Self {
        self.max_vote_weight = Some(max);
        self
    }

    pub fn with_trusted(mut self, user_id: impl Into<String>) -> Self {
        self.trusted_users.insert(user_id.into());
        self
    }
}

/// Base weight from karma tiers alone
pub fn tier_weight(karma: i64) -> f64 {
    KARMA_TIERS
        .iter()
        .find(|(min, _)| karma >= *min)
        .map(|(_, weight)| *weight)
        .unwrap_or(BASE_WEIGHT)
}

/// Weight of a single vote by `user_id` with `karma` under `rules`.
///
/// Order: tier weight, high-karma multiplier, trusted bonus, then the
/// community cap. Multipliers below 1.0 are treated as 1.0 so crossing a
/// threshold can never lower the weight.
pub fn vote_weight(karma: i64, rules: &CommunityRules, user_id: &str) -> f64 {
    let mut weight = tier_weight(karma);

    if rules.high_karma_bonus && karma >= rules.high_karma_threshold {
        weight *= rules.high_karma_multiplier.max(1.0);
    }

    if rules.trusted_users.contains(user_id) {
        weight *= rules.trusted_bonus.max(1.0);
    }

    match rules.max_vote_weight {
        Some(max) => weight.min(max),
        None => weight,
    }
}

/// The voting identity of the local viewer in one community
#[derive(Debug, Clone, PartialEq)]
pub struct VoterContext {
    pub user_id: String,
    pub karma: i64,
    pub rules: CommunityRules,
}

impl VoterContext {
    pub fn new(user_id: impl Into<String>, karma: i64, rules: CommunityRules) -> Self {
        Self {
            user_id: user_id.into(),
            karma,
            rules,
        }
    }

    pub fn weight(&self) -> f64 {
        vote_weight(self.karma, &self.rules, &self.user_id)
    }
}
