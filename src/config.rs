//! Client sync configuration
//!
//! Every knob has a serde default so a partial TOML table is enough, and
//! `CRYB_*` environment variables override whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::api::{FeedSort, MemberSort};
use crate::error::{Result, SyncError};
use crate::rate_limit::{ActionKind, RateLimiter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Cooldown for vote clicks on the same entity (ms)
    #[serde(default = "default_vote_cooldown")]
    pub vote_cooldown_ms: u64,

    /// Cooldown for every other optimistic action (ms)
    #[serde(default = "default_action_cooldown")]
    pub action_cooldown_ms: u64,

    /// Client-side deadline for a single RPC (ms)
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Items requested per "load more"
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Reply depth after which a thread collapses into "continue thread"
    #[serde(default = "default_max_thread_depth")]
    pub max_thread_depth: usize,

    /// Initial feed ordering
    #[serde(default)]
    pub feed_sort: FeedSort,

    /// Initial member directory ordering
    #[serde(default)]
    pub member_sort: MemberSort,

    /// Desktop notification title
    #[serde(default = "default_desktop_title")]
    pub desktop_title: String,

    /// Desktop notification body when the award carries no message
    #[serde(default = "default_desktop_fallback_body")]
    pub desktop_fallback_body: String,
}

// Defaults
fn default_vote_cooldown() -> u64 { 1000 }
fn default_action_cooldown() -> u64 { 500 }
fn default_rpc_timeout() -> u64 { 10_000 }
fn default_page_size() -> u32 { 20 }
fn default_max_thread_depth() -> usize { 8 }
fn default_desktop_title() -> String { "CRYB".to_string() }
fn default_desktop_fallback_body() -> String { "You received an award!".to_string() }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vote_cooldown_ms: default_vote_cooldown(),
            action_cooldown_ms: default_action_cooldown(),
            rpc_timeout_ms: default_rpc_timeout(),
            page_size: default_page_size(),
            max_thread_depth: default_max_thread_depth(),
            feed_sort: FeedSort::default(),
            member_sort: MemberSort::default(),
            desktop_title: default_desktop_title(),
            desktop_fallback_body: default_desktop_fallback_body(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document, filling gaps with defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file if it exists, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| SyncError::Config(format!("reading {}: {}", path.display(), e)))?;
            toml::from_str(&content)?
        } else {
            tracing::info!(path = %path.display(), "Sync config not found, using defaults");
            SyncConfig::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `CRYB_*` environment variables onto this config
    pub fn apply_env(&mut self) {
        fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|s| s.parse().ok())
        }

        if let Some(v) = env_parse("CRYB_VOTE_COOLDOWN_MS") {
            self.vote_cooldown_ms = v;
        }
        if let Some(v) = env_parse("CRYB_ACTION_COOLDOWN_MS") {
            self.action_cooldown_ms = v;
        }
        if let Some(v) = env_parse("CRYB_RPC_TIMEOUT_MS") {
            self.rpc_timeout_ms = v;
        }
        if let Some(v) = env_parse("CRYB_PAGE_SIZE") {
            self.page_size = v;
        }
        if let Some(v) = env_parse("CRYB_MAX_THREAD_DEPTH") {
            self.max_thread_depth = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_timeout_ms == 0 {
            return Err(SyncError::Config("rpc_timeout_ms must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(SyncError::Config("page_size must be positive".into()));
        }
        if self.max_thread_depth == 0 {
            return Err(SyncError::Config("max_thread_depth must be positive".into()));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Cooldown window applied by the rate limiter for an action kind
    pub fn cooldown_for(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Vote => Duration::from_millis(self.vote_cooldown_ms),
            _ => Duration::from_millis(self.action_cooldown_ms),
        }
    }

    /// Limiter with the configured per-kind windows
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(Duration::from_millis(self.action_cooldown_ms))
            .with_window(ActionKind::Vote, self.cooldown_for(ActionKind::Vote))
    }

    /// Config for tests: no cooldowns, short timeout
    pub fn for_testing() -> Self {
        Self {
            vote_cooldown_ms: 0,
            action_cooldown_ms: 0,
            rpc_timeout_ms: 1_000,
            ..Default::default()
        }
    }
}
