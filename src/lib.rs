//! # cryb-sync-core
//!
//! Optimistic entity cache with two write paths for CRYB community clients.
//!
//! User actions (post and comment votes, saves, role changes, removals,
//! notification reads)
//! are applied to local state immediately and confirmed or rolled back when
//! the API answers. Push events from the socket/SSE transport are merged
//! into the same state by reconcilers. Every store write bumps a version
//! stamp; a rollback only restores its snapshot when nothing newer landed
//! in between.
//!
//! ## Architecture
//!
//! ```text
//!  UI ──► controller ──► OptimisticEngine ──► EntityStore ◄── Reconciler ◄── EventBus
//!              │               │    ▲                                          ▲
//!              │               ▼    │ commit / rollback                        │
//!              │          CommunityApi (RPC)                          transport adapter
//!              └──► ViewMount (subscriptions + liveness)
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! let config = SyncConfig::load("cryb-sync.toml")?;
//! let feed = FeedController::new(api, &config, FeedScope::community("c1", FeedSort::New), Some(voter));
//! let _mount = feed.mount(&bus);
//! feed.load_more().await?;
//! feed.vote("p1", VoteDirection::Up).await;
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod rate_limit;
pub mod reconcile;
pub mod store;
pub mod thread;
pub mod transport;
pub mod weight;

pub use api::{ApiResponse, CommunityApi, FeedSort, MemberSort, TimeRange};
pub use config::SyncConfig;
pub use controller::{CommentRow, CommentSection, DesktopNotifier, FeedController, MemberDirectory, NotificationCenter};
pub use engine::{MutationOutcome, OptimisticEngine, PendingMutation, SkipReason};
pub use error::{Result, SyncError};
pub use lifecycle::{Liveness, ViewMount};
pub use rate_limit::{ActionKind, RateLimiter};
pub use reconcile::{CommentReconciler, FeedReconciler, FeedScope, MemberReconciler, MemberScope};
pub use store::{Entity, EntityStore, StoreHandle};
pub use thread::{CommentThread, SharedThread, ThreadItem};
pub use transport::{EventBus, LocalEventBus, PushMessage, Subscription};
pub use weight::{vote_weight, CommunityRules, VoterContext};
