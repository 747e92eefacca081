//! Feed integration tests
//!
//! Drives a `FeedController` against the scripted API and a local event bus:
//! - Optimistic votes, rollback and server receipts
//! - Single in-flight mutation per post
//! - Push events racing in-flight requests
//! - Scope filtering and "load more" suppression

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockApi, Reply};
use cryb_sync_core::model::{Post, VoteAction, VoteDirection, VotePatch};
use cryb_sync_core::{
    CommunityRules, FeedController, FeedScope, FeedSort, LocalEventBus, MutationOutcome, PushMessage,
    SkipReason, SyncConfig, VoterContext,
};
use serde_json::json;

fn voter(karma: i64) -> Option<VoterContext> {
    Some(VoterContext::new("viewer", karma, CommunityRules::default()))
}

async fn feed_with(api: &Arc<MockApi>, config: &SyncConfig, sort: FeedSort) -> FeedController {
    api.push_posts(
        vec![
            Post::new("p1", "c1", "First").with_score(10.0),
            Post::new("p2", "c1", "Second").with_score(3.0),
        ],
        true,
    );
    let feed = FeedController::new(api.clone(), config, FeedScope::community("c1", sort), voter(0));
    feed.load_more().await.unwrap();
    feed
}

fn score(feed: &FeedController, id: &str) -> f64 {
    feed.post(id).unwrap().votes.score
}

// =============================================================================
// Optimistic votes
// =============================================================================

#[tokio::test]
async fn test_failed_vote_goes_10_to_11_and_back_to_10() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;

    api.hold();
    api.script("vote_post", Reply::NetworkDown);

    let (outcome, ()) = tokio::join!(feed.vote("p1", VoteDirection::Up), async {
        tokio::task::yield_now().await;
        let mid_flight = feed.post("p1").unwrap();
        assert_eq!(mid_flight.votes.display_score(), 11, "Optimistic score shown immediately");
        assert_eq!(mid_flight.votes.user_vote, Some(VoteDirection::Up));
        assert!(feed.store().read().is_pending("p1"));
        api.release();
    });

    assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
    let post = feed.post("p1").unwrap();
    assert_eq!(post.votes.score, 10.0);
    assert_eq!(post.votes.user_vote, None);
    assert!(!feed.store().read().is_pending("p1"));
    assert_eq!(
        feed.last_error().as_deref(),
        Some("Could not reach the server. Please try again.")
    );
}

#[tokio::test]
async fn test_three_rapid_clicks_issue_one_rpc() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    api.hold();

    let (first, ()) = tokio::join!(feed.vote("p1", VoteDirection::Up), async {
        tokio::task::yield_now().await;
        let second = feed.vote("p1", VoteDirection::Up).await;
        let third = feed.vote("p1", VoteDirection::Down).await;
        assert_eq!(second, MutationOutcome::Skipped(SkipReason::InFlight));
        assert_eq!(third, MutationOutcome::Skipped(SkipReason::InFlight));
        api.release();
    });

    assert!(first.is_committed());
    assert_eq!(api.calls("vote_post"), 1);
    assert_eq!(feed.post("p1").unwrap().votes.display_score(), 11);
}

#[tokio::test]
async fn test_toggle_returns_to_original_score() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;

    assert!(feed.vote("p1", VoteDirection::Up).await.is_committed());
    assert_eq!(score(&feed, "p1"), 11.0);
    assert!(feed.vote("p1", VoteDirection::Up).await.is_committed());
    assert_eq!(score(&feed, "p1"), 10.0);
    assert_eq!(feed.post("p1").unwrap().votes.user_vote, None);

    let sent: Vec<VoteAction> = api.votes.lock().unwrap().iter().map(|(_, a)| *a).collect();
    assert_eq!(sent, vec![VoteAction::Up, VoteAction::Remove]);
}

#[tokio::test]
async fn test_switching_direction_moves_two_units() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;

    feed.vote("p1", VoteDirection::Up).await;
    feed.vote("p1", VoteDirection::Down).await;

    let post = feed.post("p1").unwrap();
    assert_eq!(post.votes.score, 9.0);
    assert_eq!(post.votes.user_vote, Some(VoteDirection::Down));
    assert_eq!(api.calls("vote_post"), 2, "Switch is a single transition");
}

#[tokio::test]
async fn test_weighted_vote_then_server_receipt_wins() {
    let api = MockApi::new();
    api.push_posts(vec![Post::new("p1", "c1", "First").with_score(10.0)], false);
    let feed = FeedController::new(
        api.clone(),
        &SyncConfig::for_testing(),
        FeedScope::community("c1", FeedSort::Hot),
        voter(1_000),
    );
    feed.load_more().await.unwrap();

    api.hold();
    api.set_vote_receipt(VotePatch {
        score: Some(20.0),
        ..Default::default()
    });
    let (outcome, ()) = tokio::join!(feed.vote("p1", VoteDirection::Up), async {
        tokio::task::yield_now().await;
        assert_eq!(score(&feed, "p1"), 11.5, "Karma 1000 votes with weight 1.5");
        api.release();
    });

    assert!(outcome.is_committed());
    assert_eq!(score(&feed, "p1"), 20.0);
    assert_eq!(feed.post("p1").unwrap().votes.user_vote, Some(VoteDirection::Up));
}

#[tokio::test(start_paused = true)]
async fn test_vote_cooldown_drops_clicks_after_settling() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::default(), FeedSort::Hot).await;

    assert!(feed.vote("p1", VoteDirection::Up).await.is_committed());
    assert_eq!(
        feed.vote("p1", VoteDirection::Up).await,
        MutationOutcome::Skipped(SkipReason::InFlight)
    );

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert!(feed.vote("p1", VoteDirection::Up).await.is_committed());
    assert_eq!(api.calls("vote_post"), 2);
}

#[tokio::test]
async fn test_logged_out_viewer_cannot_vote() {
    let api = MockApi::new();
    api.push_posts(vec![Post::new("p1", "c1", "First")], false);
    let feed = FeedController::new(api.clone(), &SyncConfig::for_testing(), FeedScope::default(), None);
    feed.load_more().await.unwrap();

    assert_eq!(
        feed.vote("p1", VoteDirection::Up).await,
        MutationOutcome::Skipped(SkipReason::Disabled)
    );
    assert_eq!(api.calls("vote_post"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_vote_times_out_and_rolls_back() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    api.hold();

    let outcome = feed.vote("p1", VoteDirection::Up).await;

    assert!(matches!(outcome, MutationOutcome::RolledBack(cryb_sync_core::SyncError::Timeout(_))));
    assert_eq!(score(&feed, "p1"), 10.0);
}

#[tokio::test]
async fn test_business_rejection_shown_verbatim_and_dismissible() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    api.script("save_post", Reply::Reject("This post is archived".into()));

    let outcome = feed.toggle_save("p2").await;

    assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
    assert!(!feed.post("p2").unwrap().saved);
    assert_eq!(feed.last_error().as_deref(), Some("This post is archived"));
    feed.dismiss_error();
    assert_eq!(feed.last_error(), None);
}

// =============================================================================
// Push events vs. in-flight mutations
// =============================================================================

#[tokio::test]
async fn test_push_update_during_failed_vote_is_kept() {
    let api = MockApi::new();
    let bus = LocalEventBus::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    let _mount = feed.mount(&bus);

    api.hold();
    api.script("vote_post", Reply::Reject("Voting closed".into()));

    let (outcome, ()) = tokio::join!(feed.vote("p1", VoteDirection::Up), async {
        tokio::task::yield_now().await;
        bus.publish(&PushMessage::new(
            "community_post_vote_updated",
            json!({"communityId": "c1", "postId": "p1", "score": 30, "userId": "someone"}),
        ));
        api.release();
    });

    assert!(matches!(outcome, MutationOutcome::Conflict(_)));
    assert_eq!(score(&feed, "p1"), 30.0, "Newer push state survives the rollback");
    assert_eq!(feed.last_error(), None, "Conflicts are not surfaced");
}

#[tokio::test]
async fn test_unmounted_view_ignores_late_completion() {
    let api = MockApi::new();
    let bus = LocalEventBus::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    let mount = feed.mount(&bus);
    assert_eq!(bus.handler_count("community_post_created"), 1);

    api.hold();
    api.script("vote_post", Reply::NetworkDown);

    let (outcome, ()) = tokio::join!(feed.vote("p1", VoteDirection::Up), async {
        tokio::task::yield_now().await;
        drop(mount);
        api.release();
    });

    assert_eq!(outcome, MutationOutcome::Detached);
    assert_eq!(score(&feed, "p1"), 11.0, "No rollback after unmount");
    assert_eq!(feed.last_error(), None);
    assert_eq!(bus.handler_count("community_post_created"), 0);
}

#[tokio::test]
async fn test_post_update_does_not_touch_votes() {
    let api = MockApi::new();
    let bus = LocalEventBus::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    let _mount = feed.mount(&bus);

    feed.vote("p1", VoteDirection::Up).await;
    bus.publish(&PushMessage::new(
        "community_post_updated",
        json!({"communityId": "c1", "post": {"id": "p1", "title": "Edited"}}),
    ));

    let post = feed.post("p1").unwrap();
    assert_eq!(post.title, "Edited");
    assert_eq!(post.votes.score, 11.0);
    assert_eq!(post.votes.user_vote, Some(VoteDirection::Up));
}

// =============================================================================
// Scope and paging
// =============================================================================

#[tokio::test]
async fn test_created_events_respect_scope_and_sort() {
    let api = MockApi::new();
    let bus = LocalEventBus::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::New).await;
    let _mount = feed.mount(&bus);

    let created = |community: &str, id: &str| {
        PushMessage::new(
            "community_post_created",
            json!({"communityId": community, "post": {
                "id": id, "communityId": community, "title": "Fresh",
                "createdAt": "2026-03-01T12:00:00Z"
            }}),
        )
    };

    bus.publish(&created("c2", "other"));
    bus.publish(&created("c1", "p3"));
    bus.publish(&created("c1", "p3"));
    bus.publish(&PushMessage::new("community_post_created", json!({"communityId": "c1"})));

    let ids: Vec<String> = feed.posts().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["p3", "p1", "p2"]);
}

#[tokio::test]
async fn test_concurrent_load_more_is_suppressed() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    api.push_posts(vec![Post::new("p4", "c1", "Fourth")], false);
    api.hold();

    let (loaded, ()) = tokio::join!(feed.load_more(), async {
        tokio::task::yield_now().await;
        assert!(feed.is_loading());
        assert_eq!(feed.load_more().await.unwrap(), 0);
        api.release();
    });

    assert_eq!(loaded.unwrap(), 1);
    assert_eq!(api.calls("get_posts"), 2, "Initial page plus exactly one more");
    let pages: Vec<u32> = api.post_queries.lock().unwrap().iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 2]);
    assert!(!feed.has_more());

    api.stop_holding();
    assert_eq!(feed.load_more().await.unwrap(), 0, "Exhausted feed does not fetch");
    assert_eq!(api.calls("get_posts"), 2);
}

#[tokio::test]
async fn test_failed_load_keeps_page_cursor() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;

    api.script("get_posts", Reply::NetworkDown);
    assert!(feed.load_more().await.is_err());
    assert!(feed.last_error().is_some());

    feed.load_more().await.unwrap();
    let pages: Vec<u32> = api.post_queries.lock().unwrap().iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 2, 2]);
}

#[tokio::test]
async fn test_sort_change_refetches_first_page() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    api.push_posts(vec![Post::new("p9", "c1", "Newest")], true);

    assert_eq!(feed.set_sort(FeedSort::New).await.unwrap(), 1);

    let ids: Vec<String> = feed.posts().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["p9"]);
    let last = api.post_queries.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.page, 1);
    assert_eq!(last.sort, FeedSort::New);
    assert_eq!(feed.scope().sort, FeedSort::New);
}

#[tokio::test]
async fn test_sort_change_during_load_drops_stale_page() {
    let api = MockApi::new();
    let feed = feed_with(&api, &SyncConfig::for_testing(), FeedSort::Hot).await;
    api.push_posts(vec![Post::new("n7", "c1", "Newest")], false);
    api.push_posts(vec![Post::new("h3", "c1", "Hot third")], true);
    api.hold();

    let (stale, ()) = tokio::join!(feed.load_more(), async {
        tokio::task::yield_now().await;
        assert!(feed.is_loading());
        api.stop_holding();
        assert_eq!(feed.set_sort(FeedSort::New).await.unwrap(), 1);
        api.release();
    });

    assert_eq!(stale.unwrap(), 0, "Hot page arriving after the switch is discarded");
    let ids: Vec<String> = feed.posts().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["n7"]);
    assert!(!feed.is_loading());
    assert!(!feed.has_more());

    let queries: Vec<(u32, FeedSort)> = api
        .post_queries
        .lock()
        .unwrap()
        .iter()
        .map(|q| (q.page, q.sort))
        .collect();
    assert_eq!(
        queries,
        vec![(1, FeedSort::Hot), (2, FeedSort::Hot), (1, FeedSort::New)]
    );
}
