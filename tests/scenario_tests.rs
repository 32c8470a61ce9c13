//! End-to-end scenarios driven through the dispatcher, process manager and
//! compaction worker together, not just pure `decide`/conflict functions.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use podsync_aggregate::Command;
use podsync_compaction::{CompactionOptions, CompactionWorker};
use podsync_core::{CollectionId, FeedId, FixedClock, SourceId, UserId};
use podsync_dispatcher::{Dispatcher, DispatcherOptions};
use podsync_events::{EventLog, InMemoryEventLog};
use podsync_process_manager::{InMemoryCheckpointStore, ProcessManager};
use podsync_projections::{ActivityProjector, PopularityTable, PublicEventsTable, UserPrivacyTable};
use std::sync::Arc;
use std::time::Duration;

fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

struct Harness {
    log: Arc<InMemoryEventLog>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<FixedClock>,
    _process_manager_handle: tokio::task::JoinHandle<()>,
}

fn harness() -> Harness {
    let log = Arc::new(InMemoryEventLog::new());
    let clock = Arc::new(FixedClock::at(start_time()));
    let dispatcher = Arc::new(Dispatcher::new(log.clone(), clock.clone(), DispatcherOptions::default()));
    let process_manager = Arc::new(ProcessManager::new(
        log.clone(),
        dispatcher.clone(),
        Arc::new(InMemoryCheckpointStore::new()),
    ));
    let handle = process_manager.spawn();
    Harness {
        log,
        dispatcher,
        clock,
        _process_manager_handle: handle,
    }
}

#[tokio::test]
async fn first_subscribe_creates_default_collection() {
    let h = harness();
    let user = UserId::from("u1");
    let feed = FeedId::from("feed-1");

    h.dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe {
                feed: feed.clone(),
                source_id: SourceId::from("src-1"),
                subscribed_at: None,
            },
            None,
        )
        .await
        .unwrap();

    // Give the process manager's background task a moment to react.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut stream = h.log.read_stream(&user, 0);
    let mut saw_default_created = false;
    let mut saw_feed_added = false;
    let expected_default = CollectionId::default_for_user(&user);
    while let Some(result) = stream.next().await {
        let stored = result.unwrap();
        match stored.payload {
            podsync_events::EventPayload::CollectionCreated { collection_id, is_default, .. } => {
                if is_default {
                    assert_eq!(collection_id, expected_default);
                    saw_default_created = true;
                }
            }
            podsync_events::EventPayload::FeedAddedToCollection { collection_id, feed: added } => {
                if collection_id == expected_default && added == feed {
                    saw_feed_added = true;
                }
            }
            _ => {}
        }
    }
    assert!(saw_default_created, "subscribing for the first time must create the default collection");
    assert!(saw_feed_added, "the subscribed feed must land in the default collection");
}

#[tokio::test]
async fn duplicate_default_collection_creation_is_benign() {
    let h = harness();
    let user = UserId::from("u1");

    h.dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe {
                feed: FeedId::from("feed-1"),
                source_id: SourceId::from("src-1"),
                subscribed_at: None,
            },
            None,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe {
                feed: FeedId::from("feed-2"),
                source_id: SourceId::from("src-2"),
                subscribed_at: None,
            },
            None,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let default_collection_count = {
        let mut stream = h.log.read_stream(&user, 0);
        let mut count = 0u32;
        while let Some(result) = stream.next().await {
            if let podsync_events::EventPayload::CollectionCreated { is_default: true, .. } = result.unwrap().payload {
                count += 1;
            }
        }
        count
    };
    assert_eq!(default_collection_count, 1, "only the first subscribe may create the default collection");
}

#[tokio::test]
async fn checkpoint_preserves_semantics() {
    let h = harness();
    let user = UserId::from("u1");
    let feed = FeedId::from("feed-1");
    let item = podsync_core::ItemId::from("item-1");

    h.dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe { feed: feed.clone(), source_id: SourceId::from("src-1"), subscribed_at: None },
            None,
        )
        .await
        .unwrap();
    h.dispatcher
        .dispatch(
            user.clone(),
            Command::RecordPlay { feed: feed.clone(), item: item.clone(), position: 42, played: false },
            None,
        )
        .await
        .unwrap();

    let activity = Arc::new(ActivityProjector::new(
        Arc::new(PublicEventsTable::default()),
        Arc::new(PopularityTable::default()),
        Arc::new(UserPrivacyTable::default()),
    ));
    let compaction = Arc::new(CompactionWorker::new(
        h.log.clone(),
        h.dispatcher.clone(),
        activity,
        h.clock.clone(),
        CompactionOptions {
            tick_interval: Duration::from_secs(900),
            retention_checkpoint_days: 45,
            retention_prune_days: 31,
        },
    ));
    let (tracker, ticker) = compaction.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.clock.advance(ChronoDuration::days(60));
    compaction.run_once().await;
    tracker.abort();
    ticker.abort();

    // Force a reload from the checkpoint-only tail by dispatching a
    // no-op-shaped command and inspecting the resulting state through the
    // dispatcher's own aggregate cache.
    let events = h
        .dispatcher
        .dispatch(
            user.clone(),
            Command::UpdatePosition { feed: feed.clone(), item: item.clone(), position: 42 },
            None,
        )
        .await
        .unwrap();
    // Position is unchanged, but PositionUpdated is not an idempotency-aware
    // command, so it is expected to still record the event; what matters is
    // that the feed is still subscribed after replay-from-checkpoint.
    assert!(!events.is_empty());

    let version = h.log.current_version(&user).await;
    assert!(version >= 3, "subscribe, play, checkpoint, and the position update");
}

#[tokio::test]
async fn subscription_tie_prefers_subscribed_side() {
    let h = harness();
    let user = UserId::from("u1");
    let feed = FeedId::from("feed-1");
    let tie = start_time();

    h.dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe {
                feed: feed.clone(),
                source_id: SourceId::from("src-1"),
                subscribed_at: Some(tie),
            },
            None,
        )
        .await
        .unwrap();

    let events = h
        .dispatcher
        .dispatch(
            user.clone(),
            Command::Sync {
                subscriptions: vec![podsync_events::SubscriptionSnapshot {
                    feed: feed.clone(),
                    source_id: SourceId::from("src-2"),
                    subscribed_at: tie - ChronoDuration::hours(1),
                    unsubscribed_at: Some(tie),
                }],
                play_statuses: vec![],
                playlists: vec![],
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    match &events[0] {
        podsync_events::EventPayload::UserSubscribed { subscribed_at, .. } => {
            assert_eq!(*subscribed_at, tie, "the subscribed side must win the tie");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
