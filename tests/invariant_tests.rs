//! Quantified invariants from the aggregate and event log contracts,
//! exercised against the dispatcher/event-log stack rather than in
//! isolation.

use chrono::Utc;
use futures::StreamExt;
use podsync_aggregate::{fold, Command};
use podsync_core::{CollectionId, FeedId, FixedClock, ItemId, SourceId, UserId};
use podsync_dispatcher::{Dispatcher, DispatcherOptions};
use podsync_events::{EventLog, InMemoryEventLog};
use std::sync::Arc;

fn dispatcher() -> (Arc<Dispatcher>, Arc<InMemoryEventLog>) {
    let log = Arc::new(InMemoryEventLog::new());
    let clock = Arc::new(FixedClock::at(Utc::now()));
    (Arc::new(Dispatcher::new(log.clone(), clock, DispatcherOptions::default())), log)
}

#[tokio::test]
async fn stream_versions_are_contiguous_from_one() {
    let (dispatcher, log) = dispatcher();
    let user = UserId::from("u1");

    for i in 0..5 {
        dispatcher
            .dispatch(
                user.clone(),
                Command::Subscribe {
                    feed: FeedId::from(format!("feed-{i}").as_str()),
                    source_id: SourceId::from("src"),
                    subscribed_at: None,
                },
                None,
            )
            .await
            .unwrap();
    }

    let mut stream = log.read_stream(&user, 0);
    let mut expected = 1u64;
    while let Some(result) = stream.next().await {
        let stored = result.unwrap();
        assert_eq!(stored.stream_version, expected, "stream versions must be gap-free and strictly increasing");
        expected += 1;
    }
    assert_eq!(expected, 6);
}

#[tokio::test]
async fn global_position_is_strictly_increasing_across_streams() {
    let (dispatcher, log) = dispatcher();

    dispatcher
        .dispatch(
            UserId::from("u1"),
            Command::Subscribe { feed: FeedId::from("f1"), source_id: SourceId::from("s1"), subscribed_at: None },
            None,
        )
        .await
        .unwrap();
    dispatcher
        .dispatch(
            UserId::from("u2"),
            Command::Subscribe { feed: FeedId::from("f2"), source_id: SourceId::from("s2"), subscribed_at: None },
            None,
        )
        .await
        .unwrap();

    let mut stream = log.read_all(0);
    let mut last_position: Option<u64> = None;
    let mut count = 0;
    while let Some(result) = stream.next().await {
        let stored = result.unwrap();
        if let Some(last) = last_position {
            assert!(stored.position > last, "global position must be strictly increasing");
        }
        last_position = Some(stored.position);
        count += 1;
    }
    assert_eq!(count, 2);
}

#[tokio::test]
async fn checkpoint_fold_is_equivalent_to_folding_from_genesis() {
    let (dispatcher, log) = dispatcher();
    let user = UserId::from("u1");
    let feed = FeedId::from("feed-1");
    let item = ItemId::from("item-1");

    dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe { feed: feed.clone(), source_id: SourceId::from("src-1"), subscribed_at: None },
            None,
        )
        .await
        .unwrap();
    dispatcher
        .dispatch(
            user.clone(),
            Command::RecordPlay { feed: feed.clone(), item: item.clone(), position: 10, played: false },
            None,
        )
        .await
        .unwrap();
    dispatcher
        .dispatch(user.clone(), Command::Snapshot { cleanup_old_events: false }, None)
        .await
        .unwrap();
    dispatcher
        .dispatch(
            user.clone(),
            Command::RecordPlay { feed: feed.clone(), item: item.clone(), position: 20, played: true },
            None,
        )
        .await
        .unwrap();

    let all_events: Vec<_> = {
        let mut stream = log.read_stream(&user, 0);
        let mut out = Vec::new();
        while let Some(result) = stream.next().await {
            out.push(result.unwrap().payload);
        }
        out
    };
    let from_genesis = fold(&user, all_events.iter());

    let checkpoint_index = all_events.iter().rposition(|e| e.is_checkpoint()).unwrap();
    let from_checkpoint = fold(&user, all_events[checkpoint_index..].iter());

    assert_eq!(from_genesis.play_statuses, from_checkpoint.play_statuses);
    assert_eq!(from_genesis.subscriptions.len(), from_checkpoint.subscriptions.len());
    assert!(from_genesis.is_subscribed(&feed));
    assert!(from_checkpoint.is_subscribed(&feed));
}

#[tokio::test]
async fn at_most_one_default_collection_per_user() {
    let (dispatcher, _log) = dispatcher();
    let user = UserId::from("u1");
    let collection_id = CollectionId::default_for_user(&user);

    dispatcher
        .dispatch(
            user.clone(),
            Command::CreateCollection {
                collection_id: Some(collection_id),
                title: "All Subscriptions".into(),
                is_default: true,
                description: None,
                color: None,
            },
            None,
        )
        .await
        .unwrap();

    let err = dispatcher
        .dispatch(
            user.clone(),
            Command::CreateCollection {
                collection_id: None,
                title: "Yet Another Default".into(),
                is_default: true,
                description: None,
                color: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        podsync_core::DispatchError::Domain(podsync_core::DomainError::DefaultCollectionExists)
    ));
}

#[tokio::test]
async fn playlist_table_reindexes_positions_contiguously_after_replace() {
    use podsync_projections::{PlaylistItemRow, PlaylistsTable};

    let table = PlaylistsTable::default();
    let playlist_id = podsync_core::PlaylistId::new();
    let row = |item: &str| PlaylistItemRow {
        playlist_id,
        feed: FeedId::from("f1"),
        item: ItemId::from(item),
        item_title: None,
        feed_title: None,
        position: 99,
    };

    table.replace_items(playlist_id, vec![row("a"), row("b"), row("c")]);
    let positions: Vec<usize> = table.items_for(&playlist_id).iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![0, 1, 2], "positions must be reindexed to 0..N-1 regardless of input");

    table.remove_item(&playlist_id, &FeedId::from("f1"), &ItemId::from("b"));
    let positions: Vec<usize> = table.items_for(&playlist_id).iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![0, 1], "removing an item must reindex the remainder contiguously");
}

#[tokio::test]
async fn playlist_table_upsert_item_dedups_by_feed_and_item() {
    use podsync_projections::{PlaylistItemRow, PlaylistsTable};

    let table = PlaylistsTable::default();
    let playlist_id = podsync_core::PlaylistId::new();
    let row = PlaylistItemRow {
        playlist_id,
        feed: FeedId::from("f1"),
        item: ItemId::from("a"),
        item_title: None,
        feed_title: None,
        position: 0,
    };
    table.upsert_item(playlist_id, row.clone());
    let mut updated = row;
    updated.item_title = Some("retitled".into());
    table.upsert_item(playlist_id, updated);

    let items = table.items_for(&playlist_id);
    assert_eq!(items.len(), 1, "re-saving the same (feed, item) must update in place, not duplicate");
    assert_eq!(items[0].item_title.as_deref(), Some("retitled"));
}

#[tokio::test]
async fn feed_must_be_subscribed_before_joining_a_collection() {
    let (dispatcher, log) = dispatcher();
    let user = UserId::from("u1");

    dispatcher
        .dispatch(
            user.clone(),
            Command::CreateCollection {
                collection_id: None,
                title: "Favorites".into(),
                is_default: false,
                description: None,
                color: None,
            },
            None,
        )
        .await
        .unwrap();

    // Recover the collection id by reading the stream back.
    let collection_id = {
        let mut stream = log.read_stream(&user, 0);
        let mut found = None;
        while let Some(result) = stream.next().await {
            if let podsync_events::EventPayload::CollectionCreated { collection_id, .. } = result.unwrap().payload {
                found = Some(collection_id);
            }
        }
        found.unwrap()
    };

    let err = dispatcher
        .dispatch(
            user.clone(),
            Command::AddFeedToCollection { collection_id, feed: FeedId::from("unsubscribed-feed") },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        podsync_core::DispatchError::Domain(podsync_core::DomainError::FeedNotSubscribed)
    ));

    dispatcher
        .dispatch(
            user.clone(),
            Command::Subscribe { feed: FeedId::from("unsubscribed-feed"), source_id: SourceId::from("src"), subscribed_at: None },
            None,
        )
        .await
        .unwrap();
    dispatcher
        .dispatch(
            user.clone(),
            Command::AddFeedToCollection { collection_id, feed: FeedId::from("unsubscribed-feed") },
            None,
        )
        .await
        .unwrap();
}
