//! Checkpoint construction (C7, spec §4.7). Building the `UserCheckpoint`
//! payload is pure; physically pruning older events is the compaction
//! worker's job once this event is durably appended.

use crate::state::UserAggregateState;
use chrono::{DateTime, Duration, Utc};
use podsync_events::{
    CollectionSnapshot, EventPayload, PlayStatusSnapshot, PlaylistSnapshot, SubscriptionSnapshot,
};

/// Default retention threshold (`T_old`, spec §4.7): subscriptions
/// unsubscribed before this age, and playlists deleted before this age, are
/// dropped from the snapshot.
pub const DEFAULT_RETENTION_DAYS: i64 = 45;

pub fn build_checkpoint(
    state: &UserAggregateState,
    now: DateTime<Utc>,
    cleanup_old_events: bool,
) -> EventPayload {
    let cutoff = if cleanup_old_events {
        Some(now - Duration::days(DEFAULT_RETENTION_DAYS))
    } else {
        None
    };

    let subscriptions = state
        .subscriptions
        .iter()
        .filter(|(_, sub)| {
            let stale_unsubscribe = sub
                .unsubscribed_at
                .map(|unsub| unsub > sub.subscribed_at && cutoff.map(|c| unsub < c).unwrap_or(false))
                .unwrap_or(false);
            !stale_unsubscribe
        })
        .map(|(feed, sub)| SubscriptionSnapshot {
            feed: feed.clone(),
            source_id: sub.source_id.clone(),
            subscribed_at: sub.subscribed_at,
            unsubscribed_at: sub.unsubscribed_at,
        })
        .collect();

    let play_statuses = state
        .play_statuses
        .iter()
        .map(|(item, status)| PlayStatusSnapshot {
            item: item.clone(),
            feed: status.feed.clone(),
            position: status.position,
            played: status.played,
            updated_at: status.updated_at,
        })
        .collect();

    let playlists = state
        .playlists
        .iter()
        .filter(|(_, playlist)| {
            let stale_delete = playlist
                .deleted_at
                .map(|deleted_at| cutoff.map(|c| deleted_at < c).unwrap_or(false))
                .unwrap_or(false);
            !stale_delete
        })
        .map(|(id, playlist)| PlaylistSnapshot {
            playlist_id: *id,
            name: playlist.name.clone(),
            description: playlist.description.clone(),
            is_public: playlist.is_public,
            items: playlist.items.clone(),
        })
        .collect();

    let collections = state
        .collections
        .iter()
        .filter(|(_, collection)| !collection.deleted)
        .map(|(id, collection)| CollectionSnapshot {
            collection_id: *id,
            title: collection.title.clone(),
            is_default: collection.is_default,
            color: collection.color.clone(),
            description: collection.description.clone(),
            is_public: collection.is_public,
            feed_order: collection.feed_order.clone(),
        })
        .collect();

    EventPayload::UserCheckpoint {
        subscriptions,
        play_statuses,
        playlists,
        collections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PlaylistState, SubscriptionState};
    use podsync_core::{FeedId, SourceId};

    fn t(days_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::days(days_ago)
    }

    #[test]
    fn drops_long_unsubscribed_feeds_when_cleaning() {
        let mut state = UserAggregateState::default();
        state.subscriptions.insert(
            FeedId::from("stale"),
            SubscriptionState {
                source_id: SourceId::from("s1"),
                subscribed_at: t(200),
                unsubscribed_at: Some(t(100)),
            },
        );
        state.subscriptions.insert(
            FeedId::from("fresh"),
            SubscriptionState {
                source_id: SourceId::from("s2"),
                subscribed_at: t(10),
                unsubscribed_at: None,
            },
        );
        let checkpoint = build_checkpoint(&state, Utc::now(), true);
        match checkpoint {
            EventPayload::UserCheckpoint { subscriptions, .. } => {
                assert_eq!(subscriptions.len(), 1);
                assert_eq!(subscriptions[0].feed, FeedId::from("fresh"));
            }
            _ => panic!("expected UserCheckpoint"),
        }
    }

    #[test]
    fn keeps_everything_when_not_cleaning() {
        let mut state = UserAggregateState::default();
        state.playlists.insert(
            podsync_core::PlaylistId::new(),
            PlaylistState {
                deleted_at: Some(t(200)),
                ..Default::default()
            },
        );
        let checkpoint = build_checkpoint(&state, Utc::now(), false);
        match checkpoint {
            EventPayload::UserCheckpoint { playlists, .. } => assert_eq!(playlists.len(), 1),
            _ => panic!("expected UserCheckpoint"),
        }
    }
}
