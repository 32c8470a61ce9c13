//! Property-based tests for the conflict resolver (C3): complements the
//! worked examples in the aggregate crate's own unit tests with randomized
//! coverage of the commutativity and highest-progress-wins laws.

use chrono::{DateTime, TimeZone, Utc};
use podsync_aggregate::conflict::{resolve_play_position, resolve_playlist, resolve_subscription, PlaySide, PlaylistSide, SubscriptionSide};
use podsync_core::{FeedId, ItemId};
use podsync_events::PlaylistItemRef;
use proptest::prelude::*;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs.max(0), 0).unwrap()
}

fn subscription_side(subscribed_secs: Option<i64>, unsubscribed_secs: Option<i64>) -> SubscriptionSide {
    SubscriptionSide {
        subscribed_at: subscribed_secs.map(at),
        unsubscribed_at: unsubscribed_secs.map(at),
    }
}

proptest! {
    /// Swapping which side is "local" and which is "remote" never changes
    /// the winning value, only which `Resolution` label it's reported
    /// under (spec §8: merge must be commutative for disjoint inputs).
    #[test]
    fn subscription_resolution_is_commutative(
        sub_a in proptest::option::of(0i64..1_000_000),
        unsub_a in proptest::option::of(0i64..1_000_000),
        sub_b in proptest::option::of(0i64..1_000_000),
        unsub_b in proptest::option::of(0i64..1_000_000),
    ) {
        let a = subscription_side(sub_a, unsub_a);
        let b = subscription_side(sub_b, unsub_b);
        let (winner_ab, _) = resolve_subscription(a, b);
        let (winner_ba, _) = resolve_subscription(b, a);
        prop_assert_eq!(winner_ab, winner_ba);
    }

    /// The side with strictly higher position always wins when neither is
    /// marked played and neither requests a reset (spec §4.3,
    /// highest-progress-wins).
    #[test]
    fn higher_position_always_wins_absent_played_or_reset(
        pos_a in 0u64..100_000,
        pos_b in 0u64..100_000,
        ts_a in 0i64..1_000_000,
        ts_b in 0i64..1_000_000,
    ) {
        prop_assume!(pos_a != pos_b);
        let a = PlaySide { position: pos_a, played: false, updated_at: at(ts_a), reset: false };
        let b = PlaySide { position: pos_b, played: false, updated_at: at(ts_b), reset: false };
        let (winner, _, _) = resolve_play_position(a, b);
        let expected = pos_a.max(pos_b);
        prop_assert_eq!(winner.position, expected);
    }

    /// A side marked `played` always wins over one that isn't, regardless
    /// of position or timestamp (spec §4.3 scenario 4).
    #[test]
    fn played_beats_unplayed_regardless_of_position(
        pos_a in 0u64..100_000,
        pos_b in 0u64..100_000,
        ts_a in 0i64..1_000_000,
        ts_b in 0i64..1_000_000,
    ) {
        let a = PlaySide { position: pos_a, played: true, updated_at: at(ts_a), reset: false };
        let b = PlaySide { position: pos_b, played: false, updated_at: at(ts_b), reset: false };
        let (winner, _, _) = resolve_play_position(a, b);
        prop_assert!(winner.played);
        prop_assert_eq!(winner.position, pos_a);
    }

    /// Merging two playlists built from disjoint item sets (no shared base)
    /// preserves every item from both sides exactly once.
    #[test]
    fn disjoint_playlist_merge_preserves_every_item(
        local_count in 0usize..6,
        remote_count in 0usize..6,
    ) {
        let local_items: Vec<PlaylistItemRef> = (0..local_count)
            .map(|i| PlaylistItemRef { feed: FeedId::from("f1"), item: ItemId::from(format!("local-{i}").as_str()) })
            .collect();
        let remote_items: Vec<PlaylistItemRef> = (0..remote_count)
            .map(|i| PlaylistItemRef { feed: FeedId::from("f1"), item: ItemId::from(format!("remote-{i}").as_str()) })
            .collect();

        let local = PlaylistSide {
            name: "mix".into(),
            description: None,
            is_public: false,
            updated_at: at(0),
            items: local_items.clone(),
        };
        let remote = PlaylistSide {
            name: "mix".into(),
            description: None,
            is_public: false,
            updated_at: at(0),
            items: remote_items.clone(),
        };
        let (merged, _) = resolve_playlist(&local, &remote, None);
        prop_assert_eq!(merged.items.len(), local_count + remote_count);
        for item in local_items.iter().chain(remote_items.iter()) {
            prop_assert!(merged.items.contains(item));
        }
    }
}
