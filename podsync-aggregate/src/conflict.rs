//! Conflict resolver (C3, spec §4.3). Pure functions: no I/O, no clock
//! reads — every timestamp they need is supplied by the caller so they stay
//! testable and so `resolve_sync(local, remote) == resolve_sync(remote,
//! local)` (up to resolution labels) holds for disjoint keys (spec §8).

use chrono::{DateTime, Utc};
use podsync_core::{FeedId, ItemId, PrivacyLevel};
use podsync_events::PlaylistItemRef;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    LocalWins,
    RemoteWins,
    Merged,
    NoConflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Subscription,
    PlayPosition,
    Playlist,
    Privacy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictInfo<T> {
    pub kind: ConflictKind,
    pub local: T,
    pub remote: T,
    pub resolution: Resolution,
    pub reason: String,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is representable")
}

// --- Subscription (LWW) -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSide {
    pub subscribed_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl SubscriptionSide {
    fn effective_timestamp(&self) -> DateTime<Utc> {
        self.subscribed_at
            .unwrap_or_else(epoch)
            .max(self.unsubscribed_at.unwrap_or_else(epoch))
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        match (self.subscribed_at, self.unsubscribed_at) {
            (Some(_), None) => true,
            (Some(sub), Some(unsub)) => sub > unsub,
            (None, _) => false,
        }
    }
}

/// Greater effective timestamp wins; on a tie, prefer the subscribed side
/// (spec §4.3, scenario 7).
pub fn resolve_subscription(
    local: SubscriptionSide,
    remote: SubscriptionSide,
) -> (SubscriptionSide, Resolution) {
    let local_ts = local.effective_timestamp();
    let remote_ts = remote.effective_timestamp();
    if local_ts > remote_ts {
        (local, Resolution::LocalWins)
    } else if remote_ts > local_ts {
        (remote, Resolution::RemoteWins)
    } else if local.is_subscribed() && !remote.is_subscribed() {
        (local, Resolution::Merged)
    } else if remote.is_subscribed() && !local.is_subscribed() {
        (remote, Resolution::Merged)
    } else {
        (local, Resolution::NoConflict)
    }
}

// --- Play position (highest-progress-wins with overrides) --------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaySide {
    pub position: u64,
    pub played: bool,
    pub updated_at: DateTime<Utc>,
    pub reset: bool,
}

pub fn resolve_play_position(
    local: PlaySide,
    remote: PlaySide,
) -> (PlaySide, Resolution, Option<&'static str>) {
    if local.reset {
        return (local, Resolution::LocalWins, Some("local reset requested"));
    }
    if local.played != remote.played {
        return if local.played {
            (local, Resolution::LocalWins, Some("local marked played"))
        } else {
            (remote, Resolution::RemoteWins, Some("remote marked played"))
        };
    }
    if local.position != remote.position {
        return if local.position > remote.position {
            (local, Resolution::LocalWins, Some("higher local position"))
        } else {
            (remote, Resolution::RemoteWins, Some("higher remote position"))
        };
    }
    if local.updated_at != remote.updated_at {
        return if local.updated_at > remote.updated_at {
            (local, Resolution::LocalWins, Some("newer local updated_at"))
        } else {
            (remote, Resolution::RemoteWins, Some("newer remote updated_at"))
        };
    }
    (local, Resolution::NoConflict, None)
}

// --- Playlist (three-way merge, LWW metadata) ---------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSide {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<PlaylistItemRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedPlaylist {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub items: Vec<PlaylistItemRef>,
}

fn item_key(item: &PlaylistItemRef) -> (FeedId, ItemId) {
    (item.feed.clone(), item.item.clone())
}

pub fn resolve_playlist(
    local: &PlaylistSide,
    remote: &PlaylistSide,
    base: Option<&[PlaylistItemRef]>,
) -> (MergedPlaylist, Resolution) {
    let base_set: HashSet<(FeedId, ItemId)> = base
        .unwrap_or(&[])
        .iter()
        .map(item_key)
        .collect();
    let local_set: HashSet<(FeedId, ItemId)> = local.items.iter().map(item_key).collect();
    let remote_set: HashSet<(FeedId, ItemId)> = remote.items.iter().map(item_key).collect();

    let local_removed: HashSet<_> = base_set.difference(&local_set).cloned().collect();
    let remote_removed: HashSet<_> = base_set.difference(&remote_set).cloned().collect();

    let mut surviving: HashSet<(FeedId, ItemId)> = local_set.union(&remote_set).cloned().collect();
    for victim in local_removed.iter().chain(remote_removed.iter()) {
        surviving.remove(victim);
    }

    // Order by each item's earliest appearance ("original position"),
    // local before remote on ties, then reindex 0..N-1 (spec §4.3, §8
    // scenario 5).
    let mut ordered: Vec<(usize, u8, PlaylistItemRef)> = Vec::new();
    for (idx, item) in local.items.iter().enumerate() {
        let key = item_key(item);
        if surviving.contains(&key) {
            ordered.push((idx, 0, item.clone()));
        }
    }
    for (idx, item) in remote.items.iter().enumerate() {
        let key = item_key(item);
        if surviving.contains(&key) && !local_set.contains(&key) {
            ordered.push((idx, 1, item.clone()));
        }
    }
    ordered.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    let items: Vec<PlaylistItemRef> = ordered.into_iter().map(|(_, _, item)| item).collect();

    let diverges = local_set != remote_set;
    let (meta, meta_resolution) = if local.updated_at >= remote.updated_at {
        (local, Resolution::LocalWins)
    } else {
        (remote, Resolution::RemoteWins)
    };
    let resolution = if diverges {
        Resolution::Merged
    } else {
        meta_resolution
    };

    (
        MergedPlaylist {
            name: meta.name.clone(),
            description: meta.description.clone(),
            is_public: meta.is_public,
            items,
        },
        resolution,
    )
}

// --- Privacy (LWW) ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrivacySide {
    pub level: PrivacyLevel,
    pub updated_at: DateTime<Utc>,
}

pub fn resolve_privacy(local: PrivacySide, remote: PrivacySide) -> (PrivacySide, Resolution) {
    if local.updated_at > remote.updated_at {
        (local, Resolution::LocalWins)
    } else if remote.updated_at > local.updated_at {
        (remote, Resolution::RemoteWins)
    } else {
        (local, Resolution::NoConflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        epoch() + Duration::seconds(secs)
    }

    #[test]
    fn tie_prefers_subscribed_side() {
        let local = SubscriptionSide {
            subscribed_at: Some(t(10)),
            unsubscribed_at: None,
        };
        let remote = SubscriptionSide {
            subscribed_at: None,
            unsubscribed_at: Some(t(10)),
        };
        let (winner, resolution) = resolve_subscription(local, remote);
        assert_eq!(resolution, Resolution::Merged);
        assert_eq!(winner, local);
    }

    #[test]
    fn highest_position_wins() {
        let local = PlaySide {
            position: 1500,
            played: false,
            updated_at: t(0),
            reset: false,
        };
        let remote = PlaySide {
            position: 2000,
            played: false,
            updated_at: t(-300),
            reset: false,
        };
        let (winner, resolution, reason) = resolve_play_position(local, remote);
        assert_eq!(resolution, Resolution::RemoteWins);
        assert_eq!(winner.position, 2000);
        assert_eq!(reason, Some("higher remote position"));
    }

    #[test]
    fn played_overrides_position() {
        let local = PlaySide {
            position: 1500,
            played: true,
            updated_at: t(0),
            reset: false,
        };
        let remote = PlaySide {
            position: 2000,
            played: false,
            updated_at: t(0),
            reset: false,
        };
        let (winner, resolution, _) = resolve_play_position(local, remote);
        assert_eq!(resolution, Resolution::LocalWins);
        assert!(winner.played);
    }

    #[test]
    fn playlist_three_way_merge() {
        let a = PlaylistItemRef {
            feed: FeedId::from("F1"),
            item: ItemId::from("A"),
        };
        let b = PlaylistItemRef {
            feed: FeedId::from("F1"),
            item: ItemId::from("B"),
        };
        let c = PlaylistItemRef {
            feed: FeedId::from("F1"),
            item: ItemId::from("C"),
        };
        let base = vec![a.clone()];
        let local = PlaylistSide {
            name: "mix".into(),
            description: None,
            is_public: false,
            updated_at: t(0),
            items: vec![a.clone(), b.clone()],
        };
        let remote = PlaylistSide {
            name: "mix".into(),
            description: None,
            is_public: false,
            updated_at: t(0),
            items: vec![a.clone(), c.clone()],
        };
        let (merged, resolution) = resolve_playlist(&local, &remote, Some(&base));
        assert_eq!(resolution, Resolution::Merged);
        assert_eq!(merged.items, vec![a, b, c]);
    }

    #[test]
    fn disjoint_subscription_merge_is_commutative_in_resolution() {
        let f1 = SubscriptionSide {
            subscribed_at: Some(t(5)),
            unsubscribed_at: None,
        };
        let f2 = SubscriptionSide {
            subscribed_at: Some(t(1)),
            unsubscribed_at: None,
        };
        // Disjoint single-key comparisons: swapping sides just swaps which
        // label wins, the winner's *value* is unaffected either way.
        let (winner_a, _) = resolve_subscription(f1, f2);
        let (winner_b, _) = resolve_subscription(f2, f1);
        assert_eq!(winner_a, winner_b);
    }
}
