//! Concrete read-model builders (spec §4.5). Each one is a thin,
//! independently-checkpointed fold over the log onto its own table(s).

use crate::models::{
    CollectionRow, PlayStatusRow, PlaylistItemRow, PlaylistRow, PopularityTable, PrivacyScopeKeyInput,
    PublicEventKind, PublicEventRow, PublicEventsTable, SubscriptionRow, SubscriptionsTable, PlayStatusesTable,
    PlaylistsTable, UserPrivacyTable, CollectionsTable, WEIGHT_PLAY, WEIGHT_SAVE, WEIGHT_SHARE, WEIGHT_SUBSCRIBE,
};
use crate::projector::Projector;
use dashmap::DashMap;
use podsync_core::{PrivacyLevel, ProjectorError, UserId};
use podsync_events::{EventPayload, PrivacyScopeTag, StoredEvent};
use std::sync::Arc;

fn failed(projector: &str, event: &StoredEvent, reason: impl Into<String>) -> ProjectorError {
    ProjectorError::Failed {
        projector: projector.to_string(),
        position: event.position,
        reason: reason.into(),
    }
}

pub struct SubscriptionsProjector {
    pub table: Arc<SubscriptionsTable>,
}

impl Projector for SubscriptionsProjector {
    fn name(&self) -> &'static str {
        "subscriptions"
    }

    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError> {
        match &event.payload {
            EventPayload::UserSubscribed { feed, source_id, subscribed_at } => {
                self.table.upsert(SubscriptionRow {
                    user_id: event.stream_id.clone(),
                    feed: feed.clone(),
                    source_id: source_id.clone(),
                    feed_title: None,
                    subscribed_at: *subscribed_at,
                    unsubscribed_at: None,
                });
                Ok(())
            }
            EventPayload::UserUnsubscribed { feed, unsubscribed_at, .. } => {
                if let Some(mut row) = self.table.get(&event.stream_id, feed) {
                    row.unsubscribed_at = Some(*unsubscribed_at);
                    self.table.upsert(row);
                }
                Ok(())
            }
            EventPayload::UserCheckpoint { subscriptions, .. } => {
                for snap in subscriptions {
                    self.table.upsert(SubscriptionRow {
                        user_id: event.stream_id.clone(),
                        feed: snap.feed.clone(),
                        source_id: snap.source_id.clone(),
                        feed_title: None,
                        subscribed_at: snap.subscribed_at,
                        unsubscribed_at: snap.unsubscribed_at,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub struct PlayStatusProjector {
    pub table: Arc<PlayStatusesTable>,
}

impl Projector for PlayStatusProjector {
    fn name(&self) -> &'static str {
        "play_statuses"
    }

    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError> {
        match &event.payload {
            EventPayload::PlayRecorded { feed, item, position, played, at } => {
                self.table.upsert(PlayStatusRow {
                    user_id: event.stream_id.clone(),
                    feed: feed.clone(),
                    item: item.clone(),
                    position: *position,
                    played: *played,
                    updated_at: *at,
                });
                Ok(())
            }
            EventPayload::PositionUpdated { feed, item, position, at } => {
                let mut row = self.table.get(&event.stream_id, item).unwrap_or(PlayStatusRow {
                    user_id: event.stream_id.clone(),
                    feed: feed.clone(),
                    item: item.clone(),
                    position: 0,
                    played: false,
                    updated_at: *at,
                });
                row.position = *position;
                row.updated_at = *at;
                self.table.upsert(row);
                Ok(())
            }
            EventPayload::UserCheckpoint { play_statuses, .. } => {
                for snap in play_statuses {
                    self.table.upsert(PlayStatusRow {
                        user_id: event.stream_id.clone(),
                        feed: snap.feed.clone(),
                        item: snap.item.clone(),
                        position: snap.position,
                        played: snap.played,
                        updated_at: snap.updated_at,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub struct PlaylistsProjector {
    pub table: Arc<PlaylistsTable>,
}

impl Projector for PlaylistsProjector {
    fn name(&self) -> &'static str {
        "playlists"
    }

    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError> {
        match &event.payload {
            EventPayload::PlaylistCreated { playlist_id, name, description } => {
                self.table.upsert_playlist(PlaylistRow {
                    playlist_id: *playlist_id,
                    user_id: event.stream_id.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    is_public: false,
                    deleted_at: None,
                });
                Ok(())
            }
            EventPayload::PlaylistUpdated { playlist_id, name, description, .. } => {
                let mut row = self.table.get_playlist(playlist_id).ok_or_else(|| {
                    failed("playlists", event, "PlaylistUpdated for unknown playlist")
                })?;
                if let Some(name) = name {
                    row.name = name.clone();
                }
                if description.is_some() {
                    row.description = description.clone();
                }
                self.table.upsert_playlist(row);
                Ok(())
            }
            EventPayload::PlaylistDeleted { playlist_id, at } => {
                if let Some(mut row) = self.table.get_playlist(playlist_id) {
                    row.deleted_at = Some(*at);
                    self.table.upsert_playlist(row);
                }
                Ok(())
            }
            EventPayload::PlaylistVisibilityChanged { playlist_id, is_public, .. } => {
                if let Some(mut row) = self.table.get_playlist(playlist_id) {
                    row.is_public = *is_public;
                    self.table.upsert_playlist(row);
                }
                Ok(())
            }
            EventPayload::PlaylistReordered { playlist_id, items } => {
                let existing = self.table.items_for(playlist_id);
                let rows = items
                    .iter()
                    .map(|item_ref| {
                        let titles = existing
                            .iter()
                            .find(|r| r.feed == item_ref.feed && r.item == item_ref.item);
                        PlaylistItemRow {
                            playlist_id: *playlist_id,
                            feed: item_ref.feed.clone(),
                            item: item_ref.item.clone(),
                            item_title: titles.and_then(|r| r.item_title.clone()),
                            feed_title: titles.and_then(|r| r.feed_title.clone()),
                            position: 0,
                        }
                    })
                    .collect();
                self.table.replace_items(*playlist_id, rows);
                Ok(())
            }
            EventPayload::EpisodeSaved { playlist, feed, item, item_title, feed_title } => {
                self.table.upsert_item(*playlist, PlaylistItemRow {
                    playlist_id: *playlist,
                    feed: feed.clone(),
                    item: item.clone(),
                    item_title: item_title.clone(),
                    feed_title: feed_title.clone(),
                    position: 0,
                });
                Ok(())
            }
            EventPayload::EpisodeUnsaved { playlist, feed, item } => {
                self.table.remove_item(playlist, feed, item);
                Ok(())
            }
            EventPayload::UserCheckpoint { playlists, .. } => {
                for snap in playlists {
                    self.table.upsert_playlist(PlaylistRow {
                        playlist_id: snap.playlist_id,
                        user_id: event.stream_id.clone(),
                        name: snap.name.clone(),
                        description: snap.description.clone(),
                        is_public: snap.is_public,
                        deleted_at: None,
                    });
                    let rows = snap
                        .items
                        .iter()
                        .map(|item_ref| PlaylistItemRow {
                            playlist_id: snap.playlist_id,
                            feed: item_ref.feed.clone(),
                            item: item_ref.item.clone(),
                            item_title: None,
                            feed_title: None,
                            position: 0,
                        })
                        .collect();
                    self.table.replace_items(snap.playlist_id, rows);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

pub struct PrivacyProjector {
    pub table: Arc<UserPrivacyTable>,
}

impl Projector for PrivacyProjector {
    fn name(&self) -> &'static str {
        "user_privacy"
    }

    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError> {
        if let EventPayload::PrivacyChanged { scope, feed, item, level, .. } = &event.payload {
            let key = match scope {
                PrivacyScopeTag::Global => PrivacyScopeKeyInput::Global,
                PrivacyScopeTag::Feed => PrivacyScopeKeyInput::Feed(
                    feed.clone().ok_or_else(|| failed("user_privacy", event, "feed scope missing feed id"))?,
                ),
                PrivacyScopeTag::Item => PrivacyScopeKeyInput::Item(
                    item.clone().ok_or_else(|| failed("user_privacy", event, "item scope missing item id"))?,
                ),
            };
            self.table.set(&event.stream_id, key, *level);
        }
        Ok(())
    }
}

pub struct CollectionsProjector {
    pub table: Arc<CollectionsTable>,
}

impl Projector for CollectionsProjector {
    fn name(&self) -> &'static str {
        "collections"
    }

    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError> {
        match &event.payload {
            EventPayload::CollectionCreated { collection_id, title, is_default, description, color } => {
                self.table.upsert(CollectionRow {
                    collection_id: *collection_id,
                    user_id: event.stream_id.clone(),
                    title: title.clone(),
                    is_default: *is_default,
                    color: color.clone(),
                    description: description.clone(),
                    is_public: false,
                    deleted_at: None,
                });
                Ok(())
            }
            EventPayload::CollectionUpdated { collection_id, title, description, color } => {
                let mut row = self.table.get(collection_id).ok_or_else(|| {
                    failed("collections", event, "CollectionUpdated for unknown collection")
                })?;
                if let Some(title) = title {
                    row.title = title.clone();
                }
                if description.is_some() {
                    row.description = description.clone();
                }
                if color.is_some() {
                    row.color = color.clone();
                }
                self.table.upsert(row);
                Ok(())
            }
            EventPayload::CollectionDeleted { collection_id } => {
                if let Some(mut row) = self.table.get(collection_id) {
                    row.deleted_at = Some(event.timestamp);
                    self.table.upsert(row);
                }
                Ok(())
            }
            EventPayload::CollectionVisibilityChanged { collection_id, is_public } => {
                if let Some(mut row) = self.table.get(collection_id) {
                    row.is_public = *is_public;
                    self.table.upsert(row);
                }
                Ok(())
            }
            EventPayload::FeedAddedToCollection { collection_id, feed } => {
                let mut feeds = self.table.feeds_for(collection_id);
                if !feeds.contains(feed) {
                    feeds.push(feed.clone());
                }
                self.table.set_feeds(*collection_id, feeds);
                Ok(())
            }
            EventPayload::FeedRemovedFromCollection { collection_id, feed } => {
                let mut feeds = self.table.feeds_for(collection_id);
                feeds.retain(|f| f != feed);
                self.table.set_feeds(*collection_id, feeds);
                Ok(())
            }
            EventPayload::CollectionFeedReordered { collection_id, feed_order, .. } => {
                self.table.set_feeds(*collection_id, feed_order.clone());
                Ok(())
            }
            EventPayload::UserCheckpoint { collections, .. } => {
                for snap in collections {
                    self.table.upsert(CollectionRow {
                        collection_id: snap.collection_id,
                        user_id: event.stream_id.clone(),
                        title: snap.title.clone(),
                        is_default: snap.is_default,
                        color: snap.color.clone(),
                        description: snap.description.clone(),
                        is_public: snap.is_public,
                        deleted_at: None,
                    });
                    self.table.set_feeds(snap.collection_id, snap.feed_order.clone());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// One activity candidate recorded for a user, independent of its current
/// privacy-gated visibility — needed so `PrivacyChanged` can recompute
/// membership without re-reading the whole log (spec §4.5's reconciliation
/// note).
#[derive(Debug, Clone)]
struct Candidate {
    row: PublicEventRow,
    weight: i64,
    /// Stream version of the source event, so compaction can retract a
    /// candidate's popularity contribution once its event is physically
    /// pruned (spec §4.7 step 4).
    version: u64,
}

/// Builds `public_events` and the popularity accumulators together: both are
/// gated by the same "acting user's effective privacy is public" rule (spec
/// §4.5), so they share one privacy-aware candidate index.
pub struct ActivityProjector {
    pub public_events: Arc<PublicEventsTable>,
    pub popularity: Arc<PopularityTable>,
    pub privacy: Arc<UserPrivacyTable>,
    candidates: DashMap<UserId, Vec<Candidate>>,
}

impl ActivityProjector {
    pub fn new(public_events: Arc<PublicEventsTable>, popularity: Arc<PopularityTable>, privacy: Arc<UserPrivacyTable>) -> Self {
        Self {
            public_events,
            popularity,
            privacy,
            candidates: DashMap::new(),
        }
    }

    fn record(&self, user_id: &UserId, row: PublicEventRow, weight: i64, version: u64) {
        let mut list = self.candidates.entry(user_id.clone()).or_default();
        if list.iter().any(|c| c.row.event_id == row.event_id) {
            // Already recorded on a prior delivery of this event; redelivery
            // after a crash must not double-count its weight.
            return;
        }
        let is_public = self.privacy.effective(user_id, row.feed.as_ref(), row.item.as_ref()) == PrivacyLevel::Public;
        if is_public {
            self.public_events.insert(row.clone());
            self.popularity.add(row.feed.as_ref().expect("activity rows always carry a feed"), row.item.as_ref(), weight);
        }
        list.push(Candidate { row, weight, version });
    }

    /// Retracts the popularity contribution of every candidate whose source
    /// event has a stream version strictly before `before_version` — called
    /// after compaction physically prunes those events (spec §4.7 step 4:
    /// "score must equal the sum over surviving events"). `public_events`
    /// rows are left alone: they record that the activity happened, which
    /// outlives the raw event's retention.
    pub fn retract_pruned(&self, user_id: &UserId, before_version: u64) {
        let Some(mut list) = self.candidates.get_mut(user_id) else {
            return;
        };
        let (keep, pruned): (Vec<_>, Vec<_>) = list.drain(..).partition(|c| c.version >= before_version);
        *list = keep;
        for candidate in pruned {
            self.popularity.subtract(
                candidate.row.feed.as_ref().expect("activity rows always carry a feed"),
                candidate.row.item.as_ref(),
                candidate.weight,
            );
        }
    }

    fn reconcile(&self, user_id: &UserId) {
        let Some(list) = self.candidates.get(user_id) else {
            return;
        };
        for candidate in list.iter() {
            let is_public = self
                .privacy
                .effective(user_id, candidate.row.feed.as_ref(), candidate.row.item.as_ref())
                == PrivacyLevel::Public;
            let currently_listed = self.public_events.contains(&candidate.row.event_id);
            if is_public && !currently_listed {
                self.public_events.insert(candidate.row.clone());
                self.popularity.add(
                    candidate.row.feed.as_ref().expect("activity rows always carry a feed"),
                    candidate.row.item.as_ref(),
                    candidate.weight,
                );
            } else if !is_public && currently_listed {
                self.public_events.remove(&candidate.row.event_id);
                self.popularity.subtract(
                    candidate.row.feed.as_ref().expect("activity rows always carry a feed"),
                    candidate.row.item.as_ref(),
                    candidate.weight,
                );
            }
        }
    }

    fn remove_events(&self, user_id: &UserId, feed: Option<&podsync_core::FeedId>, item: Option<&podsync_core::ItemId>) {
        let Some(mut list) = self.candidates.get_mut(user_id) else {
            return;
        };
        let (keep, drop): (Vec<_>, Vec<_>) = list.drain(..).partition(|c| {
            let feed_matches = feed.map(|f| c.row.feed.as_ref() == Some(f)).unwrap_or(false);
            let item_matches = item.map(|i| c.row.item.as_ref() == Some(i)).unwrap_or(false);
            !(feed_matches || item_matches)
        });
        *list = keep;
        for candidate in drop {
            if self.public_events.contains(&candidate.row.event_id) {
                self.public_events.remove(&candidate.row.event_id);
                self.popularity.subtract(
                    candidate.row.feed.as_ref().expect("activity rows always carry a feed"),
                    candidate.row.item.as_ref(),
                    candidate.weight,
                );
            }
        }
    }
}

impl Projector for ActivityProjector {
    fn name(&self) -> &'static str {
        "activity"
    }

    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError> {
        match &event.payload {
            EventPayload::UserSubscribed { feed, .. } => {
                let row = PublicEventRow {
                    event_id: event.id,
                    user_id: event.stream_id.clone(),
                    feed: Some(feed.clone()),
                    item: None,
                    kind: PublicEventKind::Subscribed,
                    at: event.timestamp,
                };
                self.record(&event.stream_id, row, WEIGHT_SUBSCRIBE, event.stream_version);
                Ok(())
            }
            EventPayload::PlayRecorded { feed, item, .. } => {
                let row = PublicEventRow {
                    event_id: event.id,
                    user_id: event.stream_id.clone(),
                    feed: Some(feed.clone()),
                    item: Some(item.clone()),
                    kind: PublicEventKind::Played,
                    at: event.timestamp,
                };
                self.record(&event.stream_id, row, WEIGHT_PLAY, event.stream_version);
                Ok(())
            }
            EventPayload::EpisodeSaved { feed, item, .. } => {
                let row = PublicEventRow {
                    event_id: event.id,
                    user_id: event.stream_id.clone(),
                    feed: Some(feed.clone()),
                    item: Some(item.clone()),
                    kind: PublicEventKind::Saved,
                    at: event.timestamp,
                };
                self.record(&event.stream_id, row, WEIGHT_SAVE, event.stream_version);
                Ok(())
            }
            EventPayload::EpisodeShared { feed, item } => {
                let row = PublicEventRow {
                    event_id: event.id,
                    user_id: event.stream_id.clone(),
                    feed: Some(feed.clone()),
                    item: Some(item.clone()),
                    kind: PublicEventKind::Shared,
                    at: event.timestamp,
                };
                self.record(&event.stream_id, row, WEIGHT_SHARE, event.stream_version);
                Ok(())
            }
            EventPayload::PrivacyChanged { .. } => {
                self.reconcile(&event.stream_id);
                Ok(())
            }
            EventPayload::EventsRemoved { feed, item } => {
                self.remove_events(&event.stream_id, feed.as_ref(), item.as_ref());
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
