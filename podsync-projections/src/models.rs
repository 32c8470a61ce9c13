//! Read-model row shapes and their in-memory tables (spec §4.5, §15).
//! Each table is a thin `DashMap` wrapper; the sled-backed tables in
//! `podsync-server` will implement the same shape once wired, mirroring the
//! teacher's split between `DatabaseManager` bookkeeping and pluggable
//! persistence in `narayana-storage`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use podsync_core::{CollectionId, FeedId, ItemId, PlaylistId, PrivacyLevel, SourceId, UserId};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRow {
    pub user_id: UserId,
    pub feed: FeedId,
    pub source_id: SourceId,
    pub feed_title: Option<String>,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct SubscriptionsTable {
    rows: DashMap<(UserId, FeedId), SubscriptionRow>,
}

impl SubscriptionsTable {
    pub fn upsert(&self, row: SubscriptionRow) {
        self.rows.insert((row.user_id.clone(), row.feed.clone()), row);
    }

    pub fn get(&self, user_id: &UserId, feed: &FeedId) -> Option<SubscriptionRow> {
        self.rows.get(&(user_id.clone(), feed.clone())).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayStatusRow {
    pub user_id: UserId,
    pub feed: FeedId,
    pub item: ItemId,
    pub position: u64,
    pub played: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PlayStatusesTable {
    rows: DashMap<(UserId, ItemId), PlayStatusRow>,
}

impl PlayStatusesTable {
    pub fn upsert(&self, row: PlayStatusRow) {
        self.rows.insert((row.user_id.clone(), row.item.clone()), row);
    }

    pub fn get(&self, user_id: &UserId, item: &ItemId) -> Option<PlayStatusRow> {
        self.rows.get(&(user_id.clone(), item.clone())).map(|r| r.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRow {
    pub playlist_id: PlaylistId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItemRow {
    pub playlist_id: PlaylistId,
    pub feed: FeedId,
    pub item: ItemId,
    pub item_title: Option<String>,
    pub feed_title: Option<String>,
    pub position: usize,
}

#[derive(Debug, Default)]
pub struct PlaylistsTable {
    playlists: DashMap<PlaylistId, PlaylistRow>,
    items: DashMap<PlaylistId, Vec<PlaylistItemRow>>,
}

impl PlaylistsTable {
    pub fn upsert_playlist(&self, row: PlaylistRow) {
        self.playlists.insert(row.playlist_id, row);
    }

    pub fn get_playlist(&self, playlist_id: &PlaylistId) -> Option<PlaylistRow> {
        self.playlists.get(playlist_id).map(|r| r.clone())
    }

    /// Idempotent: reorders/replaces the full item list, assigning
    /// contiguous positions (spec §8: "positions are 0..|items|-1").
    pub fn replace_items(&self, playlist_id: PlaylistId, items: Vec<PlaylistItemRow>) {
        let mut ordered = items;
        for (idx, item) in ordered.iter_mut().enumerate() {
            item.position = idx;
        }
        self.items.insert(playlist_id, ordered);
    }

    pub fn upsert_item(&self, playlist_id: PlaylistId, item: PlaylistItemRow) {
        let mut list = self.items.entry(playlist_id).or_default();
        if let Some(existing) = list
            .iter_mut()
            .find(|i| i.feed == item.feed && i.item == item.item)
        {
            *existing = item;
        } else {
            let position = list.len();
            let mut item = item;
            item.position = position;
            list.push(item);
        }
    }

    pub fn remove_item(&self, playlist_id: &PlaylistId, feed: &FeedId, item: &ItemId) {
        if let Some(mut list) = self.items.get_mut(playlist_id) {
            list.retain(|i| !(&i.feed == feed && &i.item == item));
            for (idx, row) in list.iter_mut().enumerate() {
                row.position = idx;
            }
        }
    }

    pub fn items_for(&self, playlist_id: &PlaylistId) -> Vec<PlaylistItemRow> {
        self.items.get(playlist_id).map(|l| l.clone()).unwrap_or_default()
    }
}

fn scope_key_string(scope: &PrivacyScopeKeyInput) -> String {
    match scope {
        PrivacyScopeKeyInput::Global => "global".to_string(),
        PrivacyScopeKeyInput::Feed(feed) => format!("feed:{feed}"),
        PrivacyScopeKeyInput::Item(item) => format!("item:{item}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrivacyScopeKeyInput {
    Global,
    Feed(FeedId),
    Item(ItemId),
}

#[derive(Debug, Default)]
pub struct UserPrivacyTable {
    rows: DashMap<(UserId, String), PrivacyLevel>,
}

impl UserPrivacyTable {
    pub fn set(&self, user_id: &UserId, scope: PrivacyScopeKeyInput, level: PrivacyLevel) {
        self.rows.insert((user_id.clone(), scope_key_string(&scope)), level);
    }

    /// Item > feed > global precedence, mirroring the aggregate's own
    /// resolution (spec §3 invariant 5).
    pub fn effective(&self, user_id: &UserId, feed: Option<&FeedId>, item: Option<&ItemId>) -> PrivacyLevel {
        if let Some(item) = item {
            if let Some(level) = self
                .rows
                .get(&(user_id.clone(), scope_key_string(&PrivacyScopeKeyInput::Item(item.clone()))))
            {
                return *level;
            }
        }
        if let Some(feed) = feed {
            if let Some(level) = self
                .rows
                .get(&(user_id.clone(), scope_key_string(&PrivacyScopeKeyInput::Feed(feed.clone()))))
            {
                return *level;
            }
        }
        self.rows
            .get(&(user_id.clone(), scope_key_string(&PrivacyScopeKeyInput::Global)))
            .map(|l| *l)
            .unwrap_or(PrivacyLevel::Private)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRow {
    pub collection_id: CollectionId,
    pub user_id: UserId,
    pub title: String,
    pub is_default: bool,
    pub color: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct CollectionsTable {
    collections: DashMap<CollectionId, CollectionRow>,
    feeds: DashMap<CollectionId, Vec<FeedId>>,
}

impl CollectionsTable {
    pub fn upsert(&self, row: CollectionRow) {
        self.collections.insert(row.collection_id, row);
    }

    pub fn get(&self, collection_id: &CollectionId) -> Option<CollectionRow> {
        self.collections.get(collection_id).map(|r| r.clone())
    }

    pub fn set_feeds(&self, collection_id: CollectionId, feeds: Vec<FeedId>) {
        self.feeds.insert(collection_id, feeds);
    }

    pub fn feeds_for(&self, collection_id: &CollectionId) -> Vec<FeedId> {
        self.feeds.get(collection_id).map(|f| f.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicEventKind {
    Subscribed,
    Played,
    Saved,
    Shared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicEventRow {
    pub event_id: Uuid,
    pub user_id: UserId,
    pub feed: Option<FeedId>,
    pub item: Option<ItemId>,
    pub kind: PublicEventKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PublicEventsTable {
    rows: DashMap<Uuid, PublicEventRow>,
    by_feed_item: DashMap<(FeedId, ItemId), HashSet<Uuid>>,
    by_user: DashMap<UserId, HashSet<Uuid>>,
}

impl PublicEventsTable {
    pub fn contains(&self, event_id: &Uuid) -> bool {
        self.rows.contains_key(event_id)
    }

    pub fn insert(&self, row: PublicEventRow) {
        if let (Some(feed), Some(item)) = (&row.feed, &row.item) {
            self.by_feed_item
                .entry((feed.clone(), item.clone()))
                .or_default()
                .insert(row.event_id);
        }
        self.by_user.entry(row.user_id.clone()).or_default().insert(row.event_id);
        self.rows.insert(row.event_id, row);
    }

    pub fn remove(&self, event_id: &Uuid) {
        if let Some((_, row)) = self.rows.remove(event_id) {
            if let (Some(feed), Some(item)) = (&row.feed, &row.item) {
                if let Some(mut set) = self.by_feed_item.get_mut(&(feed.clone(), item.clone())) {
                    set.remove(event_id);
                }
            }
            if let Some(mut set) = self.by_user.get_mut(&row.user_id) {
                set.remove(event_id);
            }
        }
    }

    pub fn remove_all_for_user(&self, user_id: &UserId) -> Vec<Uuid> {
        let ids: Vec<Uuid> = self
            .by_user
            .get(user_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        for id in &ids {
            self.remove(id);
        }
        ids
    }

    pub fn for_user(&self, user_id: &UserId) -> Vec<PublicEventRow> {
        self.by_user
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| self.rows.get(id).map(|r| r.clone())).collect())
            .unwrap_or_default()
    }

    pub fn for_feed_item(&self, feed: &FeedId, item: &ItemId) -> Vec<PublicEventRow> {
        self.by_feed_item
            .get(&(feed.clone(), item.clone()))
            .map(|ids| ids.iter().filter_map(|id| self.rows.get(id).map(|r| r.clone())).collect())
            .unwrap_or_default()
    }
}

/// Popularity weights (spec §4.5): subscribe=10, play=5, save/like=3,
/// share=2.
pub const WEIGHT_SUBSCRIBE: i64 = 10;
pub const WEIGHT_PLAY: i64 = 5;
pub const WEIGHT_SAVE: i64 = 3;
pub const WEIGHT_SHARE: i64 = 2;

#[derive(Debug, Default)]
pub struct PopularityTable {
    podcast: DashMap<FeedId, i64>,
    episode: DashMap<(FeedId, ItemId), i64>,
}

impl PopularityTable {
    pub fn add(&self, feed: &FeedId, item: Option<&ItemId>, weight: i64) {
        *self.podcast.entry(feed.clone()).or_insert(0) += weight;
        if let Some(item) = item {
            *self.episode.entry((feed.clone(), item.clone())).or_insert(0) += weight;
        }
    }

    pub fn subtract(&self, feed: &FeedId, item: Option<&ItemId>, weight: i64) {
        self.add(feed, item, -weight);
    }

    pub fn podcast_score(&self, feed: &FeedId) -> i64 {
        self.podcast.get(feed).map(|v| *v).unwrap_or(0)
    }

    pub fn episode_score(&self, feed: &FeedId, item: &ItemId) -> i64 {
        self.episode.get(&(feed.clone(), item.clone())).map(|v| *v).unwrap_or(0)
    }

    pub fn recompute_podcast(&self, feed: &FeedId, score: i64) {
        self.podcast.insert(feed.clone(), score);
    }

    pub fn recompute_episode(&self, feed: &FeedId, item: &ItemId, score: i64) {
        self.episode.insert((feed.clone(), item.clone()), score);
    }
}
