//! Aggregate state (spec §3): derived entirely by folding a user's stream.

use chrono::{DateTime, Utc};
use podsync_core::{CollectionId, FeedId, ItemId, PlaylistId, PrivacyLevel, SourceId, UserId};
use podsync_events::PlaylistItemRef;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState {
    pub source_id: SourceId,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    /// A feed is subscribed iff `subscribed_at` exists and either there is
    /// no `unsubscribed_at`, or it is older than the latest subscribe (spec
    /// §3).
    pub fn is_subscribed(&self) -> bool {
        match self.unsubscribed_at {
            None => true,
            Some(unsub) => self.subscribed_at > unsub,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayStatusState {
    pub feed: FeedId,
    pub position: u64,
    pub played: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaylistState {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub items: Vec<PlaylistItemRef>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PlaylistState {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionState {
    pub title: String,
    pub is_default: bool,
    pub color: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub feed_ids: HashSet<FeedId>,
    pub feed_order: Vec<FeedId>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrivacyState {
    pub global: PrivacyOverrideState,
    pub per_feed: HashMap<FeedId, PrivacyLevel>,
    pub per_item: HashMap<ItemId, PrivacyLevel>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrivacyOverrideState(pub PrivacyLevel);

impl Default for PrivacyOverrideState {
    fn default() -> Self {
        PrivacyOverrideState(PrivacyLevel::Private)
    }
}

impl PrivacyState {
    /// Precedence: item > feed > global (spec §3 invariant 5).
    pub fn effective(&self, feed: Option<&FeedId>, item: Option<&ItemId>) -> PrivacyLevel {
        if let Some(item) = item {
            if let Some(level) = self.per_item.get(item) {
                return *level;
            }
        }
        if let Some(feed) = feed {
            if let Some(level) = self.per_feed.get(feed) {
                return *level;
            }
        }
        self.global.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserAggregateState {
    pub user_id: Option<UserId>,
    pub privacy: PrivacyState,
    pub subscriptions: HashMap<FeedId, SubscriptionState>,
    pub play_statuses: HashMap<ItemId, PlayStatusState>,
    pub playlists: HashMap<PlaylistId, PlaylistState>,
    pub collections: HashMap<CollectionId, CollectionState>,
}

impl UserAggregateState {
    pub fn is_subscribed(&self, feed: &FeedId) -> bool {
        self.subscriptions
            .get(feed)
            .map(SubscriptionState::is_subscribed)
            .unwrap_or(false)
    }

    pub fn default_collection_id(&self) -> Option<CollectionId> {
        self.collections
            .iter()
            .find(|(_, c)| c.is_default && !c.deleted)
            .map(|(id, _)| *id)
    }
}
