//! Event payloads (spec §3). These are the facts recorded on a user's
//! stream; they are immutable once appended.

use chrono::{DateTime, Utc};
use podsync_core::{CollectionId, FeedId, ItemId, PlaylistId, PrivacyLevel, SourceId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItemRef {
    pub feed: FeedId,
    pub item: ItemId,
}

/// Snapshot of a subscription at checkpoint time (spec §4.7 `UserCheckpoint`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub feed: FeedId,
    pub source_id: SourceId,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayStatusSnapshot {
    pub item: ItemId,
    pub feed: FeedId,
    pub position: u64,
    pub played: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub playlist_id: PlaylistId,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub items: Vec<PlaylistItemRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub collection_id: CollectionId,
    pub title: String,
    pub is_default: bool,
    pub color: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub feed_order: Vec<FeedId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    UserSubscribed {
        feed: FeedId,
        source_id: SourceId,
        subscribed_at: DateTime<Utc>,
    },
    UserUnsubscribed {
        feed: FeedId,
        source_id: Option<SourceId>,
        unsubscribed_at: DateTime<Utc>,
    },
    PlayRecorded {
        feed: FeedId,
        item: ItemId,
        position: u64,
        played: bool,
        at: DateTime<Utc>,
    },
    PositionUpdated {
        feed: FeedId,
        item: ItemId,
        position: u64,
        at: DateTime<Utc>,
    },
    EpisodeSaved {
        playlist: PlaylistId,
        feed: FeedId,
        item: ItemId,
        item_title: Option<String>,
        feed_title: Option<String>,
    },
    EpisodeUnsaved {
        playlist: PlaylistId,
        feed: FeedId,
        item: ItemId,
    },
    EpisodeShared {
        feed: FeedId,
        item: ItemId,
    },
    PrivacyChanged {
        scope: PrivacyScopeTag,
        feed: Option<FeedId>,
        item: Option<ItemId>,
        level: PrivacyLevel,
        at: DateTime<Utc>,
    },
    PlaylistCreated {
        playlist_id: PlaylistId,
        name: String,
        description: Option<String>,
    },
    PlaylistUpdated {
        playlist_id: PlaylistId,
        name: Option<String>,
        description: Option<String>,
        at: DateTime<Utc>,
    },
    PlaylistDeleted {
        playlist_id: PlaylistId,
        at: DateTime<Utc>,
    },
    PlaylistReordered {
        playlist_id: PlaylistId,
        items: Vec<PlaylistItemRef>,
    },
    PlaylistVisibilityChanged {
        playlist_id: PlaylistId,
        is_public: bool,
        at: DateTime<Utc>,
    },
    CollectionCreated {
        collection_id: CollectionId,
        title: String,
        is_default: bool,
        description: Option<String>,
        color: Option<String>,
    },
    CollectionUpdated {
        collection_id: CollectionId,
        title: Option<String>,
        description: Option<String>,
        color: Option<String>,
    },
    CollectionDeleted {
        collection_id: CollectionId,
    },
    CollectionVisibilityChanged {
        collection_id: CollectionId,
        is_public: bool,
    },
    FeedAddedToCollection {
        collection_id: CollectionId,
        feed: FeedId,
    },
    FeedRemovedFromCollection {
        collection_id: CollectionId,
        feed: FeedId,
    },
    CollectionFeedReordered {
        collection_id: CollectionId,
        feed: FeedId,
        new_position: usize,
        feed_order: Vec<FeedId>,
    },
    EventsRemoved {
        feed: Option<FeedId>,
        item: Option<ItemId>,
    },
    UserCheckpoint {
        subscriptions: Vec<SubscriptionSnapshot>,
        play_statuses: Vec<PlayStatusSnapshot>,
        playlists: Vec<PlaylistSnapshot>,
        collections: Vec<CollectionSnapshot>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyScopeTag {
    Global,
    Feed,
    Item,
}

impl EventPayload {
    pub fn type_tag(&self) -> &'static str {
        match self {
            EventPayload::UserSubscribed { .. } => "UserSubscribed",
            EventPayload::UserUnsubscribed { .. } => "UserUnsubscribed",
            EventPayload::PlayRecorded { .. } => "PlayRecorded",
            EventPayload::PositionUpdated { .. } => "PositionUpdated",
            EventPayload::EpisodeSaved { .. } => "EpisodeSaved",
            EventPayload::EpisodeUnsaved { .. } => "EpisodeUnsaved",
            EventPayload::EpisodeShared { .. } => "EpisodeShared",
            EventPayload::PrivacyChanged { .. } => "PrivacyChanged",
            EventPayload::PlaylistCreated { .. } => "PlaylistCreated",
            EventPayload::PlaylistUpdated { .. } => "PlaylistUpdated",
            EventPayload::PlaylistDeleted { .. } => "PlaylistDeleted",
            EventPayload::PlaylistReordered { .. } => "PlaylistReordered",
            EventPayload::PlaylistVisibilityChanged { .. } => "PlaylistVisibilityChanged",
            EventPayload::CollectionCreated { .. } => "CollectionCreated",
            EventPayload::CollectionUpdated { .. } => "CollectionUpdated",
            EventPayload::CollectionDeleted { .. } => "CollectionDeleted",
            EventPayload::CollectionVisibilityChanged { .. } => "CollectionVisibilityChanged",
            EventPayload::FeedAddedToCollection { .. } => "FeedAddedToCollection",
            EventPayload::FeedRemovedFromCollection { .. } => "FeedRemovedFromCollection",
            EventPayload::CollectionFeedReordered { .. } => "CollectionFeedReordered",
            EventPayload::EventsRemoved { .. } => "EventsRemoved",
            EventPayload::UserCheckpoint { .. } => "UserCheckpoint",
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        matches!(self, EventPayload::UserCheckpoint { .. })
    }
}

/// A single durable record on a user's stream (spec §3 `Event`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub position: u64,
    pub stream_id: UserId,
    pub stream_version: u64,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub event_infos: Option<EventInfo>,
}
