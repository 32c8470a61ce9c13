//! Commands the aggregate (C2) can `decide` on. Field sets are pinned to
//! spec §4.2's authoritative list; `device_id`/`device_name` never appear
//! here, only on `EventInfo` (spec design note / open question 1).

use chrono::{DateTime, Utc};
use podsync_core::{CollectionId, FeedId, ItemId, PlaylistId, PrivacyLevel, SourceId, UserId};
use podsync_events::{PlaylistItemRef, PlayStatusSnapshot, SubscriptionSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum PrivacyScope {
    Global,
    Feed(FeedId),
    Item(ItemId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlaylist {
    pub playlist_id: PlaylistId,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub items: Vec<PlaylistItemRef>,
    pub base_items: Option<Vec<PlaylistItemRef>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subscribe {
        feed: FeedId,
        source_id: SourceId,
        subscribed_at: Option<DateTime<Utc>>,
    },
    Unsubscribe {
        feed: FeedId,
        source_id: Option<SourceId>,
        unsubscribed_at: Option<DateTime<Utc>>,
    },
    RecordPlay {
        feed: FeedId,
        item: ItemId,
        position: u64,
        played: bool,
    },
    UpdatePosition {
        feed: FeedId,
        item: ItemId,
        position: u64,
    },
    SaveEpisode {
        playlist: PlaylistId,
        feed: FeedId,
        item: ItemId,
        item_title: Option<String>,
        feed_title: Option<String>,
    },
    UnsaveEpisode {
        playlist: PlaylistId,
        feed: FeedId,
        item: ItemId,
    },
    ShareEpisode {
        feed: FeedId,
        item: ItemId,
    },
    ChangePrivacy {
        scope: PrivacyScope,
        level: PrivacyLevel,
    },
    CreatePlaylist {
        playlist_id: Option<PlaylistId>,
        name: String,
        description: Option<String>,
    },
    UpdatePlaylist {
        playlist_id: PlaylistId,
        name: Option<String>,
        description: Option<String>,
    },
    DeletePlaylist {
        playlist_id: PlaylistId,
    },
    ReorderPlaylist {
        playlist_id: PlaylistId,
        items: Vec<PlaylistItemRef>,
    },
    SetPlaylistVisibility {
        playlist_id: PlaylistId,
        is_public: bool,
    },
    CreateCollection {
        collection_id: Option<CollectionId>,
        title: String,
        is_default: bool,
        description: Option<String>,
        color: Option<String>,
    },
    UpdateCollection {
        collection_id: CollectionId,
        title: Option<String>,
        description: Option<String>,
        color: Option<String>,
    },
    DeleteCollection {
        collection_id: CollectionId,
    },
    SetCollectionVisibility {
        collection_id: CollectionId,
        is_public: bool,
    },
    AddFeedToCollection {
        collection_id: CollectionId,
        feed: FeedId,
    },
    RemoveFeedFromCollection {
        collection_id: CollectionId,
        feed: FeedId,
    },
    ReorderCollectionFeed {
        collection_id: CollectionId,
        feed: FeedId,
        new_position: usize,
    },
    RemoveEvents {
        feed: Option<FeedId>,
        item: Option<ItemId>,
    },
    /// Multi-device reconciliation (spec §4.3). `local` is this aggregate's
    /// view (i.e. the current state); `remote` is what the device sent.
    Sync {
        subscriptions: Vec<SubscriptionSnapshot>,
        play_statuses: Vec<PlayStatusSnapshot>,
        playlists: Vec<SyncPlaylist>,
    },
    Snapshot {
        cleanup_old_events: bool,
    },
}
