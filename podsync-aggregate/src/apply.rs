//! `apply`: fold a single event onto state (spec §3). Total and infallible —
//! any event that can be appended must be applicable.

use crate::state::{CollectionState, PlayStatusState, PlaylistState, SubscriptionState};
use crate::state::UserAggregateState;
use podsync_core::UserId;
use podsync_events::EventPayload;

pub fn apply(state: &mut UserAggregateState, stream_id: &UserId, event: &EventPayload) {
    if state.user_id.is_none() {
        state.user_id = Some(stream_id.clone());
    }
    match event {
        EventPayload::UserSubscribed {
            feed,
            source_id,
            subscribed_at,
        } => {
            state.subscriptions.insert(
                feed.clone(),
                SubscriptionState {
                    source_id: source_id.clone(),
                    subscribed_at: *subscribed_at,
                    unsubscribed_at: None,
                },
            );
        }

        EventPayload::UserUnsubscribed {
            feed,
            unsubscribed_at,
            ..
        } => {
            if let Some(sub) = state.subscriptions.get_mut(feed) {
                sub.unsubscribed_at = Some(*unsubscribed_at);
            }
        }

        EventPayload::PlayRecorded {
            feed,
            item,
            position,
            played,
            at,
        } => {
            state.play_statuses.insert(
                item.clone(),
                PlayStatusState {
                    feed: feed.clone(),
                    position: *position,
                    played: *played,
                    updated_at: *at,
                },
            );
        }

        EventPayload::PositionUpdated {
            feed,
            item,
            position,
            at,
        } => {
            let entry = state.play_statuses.entry(item.clone()).or_insert_with(|| PlayStatusState {
                feed: feed.clone(),
                position: 0,
                played: false,
                updated_at: *at,
            });
            entry.position = *position;
            entry.updated_at = *at;
        }

        EventPayload::EpisodeSaved {
            playlist,
            feed,
            item,
            ..
        } => {
            let state_entry = state.playlists.entry(*playlist).or_default();
            let already_saved = state_entry
                .items
                .iter()
                .any(|i| &i.feed == feed && &i.item == item);
            if !already_saved {
                state_entry.items.push(podsync_events::PlaylistItemRef {
                    feed: feed.clone(),
                    item: item.clone(),
                });
            }
        }

        EventPayload::EpisodeUnsaved {
            playlist,
            feed,
            item,
        } => {
            if let Some(playlist) = state.playlists.get_mut(playlist) {
                playlist.items.retain(|i| !(&i.feed == feed && &i.item == item));
            }
        }

        EventPayload::EpisodeShared { .. } => {
            // Sharing does not change aggregate state; it only emits an
            // event for the public-events read model (spec §5).
        }

        EventPayload::PrivacyChanged {
            scope,
            feed,
            item,
            level,
            at,
        } => {
            use podsync_events::PrivacyScopeTag;
            match scope {
                PrivacyScopeTag::Global => state.privacy.global = crate::state::PrivacyOverrideState(*level),
                PrivacyScopeTag::Feed => {
                    if let Some(feed) = feed {
                        state.privacy.per_feed.insert(feed.clone(), *level);
                    }
                }
                PrivacyScopeTag::Item => {
                    if let Some(item) = item {
                        state.privacy.per_item.insert(item.clone(), *level);
                    }
                }
            }
            state.privacy.updated_at = Some(*at);
        }

        EventPayload::PlaylistCreated {
            playlist_id,
            name,
            description,
        } => {
            let entry = state.playlists.entry(*playlist_id).or_default();
            entry.name = name.clone();
            entry.description = description.clone();
        }

        EventPayload::PlaylistUpdated {
            playlist_id,
            name,
            description,
            at,
        } => {
            let entry = state.playlists.entry(*playlist_id).or_default();
            if let Some(name) = name {
                entry.name = name.clone();
            }
            if description.is_some() {
                entry.description = description.clone();
            }
            entry.updated_at = Some(*at);
        }

        EventPayload::PlaylistDeleted { playlist_id, at } => {
            if let Some(entry) = state.playlists.get_mut(playlist_id) {
                entry.deleted_at = Some(*at);
            }
        }

        EventPayload::PlaylistReordered { playlist_id, items } => {
            let entry = state.playlists.entry(*playlist_id).or_default();
            entry.items = items.clone();
        }

        EventPayload::PlaylistVisibilityChanged {
            playlist_id,
            is_public,
            at,
        } => {
            let entry = state.playlists.entry(*playlist_id).or_default();
            entry.is_public = *is_public;
            entry.updated_at = Some(*at);
        }

        EventPayload::CollectionCreated {
            collection_id,
            title,
            is_default,
            description,
            color,
        } => {
            state.collections.insert(
                *collection_id,
                CollectionState {
                    title: title.clone(),
                    is_default: *is_default,
                    color: color.clone(),
                    description: description.clone(),
                    is_public: false,
                    feed_ids: Default::default(),
                    feed_order: Vec::new(),
                    deleted: false,
                },
            );
        }

        EventPayload::CollectionUpdated {
            collection_id,
            title,
            description,
            color,
        } => {
            if let Some(entry) = state.collections.get_mut(collection_id) {
                if let Some(title) = title {
                    entry.title = title.clone();
                }
                if description.is_some() {
                    entry.description = description.clone();
                }
                if color.is_some() {
                    entry.color = color.clone();
                }
            }
        }

        EventPayload::CollectionDeleted { collection_id } => {
            if let Some(entry) = state.collections.get_mut(collection_id) {
                entry.deleted = true;
            }
        }

        EventPayload::CollectionVisibilityChanged {
            collection_id,
            is_public,
        } => {
            if let Some(entry) = state.collections.get_mut(collection_id) {
                entry.is_public = *is_public;
            }
        }

        EventPayload::FeedAddedToCollection { collection_id, feed } => {
            if let Some(entry) = state.collections.get_mut(collection_id) {
                if entry.feed_ids.insert(feed.clone()) {
                    entry.feed_order.push(feed.clone());
                }
            }
        }

        EventPayload::FeedRemovedFromCollection { collection_id, feed } => {
            if let Some(entry) = state.collections.get_mut(collection_id) {
                entry.feed_ids.remove(feed);
                entry.feed_order.retain(|f| f != feed);
            }
        }

        EventPayload::CollectionFeedReordered {
            collection_id,
            feed_order,
            ..
        } => {
            if let Some(entry) = state.collections.get_mut(collection_id) {
                entry.feed_order = feed_order.clone();
            }
        }

        EventPayload::EventsRemoved { .. } => {
            // Storage-level effect only; aggregate state is untouched (spec
            // §4.2). Read models react to this independently.
        }

        EventPayload::UserCheckpoint {
            subscriptions,
            play_statuses,
            playlists,
            collections,
        } => {
            state.subscriptions = subscriptions
                .iter()
                .map(|s| {
                    (
                        s.feed.clone(),
                        SubscriptionState {
                            source_id: s.source_id.clone(),
                            subscribed_at: s.subscribed_at,
                            unsubscribed_at: s.unsubscribed_at,
                        },
                    )
                })
                .collect();
            state.play_statuses = play_statuses
                .iter()
                .map(|p| {
                    (
                        p.item.clone(),
                        PlayStatusState {
                            feed: p.feed.clone(),
                            position: p.position,
                            played: p.played,
                            updated_at: p.updated_at,
                        },
                    )
                })
                .collect();
            state.playlists = playlists
                .iter()
                .map(|p| {
                    (
                        p.playlist_id,
                        PlaylistState {
                            name: p.name.clone(),
                            description: p.description.clone(),
                            is_public: p.is_public,
                            items: p.items.clone(),
                            updated_at: None,
                            deleted_at: None,
                        },
                    )
                })
                .collect();
            state.collections = collections
                .iter()
                .map(|c| {
                    (
                        c.collection_id,
                        CollectionState {
                            title: c.title.clone(),
                            is_default: c.is_default,
                            color: c.color.clone(),
                            description: c.description.clone(),
                            is_public: c.is_public,
                            feed_ids: c.feed_order.iter().cloned().collect(),
                            feed_order: c.feed_order.clone(),
                            deleted: false,
                        },
                    )
                })
                .collect();
        }
    }
}

pub fn fold<'a>(
    stream_id: &UserId,
    events: impl IntoIterator<Item = &'a EventPayload>,
) -> UserAggregateState {
    let mut state = UserAggregateState::default();
    for event in events {
        apply(&mut state, stream_id, event);
    }
    state
}
