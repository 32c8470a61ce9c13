//! `decide`: the pure half of C2 (spec §4.2). No I/O, no clock reads except
//! through the injected `Clock`.

use crate::command::{Command, PrivacyScope, SyncPlaylist};
use crate::conflict::{self, PlaySide, PlaylistSide, Resolution, SubscriptionSide};
use crate::state::UserAggregateState;
use podsync_core::{Clock, CollectionId, DomainError};
use podsync_events::{EventPayload, PrivacyScopeTag};
use tracing::debug;

pub fn decide(
    state: &UserAggregateState,
    command: Command,
    clock: &dyn Clock,
) -> Result<Vec<EventPayload>, DomainError> {
    match command {
        Command::Subscribe {
            feed,
            source_id,
            subscribed_at,
        } => Ok(vec![EventPayload::UserSubscribed {
            feed,
            source_id,
            subscribed_at: subscribed_at.unwrap_or_else(|| clock.now()),
        }]),

        Command::Unsubscribe {
            feed,
            source_id,
            unsubscribed_at,
        } => Ok(vec![EventPayload::UserUnsubscribed {
            feed,
            source_id,
            unsubscribed_at: unsubscribed_at.unwrap_or_else(|| clock.now()),
        }]),

        Command::RecordPlay {
            feed,
            item,
            position,
            played,
        } => Ok(vec![EventPayload::PlayRecorded {
            feed,
            item,
            position,
            played,
            at: clock.now(),
        }]),

        Command::UpdatePosition {
            feed,
            item,
            position,
        } => Ok(vec![EventPayload::PositionUpdated {
            feed,
            item,
            position,
            at: clock.now(),
        }]),

        Command::SaveEpisode {
            playlist,
            feed,
            item,
            item_title,
            feed_title,
        } => Ok(vec![EventPayload::EpisodeSaved {
            playlist,
            feed,
            item,
            item_title,
            feed_title,
        }]),

        Command::UnsaveEpisode {
            playlist,
            feed,
            item,
        } => Ok(vec![EventPayload::EpisodeUnsaved {
            playlist,
            feed,
            item,
        }]),

        Command::ShareEpisode { feed, item } => {
            Ok(vec![EventPayload::EpisodeShared { feed, item }])
        }

        Command::ChangePrivacy { scope, level } => {
            let (tag, feed, item) = match scope {
                PrivacyScope::Global => (PrivacyScopeTag::Global, None, None),
                PrivacyScope::Feed(feed) => (PrivacyScopeTag::Feed, Some(feed), None),
                PrivacyScope::Item(item) => (PrivacyScopeTag::Item, None, Some(item)),
            };
            Ok(vec![EventPayload::PrivacyChanged {
                scope: tag,
                feed,
                item,
                level,
                at: clock.now(),
            }])
        }

        Command::CreatePlaylist {
            playlist_id,
            name,
            description,
        } => {
            if name.trim().is_empty() {
                return Err(DomainError::EmptyTitle);
            }
            let playlist_id = playlist_id.unwrap_or_default();
            if state.playlists.contains_key(&playlist_id) {
                // Idempotent creation attempt: re-issuing with the same id is
                // a no-op, not an error.
                return Ok(vec![]);
            }
            Ok(vec![EventPayload::PlaylistCreated {
                playlist_id,
                name,
                description,
            }])
        }

        Command::UpdatePlaylist {
            playlist_id,
            name,
            description,
        } => {
            state
                .playlists
                .get(&playlist_id)
                .filter(|p| !p.is_deleted())
                .ok_or(DomainError::PlaylistNotFound)?;
            if let Some(name) = &name {
                if name.trim().is_empty() {
                    return Err(DomainError::EmptyTitle);
                }
            }
            Ok(vec![EventPayload::PlaylistUpdated {
                playlist_id,
                name,
                description,
                at: clock.now(),
            }])
        }

        Command::DeletePlaylist { playlist_id } => {
            state
                .playlists
                .get(&playlist_id)
                .filter(|p| !p.is_deleted())
                .ok_or(DomainError::PlaylistNotFound)?;
            Ok(vec![EventPayload::PlaylistDeleted { playlist_id, at: clock.now() }])
        }

        Command::ReorderPlaylist { playlist_id, items } => {
            state
                .playlists
                .get(&playlist_id)
                .filter(|p| !p.is_deleted())
                .ok_or(DomainError::PlaylistNotFound)?;
            Ok(vec![EventPayload::PlaylistReordered { playlist_id, items }])
        }

        Command::SetPlaylistVisibility {
            playlist_id,
            is_public,
        } => {
            state
                .playlists
                .get(&playlist_id)
                .filter(|p| !p.is_deleted())
                .ok_or(DomainError::PlaylistNotFound)?;
            Ok(vec![EventPayload::PlaylistVisibilityChanged {
                playlist_id,
                is_public,
                at: clock.now(),
            }])
        }

        Command::CreateCollection {
            collection_id,
            title,
            is_default,
            description,
            color,
        } => {
            if title.trim().is_empty() {
                return Err(DomainError::EmptyTitle);
            }
            if is_default && state.default_collection_id().is_some() {
                return Err(DomainError::DefaultCollectionExists);
            }
            match collection_id {
                Some(id) => {
                    if let Some(existing) = state.collections.get(&id) {
                        if existing.title == title
                            && existing.is_default == is_default
                            && existing.description == description
                            && existing.color == color
                        {
                            // Idempotent retry of the exact same creation.
                            return Ok(vec![]);
                        }
                        return Err(DomainError::DuplicateSlug);
                    }
                    Ok(vec![EventPayload::CollectionCreated {
                        collection_id: id,
                        title,
                        is_default,
                        description,
                        color,
                    }])
                }
                None => Ok(vec![EventPayload::CollectionCreated {
                    collection_id: CollectionId::new(),
                    title,
                    is_default,
                    description,
                    color,
                }]),
            }
        }

        Command::UpdateCollection {
            collection_id,
            title,
            description,
            color,
        } => {
            state
                .collections
                .get(&collection_id)
                .filter(|c| !c.deleted)
                .ok_or(DomainError::CollectionNotFound)?;
            if let Some(title) = &title {
                if title.trim().is_empty() {
                    return Err(DomainError::EmptyTitle);
                }
            }
            Ok(vec![EventPayload::CollectionUpdated {
                collection_id,
                title,
                description,
                color,
            }])
        }

        Command::DeleteCollection { collection_id } => {
            let collection = state
                .collections
                .get(&collection_id)
                .filter(|c| !c.deleted)
                .ok_or(DomainError::CollectionNotFound)?;
            if collection.is_default {
                return Err(DomainError::CannotDeleteDefault);
            }
            Ok(vec![EventPayload::CollectionDeleted { collection_id }])
        }

        Command::SetCollectionVisibility {
            collection_id,
            is_public,
        } => {
            state
                .collections
                .get(&collection_id)
                .filter(|c| !c.deleted)
                .ok_or(DomainError::CollectionNotFound)?;
            Ok(vec![EventPayload::CollectionVisibilityChanged {
                collection_id,
                is_public,
            }])
        }

        Command::AddFeedToCollection { collection_id, feed } => {
            state
                .collections
                .get(&collection_id)
                .filter(|c| !c.deleted)
                .ok_or(DomainError::CollectionNotFound)?;
            if !state.is_subscribed(&feed) {
                return Err(DomainError::FeedNotSubscribed);
            }
            Ok(vec![EventPayload::FeedAddedToCollection {
                collection_id,
                feed,
            }])
        }

        Command::RemoveFeedFromCollection { collection_id, feed } => {
            state
                .collections
                .get(&collection_id)
                .filter(|c| !c.deleted)
                .ok_or(DomainError::CollectionNotFound)?;
            Ok(vec![EventPayload::FeedRemovedFromCollection {
                collection_id,
                feed,
            }])
        }

        Command::ReorderCollectionFeed {
            collection_id,
            feed,
            new_position,
        } => {
            let collection = state
                .collections
                .get(&collection_id)
                .filter(|c| !c.deleted)
                .ok_or(DomainError::CollectionNotFound)?;
            let mut order: Vec<_> = collection
                .feed_order
                .iter()
                .filter(|f| **f != feed)
                .cloned()
                .collect();
            let index = new_position.min(order.len());
            order.insert(index, feed.clone());
            Ok(vec![EventPayload::CollectionFeedReordered {
                collection_id,
                feed,
                new_position: index,
                feed_order: order,
            }])
        }

        Command::RemoveEvents { feed, item } => {
            Ok(vec![EventPayload::EventsRemoved { feed, item }])
        }

        Command::Sync {
            subscriptions,
            play_statuses,
            playlists,
        } => Ok(decide_sync(state, subscriptions, play_statuses, playlists, clock)),

        Command::Snapshot { cleanup_old_events } => Ok(vec![crate::checkpoint::build_checkpoint(
            state,
            clock.now(),
            cleanup_old_events,
        )]),
    }
}

fn decide_sync(
    state: &UserAggregateState,
    remote_subscriptions: Vec<podsync_events::SubscriptionSnapshot>,
    remote_play_statuses: Vec<podsync_events::PlayStatusSnapshot>,
    remote_playlists: Vec<SyncPlaylist>,
    clock: &dyn Clock,
) -> Vec<EventPayload> {
    let mut events = Vec::new();

    for remote in remote_subscriptions {
        let local = state.subscriptions.get(&remote.feed);
        let local_side = SubscriptionSide {
            subscribed_at: local.map(|s| s.subscribed_at),
            unsubscribed_at: local.and_then(|s| s.unsubscribed_at),
        };
        let remote_side = SubscriptionSide {
            subscribed_at: Some(remote.subscribed_at),
            unsubscribed_at: remote.unsubscribed_at,
        };
        let (winner, resolution) = conflict::resolve_subscription(local_side, remote_side);
        if resolution == Resolution::NoConflict && local.is_some() {
            continue;
        }
        debug!(feed = %remote.feed, ?resolution, "resolved subscription sync");
        match winner.is_subscribed() {
            true => events.push(EventPayload::UserSubscribed {
                feed: remote.feed,
                source_id: remote.source_id,
                subscribed_at: winner.subscribed_at.unwrap_or_else(|| clock.now()),
            }),
            false => events.push(EventPayload::UserUnsubscribed {
                feed: remote.feed,
                source_id: Some(remote.source_id),
                unsubscribed_at: winner.unsubscribed_at.unwrap_or_else(|| clock.now()),
            }),
        }
    }

    for remote in remote_play_statuses {
        let local = state.play_statuses.get(&remote.item);
        let local_side = PlaySide {
            position: local.map(|p| p.position).unwrap_or(0),
            played: local.map(|p| p.played).unwrap_or(false),
            updated_at: local.map(|p| p.updated_at).unwrap_or(remote.updated_at),
            reset: false,
        };
        let remote_side = PlaySide {
            position: remote.position,
            played: remote.played,
            updated_at: remote.updated_at,
            reset: false,
        };
        let (winner, resolution, reason) = conflict::resolve_play_position(local_side, remote_side);
        if resolution == Resolution::NoConflict && local.is_some() {
            continue;
        }
        debug!(item = %remote.item, ?resolution, reason, "resolved play position sync");
        events.push(EventPayload::PlayRecorded {
            feed: remote.feed,
            item: remote.item,
            position: winner.position,
            played: winner.played,
            at: winner.updated_at,
        });
    }

    for remote in remote_playlists {
        let local = state.playlists.get(&remote.playlist_id);
        let local_side = PlaylistSide {
            name: local.map(|p| p.name.clone()).unwrap_or_else(|| remote.name.clone()),
            description: local.and_then(|p| p.description.clone()),
            is_public: local.map(|p| p.is_public).unwrap_or(false),
            updated_at: local.and_then(|p| p.updated_at).unwrap_or(remote.updated_at),
            items: local.map(|p| p.items.clone()).unwrap_or_default(),
        };
        let remote_side = PlaylistSide {
            name: remote.name.clone(),
            description: remote.description.clone(),
            is_public: remote.is_public,
            updated_at: remote.updated_at,
            items: remote.items.clone(),
        };
        let (merged, resolution) =
            conflict::resolve_playlist(&local_side, &remote_side, remote.base_items.as_deref());
        if resolution == Resolution::NoConflict && local.is_some() {
            continue;
        }
        debug!(playlist = %remote.playlist_id, ?resolution, "resolved playlist sync");
        events.push(EventPayload::PlaylistReordered {
            playlist_id: remote.playlist_id,
            items: merged.items,
        });
        events.push(EventPayload::PlaylistUpdated {
            playlist_id: remote.playlist_id,
            name: Some(merged.name),
            description: merged.description,
            at: remote.updated_at,
        });
    }

    events
}
