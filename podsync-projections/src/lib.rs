//! The projection pipeline (C5, spec §4.5): independently-checkpointed read
//! models folded off the event log.

pub mod checkpoint;
pub mod models;
pub mod projector;
pub mod projectors;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore};
pub use models::{
    CollectionRow, CollectionsTable, PlayStatusRow, PlayStatusesTable, PlaylistItemRow, PlaylistRow,
    PlaylistsTable, PopularityTable, PublicEventKind, PublicEventRow, PublicEventsTable, SubscriptionRow,
    SubscriptionsTable, UserPrivacyTable,
};
pub use projector::{Projector, ProjectionPipeline};
pub use projectors::{
    ActivityProjector, CollectionsProjector, PlayStatusProjector, PlaylistsProjector, PrivacyProjector,
    SubscriptionsProjector,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use podsync_core::{FeedId, ItemId, SourceId, UserId};
    use podsync_events::{EventPayload, StoredEvent};
    use std::sync::Arc;
    use uuid::Uuid;

    fn stored(stream_id: &UserId, position: u64, payload: EventPayload) -> StoredEvent {
        StoredEvent {
            id: Uuid::new_v4(),
            position,
            stream_id: stream_id.clone(),
            stream_version: position,
            payload,
            timestamp: Utc::now(),
            event_infos: None,
        }
    }

    #[test]
    fn subscriptions_projector_upserts_then_unsubscribes() {
        let table = Arc::new(SubscriptionsTable::default());
        let projector = SubscriptionsProjector { table: table.clone() };
        let user = UserId::from("u1");
        let feed = FeedId::from("feed-1");

        let subscribe = stored(&user, 1, EventPayload::UserSubscribed {
            feed: feed.clone(),
            source_id: SourceId::from("src-1"),
            subscribed_at: Utc::now(),
        });
        projector.apply(&subscribe).unwrap();
        assert!(table.get(&user, &feed).unwrap().unsubscribed_at.is_none());

        let unsubscribe = stored(&user, 2, EventPayload::UserUnsubscribed {
            feed: feed.clone(),
            source_id: None,
            unsubscribed_at: Utc::now(),
        });
        projector.apply(&unsubscribe).unwrap();
        assert!(table.get(&user, &feed).unwrap().unsubscribed_at.is_some());
    }

    #[test]
    fn activity_projector_gates_on_public_privacy() {
        let public_events = Arc::new(PublicEventsTable::default());
        let popularity = Arc::new(PopularityTable::default());
        let privacy = Arc::new(UserPrivacyTable::default());
        let projector = ActivityProjector::new(public_events.clone(), popularity.clone(), privacy.clone());
        let user = UserId::from("u1");
        let feed = FeedId::from("feed-1");

        let event = stored(&user, 1, EventPayload::UserSubscribed {
            feed: feed.clone(),
            source_id: SourceId::from("src-1"),
            subscribed_at: Utc::now(),
        });
        projector.apply(&event).unwrap();
        assert_eq!(popularity.podcast_score(&feed), 0);
        assert!(public_events.for_user(&user).is_empty());

        privacy.set(&user, models::PrivacyScopeKeyInput::Global, podsync_core::PrivacyLevel::Public);
        let change = stored(&user, 2, EventPayload::PrivacyChanged {
            scope: podsync_events::PrivacyScopeTag::Global,
            feed: None,
            item: None,
            level: podsync_core::PrivacyLevel::Public,
            at: Utc::now(),
        });
        projector.apply(&change).unwrap();
        assert_eq!(popularity.podcast_score(&feed), 10);
        assert_eq!(public_events.for_user(&user).len(), 1);
    }

    #[test]
    fn activity_projector_removes_pruned_events_from_popularity() {
        let public_events = Arc::new(PublicEventsTable::default());
        let popularity = Arc::new(PopularityTable::default());
        let privacy = Arc::new(UserPrivacyTable::default());
        privacy.set(&UserId::from("u1"), models::PrivacyScopeKeyInput::Global, podsync_core::PrivacyLevel::Public);
        let projector = ActivityProjector::new(public_events.clone(), popularity.clone(), privacy.clone());
        let user = UserId::from("u1");
        let feed = FeedId::from("feed-1");
        let item = ItemId::from("item-1");

        let played = stored(&user, 1, EventPayload::PlayRecorded {
            feed: feed.clone(),
            item: item.clone(),
            position: 10,
            played: false,
            at: Utc::now(),
        });
        projector.apply(&played).unwrap();
        assert_eq!(popularity.episode_score(&feed, &item), 5);

        let removed = stored(&user, 2, EventPayload::EventsRemoved {
            feed: Some(feed.clone()),
            item: Some(item.clone()),
        });
        projector.apply(&removed).unwrap();
        assert_eq!(popularity.episode_score(&feed, &item), 0);
        assert!(public_events.for_feed_item(&feed, &item).is_empty());
    }
}
