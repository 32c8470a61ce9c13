//! The subscription process manager (C6, spec §4.6): reacts to
//! `UserSubscribed` by ensuring the user's default "All Subscriptions"
//! collection exists and contains the newly subscribed feed.

use crate::checkpoint::CheckpointStore;
use futures::StreamExt;
use podsync_aggregate::Command;
use podsync_core::{CollectionId, DispatchError, DomainError, UserId};
use podsync_dispatcher::Dispatcher;
use podsync_events::{EventLog, EventPayload};
use std::sync::Arc;
use tracing::{error, warn};

pub struct ProcessManager {
    event_log: Arc<dyn EventLog>,
    dispatcher: Arc<Dispatcher>,
    checkpoint: Arc<dyn CheckpointStore>,
}

impl ProcessManager {
    pub fn new(event_log: Arc<dyn EventLog>, dispatcher: Arc<Dispatcher>, checkpoint: Arc<dyn CheckpointStore>) -> Self {
        Self { event_log, dispatcher, checkpoint }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        let from_position = self.checkpoint.load();
        let mut stream = self.event_log.subscribe_all(from_position);

        while let Some(result) = stream.next().await {
            let stored = match result {
                Ok(stored) => stored,
                Err(e) => {
                    error!(error = %e, "process manager read error, halting");
                    return;
                }
            };

            if let EventPayload::UserSubscribed { feed, .. } = &stored.payload {
                self.ensure_default_collection(&stored.stream_id, feed.clone()).await;
            }

            self.checkpoint.store(stored.position);
        }
    }

    /// Idempotent: `DefaultCollectionExists` is the expected outcome on every
    /// subscription after the user's first, and is swallowed (spec §4.6).
    async fn ensure_default_collection(&self, user_id: &UserId, feed: podsync_core::FeedId) {
        let collection_id = CollectionId::default_for_user(user_id);
        let create = self
            .dispatcher
            .dispatch(
                user_id.clone(),
                Command::CreateCollection {
                    collection_id: Some(collection_id),
                    title: "All Subscriptions".to_string(),
                    is_default: true,
                    description: None,
                    color: None,
                },
                None,
            )
            .await;

        match create {
            Ok(_) | Err(DispatchError::Domain(DomainError::DefaultCollectionExists)) => {}
            Err(e) => {
                warn!(%user_id, error = %e, "failed to ensure default collection, will retry on next event");
                return;
            }
        }

        if let Err(e) = self
            .dispatcher
            .dispatch(
                user_id.clone(),
                Command::AddFeedToCollection { collection_id, feed },
                None,
            )
            .await
        {
            warn!(%user_id, error = %e, "failed to add feed to default collection");
        }
    }
}
