//! The per-aggregate command dispatcher (C4, spec §4.4): one serialized
//! worker per active user, optimistic-concurrency retry, bounded
//! concurrency for backpressure.

use dashmap::DashMap;
use futures::StreamExt;
use podsync_aggregate::{apply_event, decide, Command, UserAggregateState};
use podsync_core::{Clock, DispatchError, InfrastructureError, UserId};
use podsync_events::{EventLog, EventPayload, NewEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

#[derive(Default)]
struct CachedAggregate {
    state: UserAggregateState,
    version: u64,
    loaded: bool,
}

/// Configuration the dispatcher needs at construction time. Mirrors
/// `podsync_core::config::DispatcherConfig` but keeps this crate decoupled
/// from the config crate's exact shape.
pub struct DispatcherOptions {
    pub max_retries: u32,
    pub command_default_deadline: Duration,
    pub queue_capacity: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            command_default_deadline: Duration::from_millis(5000),
            queue_capacity: 256,
        }
    }
}

pub struct Dispatcher {
    event_log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
    aggregates: DashMap<UserId, Arc<Mutex<CachedAggregate>>>,
    concurrency: Arc<Semaphore>,
    options: DispatcherOptions,
}

impl Dispatcher {
    pub fn new(event_log: Arc<dyn EventLog>, clock: Arc<dyn Clock>, options: DispatcherOptions) -> Self {
        let concurrency = Arc::new(Semaphore::new(options.queue_capacity));
        Self {
            event_log,
            clock,
            aggregates: DashMap::new(),
            concurrency,
            options,
        }
    }

    /// Dispatches `command` against `user_id`'s aggregate. Returns the
    /// events the aggregate decided on (empty if the command was a no-op).
    pub async fn dispatch(
        &self,
        user_id: UserId,
        command: Command,
        deadline: Option<Duration>,
    ) -> Result<Vec<EventPayload>, DispatchError> {
        let _permit = self
            .concurrency
            .clone()
            .try_acquire_owned()
            .map_err(|_| DispatchError::Infrastructure(InfrastructureError::Busy))?;

        let deadline = deadline.unwrap_or(self.options.command_default_deadline);
        let cell = self
            .aggregates
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CachedAggregate::default())))
            .clone();

        let fut = self.dispatch_locked(&cell, &user_id, command);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Infrastructure(InfrastructureError::Timeout)),
        }
    }

    async fn dispatch_locked(
        &self,
        cell: &Arc<Mutex<CachedAggregate>>,
        user_id: &UserId,
        command: Command,
    ) -> Result<Vec<EventPayload>, DispatchError> {
        let mut cached = cell.lock().await;
        if !cached.loaded {
            let (state, version) = self.load_aggregate(user_id).await?;
            cached.state = state;
            cached.version = version;
            cached.loaded = true;
        }

        let mut attempt = 0;
        loop {
            let events = decide(&cached.state, command.clone(), self.clock.as_ref())
                .map_err(DispatchError::Domain)?;
            if events.is_empty() {
                return Ok(vec![]);
            }

            let new_events: Vec<NewEvent> = events.iter().cloned().map(NewEvent::new).collect();
            let now = self.clock.now();
            match self
                .event_log
                .append(user_id, cached.version, new_events, now)
                .await
            {
                Ok(new_version) => {
                    for event in &events {
                        apply_event(&mut cached.state, user_id, event);
                    }
                    cached.version = new_version;
                    return Ok(events);
                }
                Err(podsync_events::AppendError::Conflict { actual, .. }) => {
                    attempt += 1;
                    if attempt > self.options.max_retries {
                        warn!(%user_id, attempt, "exhausted retries after repeated conflicts");
                        return Err(DispatchError::Infrastructure(InfrastructureError::Conflict));
                    }
                    debug!(%user_id, attempt, actual, "conflict, reloading and retrying");
                    let (state, version) = self.load_aggregate(user_id).await?;
                    cached.state = state;
                    cached.version = version;
                }
                Err(podsync_events::AppendError::Storage(reason)) => {
                    return Err(DispatchError::Infrastructure(InfrastructureError::Unavailable(
                        reason,
                    )));
                }
            }
        }
    }

    /// Rebuilds state from the stream: folds from the most recent
    /// `UserCheckpoint` (if any) onward, never from further back (spec
    /// §4.7 safety note).
    async fn load_aggregate(
        &self,
        user_id: &UserId,
    ) -> Result<(UserAggregateState, u64), DispatchError> {
        let mut stream = self.event_log.read_stream(user_id, 0);
        let mut events = Vec::new();
        while let Some(result) = stream.next().await {
            let stored = result.map_err(|e| {
                DispatchError::Infrastructure(InfrastructureError::Unavailable(e.to_string()))
            })?;
            events.push(stored);
        }

        let checkpoint_index = events
            .iter()
            .rposition(|e| e.payload.is_checkpoint());
        let fold_from = checkpoint_index.unwrap_or(0);
        let version = events.last().map(|e| e.stream_version).unwrap_or(0);

        let state = podsync_aggregate::fold(
            user_id,
            events[fold_from..].iter().map(|e| &e.payload),
        );
        Ok((state, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podsync_core::{DomainError, FeedId, FixedClock, SourceId};
    use podsync_events::InMemoryEventLog;

    fn dispatcher(options: DispatcherOptions) -> Dispatcher {
        let log = Arc::new(InMemoryEventLog::new());
        let clock = Arc::new(FixedClock::at(chrono::Utc::now()));
        Dispatcher::new(log, clock, options)
    }

    #[tokio::test]
    async fn dispatch_persists_and_updates_cache() {
        let d = dispatcher(DispatcherOptions::default());
        let user = UserId::from("u1");
        let events = d
            .dispatch(
                user.clone(),
                Command::Subscribe {
                    feed: FeedId::from("feed-1"),
                    source_id: SourceId::from("src-1"),
                    subscribed_at: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let cached = d.aggregates.get(&user).unwrap().clone();
        let guard = cached.lock().await;
        assert_eq!(guard.version, 1);
        assert!(guard.state.is_subscribed(&FeedId::from("feed-1")));
    }

    #[tokio::test]
    async fn domain_error_does_not_advance_version() {
        let d = dispatcher(DispatcherOptions::default());
        let user = UserId::from("u1");
        let err = d
            .dispatch(
                user.clone(),
                Command::CreateCollection {
                    collection_id: None,
                    title: "   ".into(),
                    is_default: false,
                    description: None,
                    color: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::EmptyTitle)));
    }

    #[tokio::test]
    async fn zero_capacity_returns_busy() {
        let d = dispatcher(DispatcherOptions {
            queue_capacity: 0,
            ..DispatcherOptions::default()
        });
        let err = d
            .dispatch(
                UserId::from("u1"),
                Command::Subscribe {
                    feed: FeedId::from("feed-1"),
                    source_id: SourceId::from("src-1"),
                    subscribed_at: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Infrastructure(InfrastructureError::Busy)
        ));
    }
}
