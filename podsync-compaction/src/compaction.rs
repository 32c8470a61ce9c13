//! Periodic checkpoint + prune worker (C7, spec §4.7): snapshots users whose
//! oldest unchecked event has aged past `retention_checkpoint_days`, then
//! physically prunes events older than `retention_prune_days` that precede
//! the checkpoint.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use podsync_aggregate::Command;
use podsync_core::{Clock, UserId};
use podsync_dispatcher::Dispatcher;
use podsync_events::EventLog;
use podsync_projections::ActivityProjector;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct CompactionOptions {
    pub tick_interval: Duration,
    pub retention_checkpoint_days: i64,
    pub retention_prune_days: i64,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15 * 60),
            retention_checkpoint_days: 45,
            retention_prune_days: 31,
        }
    }
}

/// The oldest event timestamp seen for a user since its last checkpoint. The
/// event log has no built-in "oldest event per stream" query, so the worker
/// maintains this itself by tailing the log.
struct UserWindow {
    oldest_unchecked_at: DateTime<Utc>,
}

pub struct CompactionWorker {
    event_log: Arc<dyn EventLog>,
    dispatcher: Arc<Dispatcher>,
    activity: Arc<ActivityProjector>,
    clock: Arc<dyn Clock>,
    options: CompactionOptions,
    windows: DashMap<UserId, UserWindow>,
}

impl CompactionWorker {
    pub fn new(
        event_log: Arc<dyn EventLog>,
        dispatcher: Arc<Dispatcher>,
        activity: Arc<ActivityProjector>,
        clock: Arc<dyn Clock>,
        options: CompactionOptions,
    ) -> Self {
        Self {
            event_log,
            dispatcher,
            activity,
            clock,
            options,
            windows: DashMap::new(),
        }
    }

    /// Starts the background tracker and timer tasks. Returns their handles
    /// so the server's shutdown path can abort them.
    pub fn spawn(self: Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        (self.clone().spawn_tracker(), self.clone().spawn_ticker())
    }

    /// Tails the log to keep `windows` current: the first unchecked event
    /// for a user seeds its window; a `UserCheckpoint` clears it, since the
    /// post-checkpoint stream has no unchecked events yet.
    fn spawn_tracker(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut stream = self.event_log.subscribe_all(0);
            while let Some(result) = stream.next().await {
                let Ok(stored) = result else { return };
                if stored.payload.is_checkpoint() {
                    self.windows.remove(&stored.stream_id);
                    continue;
                }
                self.windows
                    .entry(stored.stream_id.clone())
                    .or_insert_with(|| UserWindow { oldest_unchecked_at: stored.timestamp });
            }
        })
    }

    fn spawn_ticker(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.options.tick_interval);
            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }

    pub async fn run_once(&self) {
        let now = self.clock.now();
        let old_cutoff = now - ChronoDuration::days(self.options.retention_checkpoint_days);
        let due: Vec<UserId> = self
            .windows
            .iter()
            .filter(|entry| entry.value().oldest_unchecked_at < old_cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        for user_id in due {
            self.compact_user(&user_id, now).await;
        }
    }

    async fn compact_user(&self, user_id: &UserId, now: DateTime<Utc>) {
        let result = self
            .dispatcher
            .dispatch(user_id.clone(), Command::Snapshot { cleanup_old_events: true }, None)
            .await;
        match result {
            Ok(_) => {}
            Err(e) => {
                warn!(%user_id, error = %e, "checkpoint dispatch failed, will retry next tick");
                return;
            }
        }

        let checkpoint_version = self.event_log.current_version(user_id).await;
        self.windows.remove(user_id);

        let prune_cutoff = now - ChronoDuration::days(self.options.retention_prune_days);
        let Some(before_version) = self.prune_boundary(user_id, checkpoint_version, prune_cutoff).await else {
            return;
        };
        if before_version <= 1 {
            return;
        }

        match self.event_log.prune(user_id, before_version).await {
            Ok(pruned) => {
                info!(%user_id, pruned, before_version, "pruned compacted stream");
                self.activity.retract_pruned(user_id, before_version);
            }
            Err(e) => {
                warn!(%user_id, error = %e, "prune failed after checkpoint append; checkpoint is kept, retry is idempotent");
            }
        }
    }

    /// The highest version strictly before `checkpoint_version` such that
    /// every earlier event is at or before `prune_cutoff`. `None` means a
    /// read error was hit; pruning is skipped and retried next tick.
    async fn prune_boundary(&self, user_id: &UserId, checkpoint_version: u64, prune_cutoff: DateTime<Utc>) -> Option<u64> {
        let mut stream = self.event_log.read_stream(user_id, 0);
        let mut boundary = 1u64;
        while let Some(result) = stream.next().await {
            let stored = result.ok()?;
            if stored.stream_version >= checkpoint_version {
                break;
            }
            if stored.timestamp <= prune_cutoff {
                boundary = stored.stream_version + 1;
            }
        }
        Some(boundary.min(checkpoint_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podsync_core::{FeedId, FixedClock, SourceId};
    use podsync_dispatcher::DispatcherOptions;
    use podsync_events::InMemoryEventLog;
    use podsync_projections::{PopularityTable, PublicEventsTable, UserPrivacyTable};

    fn worker(clock: Arc<FixedClock>) -> (Arc<CompactionWorker>, Arc<InMemoryEventLog>, Arc<Dispatcher>) {
        let log = Arc::new(InMemoryEventLog::new());
        let dispatcher = Arc::new(Dispatcher::new(log.clone(), clock.clone(), DispatcherOptions::default()));
        let activity = Arc::new(ActivityProjector::new(
            Arc::new(PublicEventsTable::default()),
            Arc::new(PopularityTable::default()),
            Arc::new(UserPrivacyTable::default()),
        ));
        let options = CompactionOptions {
            tick_interval: Duration::from_secs(900),
            retention_checkpoint_days: 45,
            retention_prune_days: 31,
        };
        let worker = Arc::new(CompactionWorker::new(log.clone(), dispatcher.clone(), activity, clock, options));
        (worker, log, dispatcher)
    }

    #[tokio::test]
    async fn old_stream_is_checkpointed_and_pruned() {
        let start = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let clock = Arc::new(FixedClock::at(start));
        let (worker, log, dispatcher) = worker(clock.clone());
        let _tracker = worker.clone().spawn_tracker();

        let user = UserId::from("u1");
        dispatcher
            .dispatch(
                user.clone(),
                Command::Subscribe { feed: FeedId::from("f1"), source_id: SourceId::from("s1"), subscribed_at: None },
                None,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.advance(chrono::Duration::days(60));
        worker.run_once().await;

        let version = log.current_version(&user).await;
        assert_eq!(version, 2, "subscribe event plus the checkpoint");
    }
}
