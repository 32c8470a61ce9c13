//! In-memory `EventLog`, used by tests and by the projector/dispatcher unit
//! tests elsewhere in the workspace. Mirrors the broadcast-channel shape of
//! an in-memory event store: appends publish onto a `tokio::sync::broadcast`
//! channel that `subscribe_all` replays from, backed by a per-stream vector
//! guarded by `parking_lot::RwLock`.

use crate::event::StoredEvent;
use crate::store::{AppendError, EventLog, EventLogError, EventResult, NewEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use podsync_core::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

const SUBSCRIBE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct StreamState {
    events: Vec<StoredEvent>,
    /// Highest version ever appended. Tracked separately from `events.len()`
    /// because pruning removes entries from `events` without rolling back
    /// the stream's logical version (spec §4.7).
    head_version: u64,
}

#[derive(Default)]
struct Streams {
    by_user: HashMap<UserId, StreamState>,
}

pub struct InMemoryEventLog {
    streams: Arc<RwLock<Streams>>,
    global_position: Arc<AtomicU64>,
    tx: broadcast::Sender<StoredEvent>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SUBSCRIBE_CHANNEL_CAPACITY);
        Self {
            streams: Arc::new(RwLock::new(Streams::default())),
            global_position: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    fn all_events_snapshot(&self) -> Vec<StoredEvent> {
        let streams = self.streams.read();
        let mut all: Vec<StoredEvent> = streams
            .by_user
            .values()
            .flat_map(|s| s.events.iter().cloned())
            .collect();
        all.sort_by_key(|e| e.position);
        all
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        stream_id: &UserId,
        expected_version: u64,
        events: Vec<NewEvent>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppendError> {
        if events.is_empty() {
            return Ok(expected_version);
        }
        let mut streams = self.streams.write();
        let stream = streams.by_user.entry(stream_id.clone()).or_default();
        let actual = stream.head_version;
        if actual != expected_version {
            return Err(AppendError::Conflict {
                expected: expected_version,
                actual,
            });
        }

        let mut stored = Vec::with_capacity(events.len());
        for (offset, new_event) in events.into_iter().enumerate() {
            let version = expected_version + offset as u64 + 1;
            let position = self.global_position.fetch_add(1, Ordering::SeqCst) + 1;
            let event = StoredEvent {
                id: Uuid::new_v4(),
                position,
                stream_id: stream_id.clone(),
                stream_version: version,
                payload: new_event.payload,
                timestamp: now,
                event_infos: new_event.event_infos,
            };
            stream.events.push(event.clone());
            stored.push(event);
        }
        stream.head_version = expected_version + stored.len() as u64;
        let new_version = stream.head_version;
        drop(streams);

        for event in stored {
            // A full channel just means no subscribers are currently
            // listening; `read_all`/`read_stream` remain the source of
            // truth for historical reads.
            let _ = self.tx.send(event);
        }

        Ok(new_version)
    }

    fn read_stream(&self, stream_id: &UserId, from_version: u64) -> BoxStream<'static, EventResult> {
        let streams = self.streams.read();
        let events: Vec<StoredEvent> = streams
            .by_user
            .get(stream_id)
            .map(|s| {
                s.events
                    .iter()
                    .filter(|e| e.stream_version >= from_version.max(1))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(events.into_iter().map(Ok)).boxed()
    }

    fn read_all(&self, from_position: u64) -> BoxStream<'static, EventResult> {
        let events: Vec<StoredEvent> = self
            .all_events_snapshot()
            .into_iter()
            .filter(|e| e.position >= from_position)
            .collect();
        stream::iter(events.into_iter().map(Ok)).boxed()
    }

    fn subscribe_all(&self, from_position: u64) -> BoxStream<'static, EventResult> {
        // Subscribe before snapshotting: any event appended in between is
        // already visible to the receiver, so it either lands in the
        // snapshot or arrives live, never both and never neither.
        let rx = self.tx.subscribe();
        let backlog: Vec<StoredEvent> = self
            .all_events_snapshot()
            .into_iter()
            .filter(|e| e.position >= from_position)
            .collect();
        let last_backlog_position = backlog.last().map(|e| e.position).unwrap_or(0);

        let live = BroadcastStream::new(rx).filter_map(move |res| {
            let last = last_backlog_position;
            async move {
                match res {
                    Ok(event) if event.position > last => Some(Ok(event)),
                    Ok(_) => None,
                    Err(_lagged) => None,
                }
            }
        });

        stream::iter(backlog.into_iter().map(Ok)).chain(live).boxed()
    }

    async fn prune(&self, stream_id: &UserId, before_version: u64) -> Result<u64, EventLogError> {
        let mut streams = self.streams.write();
        let Some(stream) = streams.by_user.get_mut(stream_id) else {
            return Ok(0);
        };
        let before = stream.events.len();
        stream.events.retain(|e| e.stream_version >= before_version);
        Ok((before - stream.events.len()) as u64)
    }

    async fn current_version(&self, stream_id: &UserId) -> u64 {
        let streams = self.streams.read();
        streams
            .by_user
            .get(stream_id)
            .map(|s| s.head_version)
            .unwrap_or(0)
    }
}
