//! Durable `EventLog` backed by `sled`, the way `narayana-storage`'s
//! `PersistenceStrategy::Sled` names it as the "Rust-native" embedded
//! backend. Keeps two views of every event (by `(stream_id, version)` and by
//! global `position`) so both `read_stream` and `read_all` are plain
//! key-ordered scans, and commits both atomically via sled's transactional
//! trees so `append` never leaves them inconsistent (spec §4.1: durability
//! is synchronous on append).

use crate::event::StoredEvent;
use crate::store::{AppendError, EventLog, EventLogError, EventResult, NewEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use podsync_core::UserId;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};
use uuid::Uuid;

const SUBSCRIBE_CHANNEL_CAPACITY: usize = 1024;

fn stream_key(stream_id: &UserId, version: u64) -> Vec<u8> {
    let mut key = stream_id.0.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn stream_prefix(stream_id: &UserId) -> Vec<u8> {
    let mut key = stream_id.0.as_bytes().to_vec();
    key.push(0);
    key
}

fn position_key(position: u64) -> [u8; 8] {
    position.to_be_bytes()
}

fn head_version_key(stream_id: &UserId) -> Vec<u8> {
    let mut key = b"head:".to_vec();
    key.extend_from_slice(stream_id.0.as_bytes());
    key
}

pub struct SledEventLog {
    by_stream: Tree,
    by_position: Tree,
    meta: Tree,
    global_position: Arc<AtomicU64>,
    tx: broadcast::Sender<StoredEvent>,
}

impl SledEventLog {
    pub fn open(data_dir: &str) -> sled::Result<Self> {
        let db: Db = sled::open(data_dir)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &Db) -> sled::Result<Self> {
        let by_stream = db.open_tree("podsync_events_by_stream")?;
        let by_position = db.open_tree("podsync_events_by_position")?;
        let meta = db.open_tree("podsync_meta")?;
        let global_position = meta
            .get(b"global_position")?
            .map(|v| u64::from_be_bytes(v.as_ref().try_into().unwrap_or([0; 8])))
            .unwrap_or(0);
        let (tx, _rx) = broadcast::channel(SUBSCRIBE_CHANNEL_CAPACITY);
        info!(global_position, "opened sled event log");
        Ok(Self {
            by_stream,
            by_position,
            meta,
            global_position: Arc::new(AtomicU64::new(global_position)),
            tx,
        })
    }

    fn head_version_sync(&self, stream_id: &UserId) -> sled::Result<u64> {
        Ok(self
            .meta
            .get(head_version_key(stream_id))?
            .map(|v| u64::from_be_bytes(v.as_ref().try_into().unwrap_or([0; 8])))
            .unwrap_or(0))
    }
}

#[async_trait]
impl EventLog for SledEventLog {
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

        let actual = self
            .head_version_sync(stream_id)
            .map_err(|e| AppendError::Storage(e.to_string()))?;
        if actual != expected_version {
            return Err(AppendError::Conflict {
                expected: expected_version,
                actual,
            });
        }

        let mut stored = Vec::with_capacity(events.len());
        let mut position = self.global_position.load(Ordering::SeqCst);
        for (offset, new_event) in events.into_iter().enumerate() {
            position += 1;
            let version = expected_version + offset as u64 + 1;
            stored.push(StoredEvent {
                id: Uuid::new_v4(),
                position,
                stream_id: stream_id.clone(),
                stream_version: version,
                payload: new_event.payload,
                timestamp: now,
                event_infos: new_event.event_infos,
            });
        }
        let new_head = expected_version + stored.len() as u64;

        let result: Result<(), TransactionError<String>> =
            (&self.by_stream, &self.by_position, &self.meta).transaction(
                |(by_stream, by_position, meta)| {
                    for event in &stored {
                        let bytes = bincode::serialize(event)
                            .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;
                        by_stream
                            .insert(stream_key(stream_id, event.stream_version), bytes.clone())?;
                        by_position.insert(&position_key(event.position), bytes)?;
                    }
                    meta.insert(head_version_key(stream_id), &new_head.to_be_bytes())?;
                    meta.insert(b"global_position", &position.to_be_bytes())?;
                    Ok(())
                },
            );
        result.map_err(|e| AppendError::Storage(e.to_string()))?;
        self.global_position.store(position, Ordering::SeqCst);

        for event in stored {
            let _ = self.tx.send(event);
        }
        Ok(new_head)
    }

    fn read_stream(&self, stream_id: &UserId, from_version: u64) -> BoxStream<'static, EventResult> {
        let prefix = stream_prefix(stream_id);
        let from_version = from_version.max(1);
        let events: Vec<EventResult> = self
            .by_stream
            .scan_prefix(&prefix)
            .values()
            .filter_map(|res| match res {
                Ok(bytes) => match bincode::deserialize::<StoredEvent>(&bytes) {
                    Ok(event) if event.stream_version >= from_version => Some(Ok(event)),
                    Ok(_) => None,
                    Err(e) => Some(Err(EventLogError::Storage(e.to_string()))),
                },
                Err(e) => Some(Err(EventLogError::Storage(e.to_string()))),
            })
            .collect();
        stream::iter(events).boxed()
    }

    fn read_all(&self, from_position: u64) -> BoxStream<'static, EventResult> {
        let start = position_key(from_position);
        let events: Vec<EventResult> = self
            .by_position
            .range(start.to_vec()..)
            .values()
            .map(|res| match res {
                Ok(bytes) => bincode::deserialize::<StoredEvent>(&bytes)
                    .map_err(|e| EventLogError::Storage(e.to_string())),
                Err(e) => Err(EventLogError::Storage(e.to_string())),
            })
            .collect();
        stream::iter(events).boxed()
    }

    fn subscribe_all(&self, from_position: u64) -> BoxStream<'static, EventResult> {
        // Subscribe before scanning: any event appended in between is
        // already visible to the receiver, so it either lands in the
        // snapshot or arrives live, never both and never neither.
        let rx = self.tx.subscribe();
        let backlog: Vec<StoredEvent> = self
            .by_position
            .range(position_key(from_position).to_vec()..)
            .values()
            .filter_map(|res| res.ok())
            .filter_map(|bytes| bincode::deserialize::<StoredEvent>(&bytes).ok())
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
        let prefix = stream_prefix(stream_id);
        let mut pruned = 0u64;
        let mut victims = Vec::new();
        for kv in self.by_stream.scan_prefix(&prefix) {
            let (key, bytes) = kv.map_err(|e| EventLogError::Storage(e.to_string()))?;
            let event: StoredEvent =
                bincode::deserialize(&bytes).map_err(|e| EventLogError::Storage(e.to_string()))?;
            if event.stream_version < before_version {
                victims.push((key, event.position));
            }
        }
        for (key, position) in victims {
            self.by_stream
                .remove(&key)
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            self.by_position
                .remove(&position_key(position))
                .map_err(|e| EventLogError::Storage(e.to_string()))?;
            pruned += 1;
        }
        if pruned > 0 {
            info!(stream = %stream_id, before_version, pruned, "pruned events");
        } else {
            debug!(stream = %stream_id, before_version, "prune found nothing older than boundary");
        }
        Ok(pruned)
    }

    async fn current_version(&self, stream_id: &UserId) -> u64 {
        self.head_version_sync(stream_id).unwrap_or(0)
    }
}
