//! The event log contract (spec §4.1, C1): append-only, per-stream ordered,
//! durable on append, globally ordered for subscribers.

use crate::event::{EventInfo, EventPayload, StoredEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use podsync_core::UserId;
use thiserror::Error;

/// An event not yet assigned a position/version — what a caller hands to
/// `append`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub payload: EventPayload,
    pub event_infos: Option<EventInfo>,
}

impl NewEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            event_infos: None,
        }
    }

    pub fn with_info(payload: EventPayload, event_infos: EventInfo) -> Self {
        Self {
            payload,
            event_infos: Some(event_infos),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// `expected_version` did not match the stored head (spec §4.1).
    #[error("conflict: expected version {expected}, stream is at {actual}")]
    Conflict { expected: u64, actual: u64 },
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventLogError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("attempted to read a stream position older than its most recent checkpoint")]
    BeforeCheckpoint,
}

pub type EventResult = Result<StoredEvent, EventLogError>;

/// Contract for C1 (spec §4.1). Implementations must guarantee: within a
/// stream, versions are a gap-free, strictly increasing sequence starting at
/// 1; global position is strictly increasing (not necessarily contiguous);
/// durability is synchronous on `append`.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends `events` atomically at `expected_version + 1 ..=
    /// expected_version + events.len()`. `now` stamps every event's server
    /// timestamp — the caller supplies it so the whole pipeline stays
    /// testable against an injected clock.
    async fn append(
        &self,
        stream_id: &UserId,
        expected_version: u64,
        events: Vec<NewEvent>,
        now: DateTime<Utc>,
    ) -> Result<u64, AppendError>;

    /// Forward read of one stream, starting at `from_version` (inclusive).
    fn read_stream(&self, stream_id: &UserId, from_version: u64) -> BoxStream<'static, EventResult>;

    /// Forward read of the whole log ordered by global position.
    fn read_all(&self, from_position: u64) -> BoxStream<'static, EventResult>;

    /// At-least-once delivery of events from `from_position` onward,
    /// followed by live events as they are appended.
    fn subscribe_all(&self, from_position: u64) -> BoxStream<'static, EventResult>;

    /// Explicit prune API (spec design note #3): removes physical storage
    /// for versions strictly less than `before_version` on `stream_id`.
    /// Returns the number of events pruned. Never touches versions at or
    /// after `before_version`.
    async fn prune(&self, stream_id: &UserId, before_version: u64) -> Result<u64, EventLogError>;

    /// The current (highest) version recorded for a stream, or 0 if the
    /// stream has never been written to.
    async fn current_version(&self, stream_id: &UserId) -> u64;
}
