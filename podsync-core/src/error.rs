//! Error taxonomy (spec §7): domain errors are deterministic and returned to
//! the caller; infrastructure errors describe the dispatcher's interaction
//! with the event log; projector errors are non-fatal to the write path.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("a default collection already exists for this user")]
    DefaultCollectionExists,

    #[error("collection id already in use by a different collection")]
    DuplicateSlug,

    #[error("collection not found")]
    CollectionNotFound,

    #[error("feed is not subscribed")]
    FeedNotSubscribed,

    #[error("the default collection cannot be deleted")]
    CannotDeleteDefault,

    #[error("playlist not found")]
    PlaylistNotFound,

    #[error("invalid privacy level")]
    InvalidPrivacyLevel,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("optimistic concurrency conflict on stream")]
    Conflict,
    #[error("command deadline elapsed before the append completed")]
    Timeout,
    #[error("aggregate worker queue is full")]
    Busy,
    #[error("event log is unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectorError {
    #[error("projector {projector} failed at position {position}: {reason}")]
    Failed {
        projector: String,
        position: u64,
        reason: String,
    },
}

/// Top-level error a command dispatch can resolve to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}
