//! The checkpoint and prune worker (C7): keeps streams short by folding old
//! events into a snapshot checkpoint, then physically discarding events the
//! retention window no longer requires.

pub mod compaction;

pub use compaction::{CompactionOptions, CompactionWorker};
