//! The process manager's own durable cursor (spec §4.6: "a durable event
//! handler with its own checkpoint"), independent of any projector's.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> u64;
    fn store(&self, position: u64);
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    position: AtomicU64,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    fn store(&self, position: u64) {
        self.position.store(position, Ordering::SeqCst);
    }
}
