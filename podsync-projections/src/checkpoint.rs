//! Per-projector checkpoints (spec §4.5: "each projector tracks its own
//! position independently"). The in-memory store here is what
//! `podsync-server` wires up by default; a sled-backed one can implement the
//! same trait without touching the pipeline.

use dashmap::DashMap;

/// A durable cursor: the global log position a projector has fully
/// processed through. `0` means "never run".
pub trait CheckpointStore: Send + Sync {
    fn load(&self, projector: &str) -> u64;
    fn store(&self, projector: &str, position: u64);
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    positions: DashMap<String, u64>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, projector: &str) -> u64 {
        self.positions.get(projector).map(|p| *p).unwrap_or(0)
    }

    fn store(&self, projector: &str, position: u64) {
        self.positions.insert(projector.to_string(), position);
    }
}
