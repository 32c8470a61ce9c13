//! The `Projector` trait and the pipeline that drives projectors off the
//! event log (spec §4.5, C5). Each projector runs its own subscription loop
//! with an independent checkpoint, so a slow or poisoned projector never
//! blocks another (spec §7: "a stuck projector must not block the write
//! path").

use crate::checkpoint::CheckpointStore;
use futures::StreamExt;
use podsync_core::ProjectorError;
use podsync_events::{EventLog, StoredEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One read-model builder. `apply` must be idempotent: at-least-once
/// delivery means the same event can be handed to it more than once after a
/// crash-restart replay from the last stored checkpoint.
pub trait Projector: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, event: &StoredEvent) -> Result<(), ProjectorError>;
}

const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Drives every registered projector against a shared event log. Each
/// projector gets its own task so independent checkpoints (spec §4.5) are
/// also independent failure domains.
pub struct ProjectionPipeline {
    event_log: Arc<dyn EventLog>,
    checkpoints: Arc<dyn CheckpointStore>,
    projectors: Vec<Arc<dyn Projector>>,
}

impl ProjectionPipeline {
    pub fn new(event_log: Arc<dyn EventLog>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            event_log,
            checkpoints,
            projectors: Vec::new(),
        }
    }

    pub fn register(&mut self, projector: Arc<dyn Projector>) {
        self.projectors.push(projector);
    }

    /// Spawns one driver task per registered projector. Returns their join
    /// handles so callers (tests, or the server's shutdown path) can await
    /// or abort them.
    pub fn spawn_all(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.projectors
            .iter()
            .map(|projector| {
                let event_log = self.event_log.clone();
                let checkpoints = self.checkpoints.clone();
                let projector = projector.clone();
                tokio::spawn(run_projector(event_log, checkpoints, projector))
            })
            .collect()
    }
}

/// The per-projector driver loop: catch up from the last checkpoint, then
/// follow live events, retrying a failing event with exponential backoff up
/// to `MAX_CONSECUTIVE_FAILURES` before halting (spec §7's poison-event
/// policy — halted projectors need operator intervention, which here means
/// restarting the pipeline after fixing the underlying data or code).
async fn run_projector(
    event_log: Arc<dyn EventLog>,
    checkpoints: Arc<dyn CheckpointStore>,
    projector: Arc<dyn Projector>,
) {
    let name = projector.name();
    let from_position = checkpoints.load(name);
    info!(projector = name, from_position, "starting projector");

    let mut stream = event_log.subscribe_all(from_position);
    let mut consecutive_failures = 0u32;
    let mut backoff = INITIAL_BACKOFF;

    while let Some(result) = stream.next().await {
        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                error!(projector = name, error = %e, "event log read error, halting");
                return;
            }
        };

        loop {
            match projector.apply(&stored) {
                Ok(()) => {
                    checkpoints.store(name, stored.position);
                    metrics::gauge!("podsync_projector_checkpoint", "projector" => name).set(stored.position as f64);
                    consecutive_failures = 0;
                    backoff = INITIAL_BACKOFF;
                    break;
                }
                Err(ProjectorError::Failed { position, reason, .. }) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        error!(
                            projector = name,
                            position,
                            reason,
                            "poison event after repeated failures, halting projector"
                        );
                        return;
                    }
                    warn!(
                        projector = name,
                        position,
                        reason,
                        attempt = consecutive_failures,
                        "projector apply failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
