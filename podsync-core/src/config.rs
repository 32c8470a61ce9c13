//! Runtime configuration (spec §6's enumerated environment/config values),
//! plus the ambient logging/storage/http sections every teacher service
//! carries alongside its domain config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days after which an aggregate becomes eligible for a `Snapshot`
    /// checkpoint (spec §4.7, §6). Default 45.
    pub checkpoint_days: u32,
    /// Days before which events may be physically pruned once a checkpoint
    /// covers them (spec §4.7, §6). Default 31.
    pub prune_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            checkpoint_days: 45,
            prune_days: 31,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub max_retries: u32,
    pub command_default_deadline_ms: u64,
    /// Bound on each per-aggregate worker's inbound queue (spec §5
    /// backpressure: exceeding it returns `InfrastructureError::Busy`).
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            command_default_deadline_ms: 5_000,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub batch_size: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { batch_size: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/podsync".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PodsyncConfig {
    pub retention: RetentionConfig,
    pub dispatcher: DispatcherConfig,
    pub projection: ProjectionConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("retention_prune_days ({prune}) must not exceed retention_checkpoint_days ({checkpoint})")]
    PruneExceedsCheckpoint { prune: u32, checkpoint: u32 },
    #[error("dispatcher queue_capacity must be greater than zero")]
    ZeroQueueCapacity,
    #[error("projection batch_size must be greater than zero")]
    ZeroBatchSize,
}

impl PodsyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention.prune_days > self.retention.checkpoint_days {
            return Err(ConfigError::PruneExceedsCheckpoint {
                prune: self.retention.prune_days,
                checkpoint: self.retention.checkpoint_days,
            });
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.projection.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}
