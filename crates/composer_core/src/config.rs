use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobKind;

/// Maximum poll attempts per job kind before a job is failed with a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptCeilings {
    pub image: u32,
    pub video: u32,
    pub audio: u32,
    pub infographic: u32,
}

impl Default for AttemptCeilings {
    fn default() -> Self {
        Self {
            image: 60,
            video: 120,
            audio: 150,
            infographic: 60,
        }
    }
}

impl AttemptCeilings {
    pub fn for_kind(&self, kind: JobKind) -> u32 {
        match kind {
            JobKind::Image => self.image,
            JobKind::Video => self.video,
            JobKind::Audio => self.audio,
            JobKind::Infographic => self.infographic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll_interval_ms: u64,
    pub attempt_ceilings: AttemptCeilings,
    /// Fingerprints kept before the least recently used one is evicted.
    pub dedup_capacity: usize,
    /// Resolved jobs kept for inspection after they leave the registry.
    pub history_capacity: usize,
    pub persist_debounce_ms: u64,
    pub persist_retry_attempts: u32,
    pub persist_backoff_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4_000,
            attempt_ceilings: AttemptCeilings::default(),
            dedup_capacity: 4_096,
            history_capacity: 64,
            persist_debounce_ms: 1_500,
            persist_retry_attempts: 4,
            persist_backoff_ms: 500,
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_backoff_ms)
    }
}
