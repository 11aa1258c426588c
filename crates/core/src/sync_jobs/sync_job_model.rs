//! Sync job state machine for wallet and bank synchronization badges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one external sync job.
///
/// `idle -> queued -> syncing -> {syncing_*} -> completed | failed`, and back to
/// `queued` for the next run. The `syncing_*` phases may come in any order or not
/// at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    #[default]
    Idle,
    Queued,
    Syncing,
    SyncingAssets,
    SyncingTransactions,
    SyncingNfts,
    SyncingDefi,
    Completed,
    Failed,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Syncing => "syncing",
            Self::SyncingAssets => "syncing_assets",
            Self::SyncingTransactions => "syncing_transactions",
            Self::SyncingNfts => "syncing_nfts",
            Self::SyncingDefi => "syncing_defi",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Queued or any syncing state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }

    pub fn is_sync_phase(&self) -> bool {
        matches!(
            self,
            Self::SyncingAssets | Self::SyncingTransactions | Self::SyncingNfts | Self::SyncingDefi
        )
    }

    /// Whether `next` is an edge of the state graph. Events off the graph are still
    /// applied; this only feeds diagnostics.
    pub fn is_successor(&self, next: SyncJobStatus) -> bool {
        match self {
            Self::Idle => next == Self::Queued,
            Self::Queued => next == Self::Syncing || next.is_sync_phase() || next.is_terminal(),
            Self::Syncing => next.is_sync_phase() || next.is_terminal(),
            Self::SyncingAssets
            | Self::SyncingTransactions
            | Self::SyncingNfts
            | Self::SyncingDefi => {
                (next.is_sync_phase() && next != *self)
                    || next == Self::Syncing
                    || next.is_terminal()
            }
            Self::Completed | Self::Failed => next == Self::Queued,
        }
    }
}

/// One status report from the external sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub job_key: String,
    pub status: SyncJobStatus,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub generation: Option<u64>,
}

impl SyncEvent {
    pub fn new(job_key: impl Into<String>, status: SyncJobStatus) -> Self {
        Self {
            job_key: job_key.into(),
            status,
            progress: None,
            message: None,
            generation: None,
        }
    }

    pub fn with_progress(mut self, progress: i64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }
}

/// Why an event was dropped. Internal only; never surfaced as a user error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// The event belongs to a run older than the tracked one.
    SupersededGeneration { event: u64, current: u64 },
    /// The job finished; only a `queued` for a newer run is accepted.
    Terminal,
    /// A `queued` of the current run arrived after the run moved on.
    LateQueued,
    MissingJobKey,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDisposition {
    Applied(SyncJob),
    Unchanged,
    Stale(StaleReason),
}

/// Current state of one sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub job_key: String,
    pub status: SyncJobStatus,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub generation: u64,
}

pub(crate) fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}

impl SyncJob {
    pub fn idle(job_key: impl Into<String>) -> Self {
        Self {
            job_key: job_key.into(),
            status: SyncJobStatus::Idle,
            progress: None,
            message: None,
            last_event_at: None,
            generation: 0,
        }
    }

    fn start_run(&mut self, generation: u64, event: &SyncEvent) {
        self.generation = generation;
        self.status = SyncJobStatus::Queued;
        self.progress = Some(0);
        self.message = event.message.clone();
    }

    /// Computes the state after `event` without touching `last_event_at`.
    pub(crate) fn next_state(&self, event: &SyncEvent) -> Result<SyncJob, StaleReason> {
        if let Some(generation) = event.generation {
            if generation < self.generation {
                return Err(StaleReason::SupersededGeneration {
                    event: generation,
                    current: self.generation,
                });
            }
        }
        let newer_run = event
            .generation
            .filter(|generation| *generation > self.generation);
        let mut next = self.clone();

        if self.status.is_terminal() {
            if event.status != SyncJobStatus::Queued || event.generation == Some(self.generation)
            {
                return Err(StaleReason::Terminal);
            }
            next.start_run(newer_run.unwrap_or(self.generation + 1), event);
            return Ok(next);
        }

        if event.status == SyncJobStatus::Queued {
            if let Some(generation) = newer_run {
                next.start_run(generation, event);
                return Ok(next);
            }
            return match self.status {
                SyncJobStatus::Idle => {
                    next.start_run(self.generation, event);
                    Ok(next)
                }
                SyncJobStatus::Queued => {
                    if let Some(message) = &event.message {
                        next.message = Some(message.clone());
                    }
                    Ok(next)
                }
                _ => Err(StaleReason::LateQueued),
            };
        }

        if let Some(generation) = newer_run {
            next.generation = generation;
            next.progress = Some(0);
            next.message = None;
        }
        next.status = event.status;
        if let Some(progress) = event.progress.map(clamp_progress) {
            if progress >= next.progress.unwrap_or(0) {
                next.progress = Some(progress);
            }
        }
        if let Some(message) = &event.message {
            next.message = Some(message.clone());
        }
        Ok(next)
    }
}
