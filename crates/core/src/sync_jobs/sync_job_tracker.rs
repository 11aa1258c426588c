use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use log::{debug, warn};

use super::sync_job_model::{EventDisposition, StaleReason, SyncEvent, SyncJob, SyncJobStatus};
use crate::events::{ChangeFeed, StateEvent};

/// Process-wide map from job key to its sync state.
///
/// Created once at startup and shared. Jobs appear on their first event and stay
/// until the session ends; `reset` returns one to idle. Only `apply_event` and
/// `reset` mutate; readers get clones.
#[derive(Debug)]
pub struct SyncJobTracker {
    jobs: RwLock<HashMap<String, SyncJob>>,
    feed: ChangeFeed,
}

impl SyncJobTracker {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Applies one inbound event under the generation and monotonic-progress rules.
    pub fn apply_event(&self, event: &SyncEvent) -> EventDisposition {
        if event.job_key.trim().is_empty() {
            warn!("Dropping sync event without a job key: {:?}", event.status);
            return EventDisposition::Stale(StaleReason::MissingJobKey);
        }

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let current = jobs
            .get(&event.job_key)
            .cloned()
            .unwrap_or_else(|| SyncJob::idle(event.job_key.clone()));

        let mut next = match current.next_state(event) {
            Ok(next) => next,
            Err(reason) => {
                debug!(
                    "Discarding {} event for '{}' (generation {:?}): {:?}",
                    event.status.as_str(),
                    event.job_key,
                    event.generation,
                    reason
                );
                return EventDisposition::Stale(reason);
            }
        };

        if next == current {
            // Keep lazily created jobs visible even when the first event is a no-op.
            jobs.entry(event.job_key.clone()).or_insert(current);
            return EventDisposition::Unchanged;
        }

        if current.status != next.status && !current.status.is_successor(next.status) {
            debug!(
                "Sync job '{}' jumped {} -> {}",
                event.job_key,
                current.status.as_str(),
                next.status.as_str()
            );
        }

        next.last_event_at = Some(Utc::now());
        jobs.insert(event.job_key.clone(), next.clone());
        drop(jobs);

        self.feed
            .publish(StateEvent::SyncJobChanged { job: next.clone() });
        EventDisposition::Applied(next)
    }

    /// Snapshot of a job; unknown keys read as idle without being created.
    pub fn snapshot(&self, job_key: &str) -> SyncJob {
        self.get(job_key)
            .unwrap_or_else(|| SyncJob::idle(job_key.to_string()))
    }

    pub fn get(&self, job_key: &str) -> Option<SyncJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_key)
            .cloned()
    }

    pub fn snapshots(&self) -> Vec<SyncJob> {
        let mut jobs = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect::<Vec<_>>();
        jobs.sort_by(|a, b| a.job_key.cmp(&b.job_key));
        jobs
    }

    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|job| job.status.is_active())
            .count()
    }

    /// Returns a job to idle when its owner leaves view. The generation is kept so
    /// events from earlier runs stay filtered.
    pub fn reset(&self, job_key: &str) -> Option<SyncJob> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(job_key)?;
        job.status = SyncJobStatus::Idle;
        job.progress = None;
        job.message = None;
        let snapshot = job.clone();
        drop(jobs);

        debug!("Reset sync job '{}' to idle", job_key);
        self.feed.publish(StateEvent::SyncJobChanged {
            job: snapshot.clone(),
        });
        Some(snapshot)
    }
}
