//! External sync job tracking (wallet and bank sync status).

mod sync_job_model;
mod sync_job_tracker;

pub use sync_job_model::{EventDisposition, StaleReason, SyncEvent, SyncJob, SyncJobStatus};
pub use sync_job_tracker::SyncJobTracker;
