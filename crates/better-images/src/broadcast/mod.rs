//! Job state shared between request handlers and workers, plus the
//! progress event stream published while jobs run.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent};
pub use job_store::{JobCounts, JobStore};
