//! Live progress events for running jobs.
//!
//! The job store stays the source of truth; these events only let listeners
//! follow along without polling. Slow listeners lose the oldest events
//! instead of holding up workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::{JobStatus, Step};

/// Events buffered per listener before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Status the job is in once this event has been applied.
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    pub message: String,
    pub emitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// A message from a step of a running job.
    pub fn step_message(
        job_id: &str,
        batch_id: Option<&str>,
        step: Option<Step>,
        message: &str,
    ) -> Self {
        JobProgressEvent {
            job_id: job_id.to_owned(),
            batch_id: batch_id.map(str::to_owned),
            status: JobStatus::Processing,
            step,
            message: message.to_owned(),
            emitted_at: Utc::now(),
            error: None,
        }
    }

    pub fn completed(job_id: &str, batch_id: Option<&str>, message: &str) -> Self {
        let mut event = Self::step_message(job_id, batch_id, None, message);
        event.status = JobStatus::Done;
        event
    }

    /// Terminal failure. `message` mirrors the job's progress text.
    pub fn failed(job_id: &str, batch_id: Option<&str>, step: Option<Step>, error: &str) -> Self {
        let mut event = Self::step_message(job_id, batch_id, step, &format!("Error: {}", error));
        event.status = JobStatus::Error;
        event.error = Some(error.to_owned());
        event
    }
}

/// Fan-out of [`JobProgressEvent`]s to any number of listeners.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    tx: broadcast::Sender<JobProgressEvent>,
}

impl JobProgressBroadcaster {
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        JobProgressBroadcaster { tx }
    }

    /// Delivers `event` to current listeners and returns how many got it.
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: JobProgressEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
