use std::sync::Arc;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStore};
use crate::worker::job::Step;

/// Events emitted by the pipeline during a run.
///
/// Terminal events are reported after the runner has committed the job's
/// final state, so reporters only need to publish them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Message { step: Step, message: String },
    Completed { message: String },
    Failed { step: Option<Step>, error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes progress messages to the job record (latest wins) and republishes
/// every event on the progress broadcaster.
pub struct StoreProgress {
    job_id: String,
    batch_id: Option<String>,
    store: Arc<JobStore>,
    broadcaster: Option<JobProgressBroadcaster>,
}

impl StoreProgress {
    pub fn new(
        job_id: &str,
        batch_id: Option<&str>,
        store: Arc<JobStore>,
        broadcaster: Option<JobProgressBroadcaster>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            batch_id: batch_id.map(|s| s.to_string()),
            store,
            broadcaster,
        }
    }

    fn publish(&self, event: JobProgressEvent) {
        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.publish(event);
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) {
        let batch_id = self.batch_id.as_deref();
        match event {
            ProgressEvent::Message { step, message } => {
                if let Err(e) = self.store.set_progress(&self.job_id, &message) {
                    log::warn!("Dropping progress for {}: {}", self.job_id, e);
                    return;
                }
                self.publish(JobProgressEvent::step_message(
                    &self.job_id,
                    batch_id,
                    Some(step),
                    &message,
                ));
            }
            ProgressEvent::Completed { message } => {
                self.publish(JobProgressEvent::completed(&self.job_id, batch_id, &message));
            }
            ProgressEvent::Failed { step, error } => {
                self.publish(JobProgressEvent::failed(&self.job_id, batch_id, step, &error));
            }
        }
    }
}
