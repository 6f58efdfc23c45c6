use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::broadcast::{JobProgressBroadcaster, JobStore};
use crate::error::JobError;
use crate::pipeline::{PipelineRunner, StoreProgress};
use crate::storage::FileStorage;
use crate::worker::job::{FailureKind, ResultKind};
use crate::worker::pool::WorkerPool;

/// Hands jobs that were just moved to `processing` over to the worker pool.
pub struct JobDispatcher {
    store: Arc<JobStore>,
    storage: Arc<FileStorage>,
    pool: Arc<WorkerPool>,
    runner: Arc<PipelineRunner>,
    broadcaster: JobProgressBroadcaster,
    purge_on_rerun: bool,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<JobStore>,
        storage: Arc<FileStorage>,
        pool: Arc<WorkerPool>,
        runner: Arc<PipelineRunner>,
        broadcaster: JobProgressBroadcaster,
        purge_on_rerun: bool,
    ) -> Self {
        Self {
            store,
            storage,
            pool,
            runner,
            broadcaster,
            purge_on_rerun,
        }
    }

    /// Queues a run of `job_id`. `superseded` holds the previous run's results,
    /// which are deleted first when purging is enabled.
    ///
    /// If the pool refuses the task the job is put into `error`.
    pub fn dispatch(
        &self,
        job_id: &str,
        superseded: BTreeMap<ResultKind, PathBuf>,
    ) -> Result<(), JobError> {
        let job = self.store.get(job_id)?;

        let removed = self.purge(&superseded, &job.source);
        if removed > 0 {
            debug!("Purged {} artifacts of {}", removed, job_id);
        }

        let reporter = StoreProgress::new(
            job_id,
            job.batch_id.as_deref(),
            Arc::clone(&self.store),
            Some(self.broadcaster.clone()),
        );
        let runner = Arc::clone(&self.runner);
        let id = job_id.to_string();

        if let Err(e) = self.pool.submit(move || runner.run(&id, &reporter)) {
            warn!("Could not queue job {}: {}", job_id, e);
            self.runner
                .commit_failure(job_id, FailureKind::Worker, &e.to_string(), None)?;
            return Err(JobError::Worker(e));
        }
        Ok(())
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Deletes the given artifacts unless purging is disabled.
    pub fn purge(&self, artifacts: &BTreeMap<ResultKind, PathBuf>, keep: &Path) -> usize {
        if !self.purge_on_rerun {
            return 0;
        }
        self.storage
            .remove_artifacts(artifacts.values().map(PathBuf::as_path), keep)
    }
}
