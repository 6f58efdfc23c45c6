//! In-memory job registry.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::error::JobError;
use crate::worker::job::{Job, JobStatus, PipelineOptions, ResultKind};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn read_map<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job store map lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_map<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job store map lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn lock_job(slot: &Slot) -> MutexGuard<'_, Job> {
    match slot.job.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

struct Slot {
    /// Insertion order, used for stable batch listings.
    seq: u64,
    job: Mutex<Job>,
}

/// Counts of jobs by status.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct JobCounts {
    pub uploaded: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}

/// Process-wide registry of jobs.
///
/// The map lock is only held to insert or look up a slot; each job has its
/// own mutex, so work on one job never waits on another. Entries are never
/// evicted.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<Slot>>>,
    next_seq: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    fn slot(&self, id: &str) -> Result<Arc<Slot>, JobError> {
        read_map(&self.jobs)
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::job_not_found(id))
    }

    /// Registers a new job and returns its id.
    pub fn create(&self, job: Job) -> Result<String, JobError> {
        let id = job.id.clone();
        let mut jobs = write_map(&self.jobs);
        if jobs.contains_key(&id) {
            return Err(JobError::Conflict(format!("Job id already exists: {}", id)));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        jobs.insert(
            id.clone(),
            Arc::new(Slot {
                seq,
                job: Mutex::new(job),
            }),
        );
        Ok(id)
    }

    /// Returns a consistent snapshot of a job.
    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        let slot = self.slot(id)?;
        let job = lock_job(&slot);
        Ok(job.clone())
    }

    /// Applies `mutation` to a job while holding its lock.
    pub fn update<F, R>(&self, id: &str, mutation: F) -> Result<R, JobError>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let slot = self.slot(id)?;
        let mut job = lock_job(&slot);
        let out = mutation(&mut job);
        job.touch();
        Ok(out)
    }

    /// Latest-wins progress write.
    pub fn set_progress(&self, id: &str, message: &str) -> Result<(), JobError> {
        self.update(id, |job| job.progress = message.to_string())
    }

    /// Moves a job into `processing` for a fresh run.
    ///
    /// Rejected with `Conflict` when the job is already processing. Clears the
    /// previous run's results and error, and returns the superseded results.
    pub fn begin_processing(
        &self,
        id: &str,
        options: &PipelineOptions,
    ) -> Result<BTreeMap<ResultKind, PathBuf>, JobError> {
        self.update(id, |job| {
            if job.status == JobStatus::Processing {
                return Err(JobError::Conflict("Already processing".to_string()));
            }
            Ok(start_run(job, options))
        })?
    }

    /// Like [`begin_processing`](Self::begin_processing), but only starts jobs
    /// that are still `uploaded`. Returns `None` for any other status.
    pub fn begin_if_uploaded(
        &self,
        id: &str,
        options: &PipelineOptions,
    ) -> Result<Option<BTreeMap<ResultKind, PathBuf>>, JobError> {
        self.update(id, |job| {
            (job.status == JobStatus::Uploaded).then(|| start_run(job, options))
        })
    }

    /// Members of a batch in creation order.
    pub fn list_batch(&self, batch_id: &str) -> Vec<Job> {
        let slots: Vec<Arc<Slot>> = read_map(&self.jobs).values().cloned().collect();
        let mut members: Vec<(u64, Job)> = slots
            .iter()
            .filter_map(|slot| {
                let job = lock_job(slot);
                (job.batch_id.as_deref() == Some(batch_id)).then(|| (slot.seq, job.clone()))
            })
            .collect();
        members.sort_by_key(|(seq, _)| *seq);
        members.into_iter().map(|(_, job)| job).collect()
    }

    /// Returns the count of jobs by status.
    pub fn counts(&self) -> JobCounts {
        let slots: Vec<Arc<Slot>> = read_map(&self.jobs).values().cloned().collect();
        let mut counts = JobCounts::default();
        for slot in &slots {
            match lock_job(slot).status {
                JobStatus::Uploaded => counts.uploaded += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        read_map(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn start_run(job: &mut Job, options: &PipelineOptions) -> BTreeMap<ResultKind, PathBuf> {
    job.status = JobStatus::Processing;
    job.progress = "Starting...".to_string();
    job.error = None;
    job.pipeline = Some(options.clone());
    job.final_dimensions = None;
    std::mem::take(&mut job.results)
}
