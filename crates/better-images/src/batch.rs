//! Batches: many uploads processed with one pipeline configuration.
//!
//! A batch has no record of its own. It is the set of jobs carrying its id,
//! and its status is folded from theirs on every query.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::broadcast::JobStore;
use crate::error::JobError;
use crate::intake::{Intake, UploadedImage};
use crate::resolve;
use crate::worker::job::{Job, JobStatus, PipelineOptions, ResultKind};
use crate::worker::JobDispatcher;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedUpload {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchUpload {
    pub batch_id: String,
    pub jobs: Vec<UploadedImage>,
    pub skipped: Vec<SkippedUpload>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchTrigger {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchMember {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub progress: String,
    pub error: Option<String>,
    pub has_results: bool,
}

impl From<&Job> for BatchMember {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            filename: job.original_name.clone(),
            status: job.status,
            progress: job.progress.clone(),
            error: job.error.as_ref().map(|e| e.message.clone()),
            has_results: job.has_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub batch_id: String,
    pub total: usize,
    pub all_done: bool,
    pub any_error: bool,
    pub any_processing: bool,
    pub jobs: Vec<BatchMember>,
}

impl BatchStatus {
    pub fn fold(batch_id: &str, members: &[Job]) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            total: members.len(),
            all_done: !members.is_empty() && members.iter().all(|j| j.status == JobStatus::Done),
            any_error: members.iter().any(|j| j.status == JobStatus::Error),
            any_processing: members.iter().any(|j| j.status == JobStatus::Processing),
            jobs: members.iter().map(BatchMember::from).collect(),
        }
    }
}

pub struct BatchCoordinator {
    store: Arc<JobStore>,
    intake: Arc<Intake>,
    dispatcher: Arc<JobDispatcher>,
}

impl BatchCoordinator {
    pub fn new(store: Arc<JobStore>, intake: Arc<Intake>, dispatcher: Arc<JobDispatcher>) -> Self {
        Self {
            store,
            intake,
            dispatcher,
        }
    }

    /// Registers one job per acceptable file under a fresh batch id.
    /// Rejected files are reported in `skipped`; at least one must be accepted.
    pub fn create_batch(&self, files: Vec<(String, Vec<u8>)>) -> Result<BatchUpload, JobError> {
        if files.is_empty() {
            return Err(JobError::Validation("No files provided".to_string()));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut jobs = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();

        for (filename, content) in files {
            match self.intake.accept(&filename, &content, Some(&batch_id)) {
                Ok(uploaded) => jobs.push(uploaded),
                Err(e) => {
                    warn!("Skipping {} in batch {}: {}", filename, batch_id, e);
                    skipped.push(SkippedUpload {
                        filename,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if jobs.is_empty() {
            return Err(JobError::Validation("No valid images in upload".to_string()));
        }

        info!(
            "Created batch {} with {} jobs ({} skipped)",
            batch_id,
            jobs.len(),
            skipped.len()
        );
        Ok(BatchUpload {
            batch_id,
            jobs,
            skipped,
        })
    }

    /// Starts every listed job that is still `uploaded`. Unknown ids and jobs
    /// in any other state are skipped.
    pub fn trigger_batch(
        &self,
        job_ids: &[String],
        options: &PipelineOptions,
    ) -> Result<BatchTrigger, JobError> {
        if job_ids.is_empty() {
            return Err(JobError::Validation("No job IDs provided".to_string()));
        }

        let mut outcome = BatchTrigger::default();
        for id in job_ids {
            let superseded = match self.store.begin_if_uploaded(id, options) {
                Ok(Some(superseded)) => superseded,
                Ok(None) => {
                    outcome.skipped.push(id.clone());
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {} in batch trigger: {}", id, e);
                    outcome.skipped.push(id.clone());
                    continue;
                }
            };

            match self.dispatcher.dispatch(id, superseded) {
                Ok(()) => outcome.started.push(id.clone()),
                Err(e) => {
                    warn!("Could not start {}: {}", id, e);
                    outcome.skipped.push(id.clone());
                }
            }
        }
        Ok(outcome)
    }

    pub fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, JobError> {
        let members = self.members(batch_id)?;
        Ok(BatchStatus::fold(batch_id, &members))
    }

    /// Writes a ZIP of every member's final artifact and returns its path.
    /// Every member must be `done`.
    pub fn bundle(&self, batch_id: &str) -> Result<PathBuf, JobError> {
        let members = self.members(batch_id)?;
        if members.iter().any(|j| j.status != JobStatus::Done) {
            return Err(JobError::Validation(
                "Batch processing not complete".to_string(),
            ));
        }

        let mut used = HashSet::new();
        let mut entries = Vec::with_capacity(members.len());
        for job in &members {
            let path = resolve::resolve(job, ResultKind::Final)?;
            let name = unique_name(&resolve::download_name(job, ResultKind::Final), &mut used);
            entries.push((name, path));
        }

        let archive = self
            .dispatcher
            .storage()
            .write_archive(batch_id, &entries)?;
        info!("Bundled {} files for batch {}", entries.len(), batch_id);
        Ok(archive)
    }

    fn members(&self, batch_id: &str) -> Result<Vec<Job>, JobError> {
        let members = self.store.list_batch(batch_id);
        if members.is_empty() {
            return Err(JobError::batch_not_found(batch_id));
        }
        Ok(members)
    }
}

/// Returns `name`, or `<stem>_2.<ext>`, `<stem>_3.<ext>`, ... when taken.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut counter = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
