use std::path::PathBuf;

use crate::worker::job::{Job, PipelineOptions, Step};

/// State carried from one step of a run to the next.
pub struct PipelineContext {
    pub job_id: String,
    pub batch_id: Option<String>,
    pub options: PipelineOptions,
    pub source: PathBuf,

    // Input of the next step
    pub current: PathBuf,

    // Step running right now, reported on failure
    pub step: Option<Step>,
}

impl PipelineContext {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            batch_id: job.batch_id.clone(),
            options: job.pipeline.clone().unwrap_or_default(),
            source: job.source.clone(),
            current: job.source.clone(),
            step: None,
        }
    }
}
