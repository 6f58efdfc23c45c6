//! Entry point used by transports: wires the store, storage, worker pool and
//! provider together and exposes the job operations.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use image::GenericImageView;
use log::info;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::batch::BatchCoordinator;
use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStore};
use crate::config::Config;
use crate::error::{BetterImagesError, JobError, ProviderError};
use crate::intake::{Intake, UploadedImage};
use crate::pipeline::PipelineRunner;
use crate::processor::{upscale, LocalProvider, TransformProvider};
use crate::resolve;
use crate::storage::{self, FileStorage, SweepReport};
use crate::worker::job::{FailureKind, Job, JobStatus, PipelineOptions, ResultKind, Step};
use crate::worker::{JobDispatcher, WorkerPool};

/// What a status poll returns.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub status: JobStatus,
    pub progress: String,
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub failed_step: Option<Step>,
    pub width: u32,
    pub height: u32,
    pub results: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_height: Option<u32>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            batch_id: job.batch_id.clone(),
            status: job.status,
            progress: job.progress.clone(),
            error: job.error.as_ref().map(|e| e.message.clone()),
            error_kind: job.error.as_ref().map(|e| e.kind),
            failed_step: job.error.as_ref().and_then(|e| e.step),
            width: job.width,
            height: job.height,
            results: job.available_results(),
            final_width: job.final_dimensions.map(|(w, _)| w),
            final_height: job.final_dimensions.map(|(_, h)| h),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Download {
    pub path: PathBuf,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct Preview {
    pub path: PathBuf,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PoolHealth {
    pub workers: usize,
    pub active: usize,
    pub queued: usize,
}

pub struct ImageService {
    config: Arc<Config>,
    store: Arc<JobStore>,
    storage: Arc<FileStorage>,
    pool: Arc<WorkerPool>,
    intake: Arc<Intake>,
    dispatcher: Arc<JobDispatcher>,
    batches: BatchCoordinator,
    broadcaster: JobProgressBroadcaster,
}

impl ImageService {
    /// Builds the service around `provider`, creating the storage
    /// directories and starting the worker pool.
    pub fn new(
        config: Config,
        provider: Arc<dyn TransformProvider>,
    ) -> Result<Self, BetterImagesError> {
        let config = Arc::new(config);
        let store = Arc::new(JobStore::new());
        let storage = Arc::new(FileStorage::from_config(&config));
        storage.ensure_directories()?;

        let pool = Arc::new(WorkerPool::new(config.worker_count)?);
        let broadcaster = JobProgressBroadcaster::default();
        let runner = Arc::new(PipelineRunner::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            provider,
            config.icon_sizes.clone(),
        ));
        let dispatcher = Arc::new(JobDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            Arc::clone(&pool),
            runner,
            broadcaster.clone(),
            config.retention.purge_on_rerun,
        ));
        let intake = Arc::new(Intake::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            config.max_upload_bytes,
        ));
        let batches = BatchCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&intake),
            Arc::clone(&dispatcher),
        );

        Ok(Self {
            config,
            store,
            storage,
            pool,
            intake,
            dispatcher,
            batches,
            broadcaster,
        })
    }

    /// Production constructor using [`LocalProvider`].
    pub fn with_local_provider(config: Config) -> Result<Self, BetterImagesError> {
        let provider = Arc::new(LocalProvider::from_config(&config));
        Self::new(config, provider)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn batches(&self) -> &BatchCoordinator {
        &self.batches
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    pub fn upload(&self, filename: &str, content: &[u8]) -> Result<UploadedImage, JobError> {
        self.intake.accept(filename, content, None)
    }

    /// Starts a run. Returns as soon as the job is queued; `Conflict` if the
    /// job is already processing.
    pub fn process(&self, id: &str, options: &PipelineOptions) -> Result<(), JobError> {
        let superseded = self.store.begin_processing(id, options)?;
        info!("Processing {} with {:?}", id, options);
        self.dispatcher.dispatch(id, superseded)
    }

    pub fn status(&self, id: &str) -> Result<JobStatusView, JobError> {
        let job = self.store.get(id)?;
        Ok(JobStatusView::from(&job))
    }

    /// Name the artifact of `kind` should be saved under.
    pub fn download_name(&self, id: &str, kind: ResultKind) -> Result<String, JobError> {
        let job = self.store.get(id)?;
        Ok(resolve::download_name(&job, kind))
    }

    /// Artifact of a finished job.
    pub fn download(&self, id: &str, kind: ResultKind) -> Result<Download, JobError> {
        let job = self.store.get(id)?;
        if job.status != JobStatus::Done {
            return Err(JobError::Validation("Processing not complete".to_string()));
        }
        Ok(Download {
            path: resolve::resolve(&job, kind)?,
            filename: resolve::download_name(&job, kind),
        })
    }

    /// Any artifact available right now, in any job state.
    pub fn preview(&self, id: &str, kind: ResultKind) -> Result<Preview, JobError> {
        let job = self.store.get(id)?;
        let path = resolve::resolve(&job, kind)?;
        let content_type = resolve::content_type(&path);
        Ok(Preview { path, content_type })
    }

    /// Shrinks the job's source to fit within `max_dimension` and puts the job
    /// back to `uploaded`, discarding the results of earlier runs.
    pub fn resize(&self, id: &str, max_dimension: u32) -> Result<UploadedImage, JobError> {
        if max_dimension == 0 {
            return Err(JobError::Validation(
                "max_dimension must be positive".to_string(),
            ));
        }

        let job = self.store.get(id)?;
        if job.status == JobStatus::Processing {
            return Err(JobError::Conflict("Already processing".to_string()));
        }

        let img = image::open(&job.source).map_err(|e| ProviderError::ReadImage {
            path: job.source.clone(),
            source: e,
        })?;
        let (w, h) = img.dimensions();

        let (source, width, height) = if w <= max_dimension && h <= max_dimension {
            (job.source.clone(), w, h)
        } else {
            let (new_w, new_h) = upscale::fit_within(w, h, max_dimension);
            let ext = job
                .source
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("png");
            let path = self.storage.resized_source_path(id, max_dimension, ext);
            let resized = img.resize_exact(new_w, new_h, FilterType::Lanczos3);
            upscale::save(&resized, &path)?;
            (path, new_w, new_h)
        };

        let superseded = self.store.update(id, |job| {
            if job.status == JobStatus::Processing {
                return Err(JobError::Conflict("Already processing".to_string()));
            }
            job.source = source.clone();
            job.width = width;
            job.height = height;
            job.status = JobStatus::Uploaded;
            job.progress = String::new();
            job.error = None;
            job.pipeline = None;
            job.final_dimensions = None;
            Ok(std::mem::take(&mut job.results))
        })??;
        self.dispatcher.purge(&superseded, &source);

        info!("Resized {} to {}x{}", id, width, height);
        Ok(UploadedImage {
            id: id.to_string(),
            filename: job.original_name,
            width,
            height,
        })
    }

    pub fn health(&self) -> PoolHealth {
        PoolHealth {
            workers: self.pool.size(),
            active: self.pool.active(),
            queued: self.pool.queued(),
        }
    }

    /// Deletes outputs older than the configured retention age. `None` when
    /// no age limit is configured.
    pub fn sweep_outputs(&self) -> Option<SweepReport> {
        let hours = self.config.retention.max_age_hours?;
        let max_age = Duration::from_secs(hours.saturating_mul(3600));
        Some(storage::sweep(self.storage.output_directory(), max_age))
    }

    /// Stops accepting work and waits for running jobs to finish.
    pub fn shutdown(&self) {
        self.pool.join();
    }
}
