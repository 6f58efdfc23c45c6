use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, info_span, warn};

use crate::broadcast::JobStore;
use crate::error::{JobError, ProviderError};
use crate::processor::{ProgressFn, TransformProvider};
use crate::sanitize;
use crate::storage::FileStorage;
use crate::worker::job::{
    is_raster, FailureKind, JobFailure, JobStatus, OutputFormat, ResultKind, Step,
};
use crate::worker::pool::panic_message;

use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};

pub const COMPLETED_MESSAGE: &str = "Completed!";

/// Executes the requested transformation steps for one job, committing
/// each step's result to the store as soon as it exists.
pub struct PipelineRunner {
    store: Arc<JobStore>,
    storage: Arc<FileStorage>,
    provider: Arc<dyn TransformProvider>,
    icon_sizes: Vec<u32>,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<JobStore>,
        storage: Arc<FileStorage>,
        provider: Arc<dyn TransformProvider>,
        icon_sizes: Vec<u32>,
    ) -> Self {
        Self {
            store,
            storage,
            provider,
            icon_sizes,
        }
    }

    /// Runs a job that has already been moved to `processing`.
    ///
    /// Never returns an error: every failure, provider panics included, ends
    /// up on the job record.
    pub fn run(&self, job_id: &str, progress: &dyn ProgressReporter) {
        let job = match self.store.get(job_id) {
            Ok(job) => job,
            Err(e) => {
                warn!("Cannot run job {}: {}", job_id, e);
                return;
            }
        };

        let mut ctx = PipelineContext::new(&job);
        let filename = sanitize::redact_path(&job.source);
        let _pipeline_span = info_span!("pipeline",
            job_id = %job_id,
            filename = %filename,
            batch_id = ctx.batch_id.as_deref().unwrap_or("none"),
        )
        .entered();

        match self.run_steps(&mut ctx, progress) {
            Ok(()) => self.complete(&ctx, progress),
            Err(e) => self.fail(&ctx, e, progress),
        }
    }

    fn run_steps(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        // Step 1: Working copy of the source
        {
            let _step = info_span!("prepare").entered();
            ctx.step = Some(Step::Prepare);
            ctx.current = self.storage.working_copy(&ctx.job_id, &ctx.source)?;
        }

        // Step 2: Upscale
        if let Some(factor) = ctx.options.upscale {
            let _step = info_span!("upscale", factor = factor.value()).entered();
            let message = format!("Preparing {}x upscale...", factor.value());
            begin_step(ctx, Step::Upscale, message, progress);
            let output = self.transform(ctx, progress, |input, report| {
                self.provider.upscale(input, factor, report)
            })?;
            self.record(ctx, ResultKind::Upscaled, output)?;
        }

        // Step 3: Remove background
        if ctx.options.remove_bg {
            let _step = info_span!("remove_background").entered();
            let message = "Preparing background removal...".to_string();
            begin_step(ctx, Step::RemoveBackground, message, progress);
            let output = self.transform(ctx, progress, |input, report| {
                self.provider.remove_background(input, report)
            })?;
            self.record(ctx, ResultKind::NoBackground, output)?;
        }

        // Step 4: Convert
        match ctx.options.format {
            OutputFormat::Png => {}
            OutputFormat::Svg => {
                let _step = info_span!("convert", format = "svg").entered();
                let message = "Preparing SVG conversion...".to_string();
                begin_step(ctx, Step::Convert, message, progress);
                let output = self.transform(ctx, progress, |input, report| {
                    self.provider.to_vector(input, report)
                })?;
                self.record(ctx, ResultKind::Svg, output)?;
            }
            OutputFormat::Ico => {
                let _step = info_span!("convert", format = "ico").entered();
                let message = "Preparing ICO conversion...".to_string();
                begin_step(ctx, Step::Convert, message, progress);
                let output = self.transform(ctx, progress, |input, report| {
                    self.provider.to_icon_set(input, &self.icon_sizes, report)
                })?;
                self.record(ctx, ResultKind::Ico, output)?;
            }
        }

        Ok(())
    }

    /// Calls into the provider with a progress callback bound to the current
    /// step. A panic inside the provider becomes an ordinary step failure.
    fn transform<F>(
        &self,
        ctx: &PipelineContext,
        progress: &dyn ProgressReporter,
        op: F,
    ) -> Result<PathBuf, PipelineError>
    where
        F: FnOnce(&Path, ProgressFn<'_>) -> Result<PathBuf, ProviderError>,
    {
        let step = ctx.step.unwrap_or(Step::Prepare);
        let report = |message: &str| {
            progress.report(ProgressEvent::Message {
                step,
                message: message.to_string(),
            })
        };

        let input = ctx.current.as_path();
        match panic::catch_unwind(AssertUnwindSafe(|| op(input, &report))) {
            Ok(result) => Ok(result?),
            Err(payload) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn record(
        &self,
        ctx: &mut PipelineContext,
        kind: ResultKind,
        path: PathBuf,
    ) -> Result<(), PipelineError> {
        self.store.update(&ctx.job_id, |job| {
            job.results.insert(kind, path.clone());
        })?;
        ctx.current = path;
        Ok(())
    }

    fn complete(&self, ctx: &PipelineContext, progress: &dyn ProgressReporter) {
        let _step = info_span!("finalize").entered();
        let final_path = ctx.current.clone();

        let dimensions = if is_raster(&final_path) {
            match image::image_dimensions(&final_path) {
                Ok(dims) => Some(dims),
                Err(e) => {
                    warn!("Cannot read dimensions of {}: {}", sanitize::redact_path(&final_path), e);
                    None
                }
            }
        } else {
            None
        };

        let committed = self.store.update(&ctx.job_id, |job| {
            job.results.insert(ResultKind::Final, final_path.clone());
            job.final_dimensions = dimensions;
            job.status = JobStatus::Done;
            job.progress = COMPLETED_MESSAGE.to_string();
        });
        if let Err(e) = committed {
            warn!("Job {} vanished before completion: {}", ctx.job_id, e);
            return;
        }

        info!(
            "Job {} complete: {}",
            ctx.job_id,
            sanitize::redact_path(&final_path)
        );
        progress.report(ProgressEvent::Completed {
            message: COMPLETED_MESSAGE.to_string(),
        });
    }

    fn fail(&self, ctx: &PipelineContext, e: PipelineError, progress: &dyn ProgressReporter) {
        let message = e.to_string();
        match ctx.step {
            Some(step) => error!("Job {} failed at {}: {}", ctx.job_id, step, message),
            None => error!("Job {} failed: {}", ctx.job_id, message),
        }

        if let Err(e) = self.commit_failure(&ctx.job_id, e.kind(), &message, ctx.step) {
            warn!("Job {} vanished before failure was recorded: {}", ctx.job_id, e);
            return;
        }
        progress.report(ProgressEvent::Failed {
            step: ctx.step,
            error: message,
        });
    }

    /// Puts a job into `error`. Results already produced are kept.
    pub fn commit_failure(
        &self,
        job_id: &str,
        kind: FailureKind,
        message: &str,
        step: Option<Step>,
    ) -> Result<(), JobError> {
        self.store.update(job_id, |job| {
            job.status = JobStatus::Error;
            job.error = Some(JobFailure {
                kind,
                message: message.to_string(),
                step,
            });
            job.progress = format!("Error: {}", message);
        })
    }
}

fn begin_step(
    ctx: &mut PipelineContext,
    step: Step,
    message: String,
    progress: &dyn ProgressReporter,
) {
    ctx.step = Some(step);
    progress.report(ProgressEvent::Message { step, message });
}
