pub mod batch;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod processor;
pub mod resolve;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod worker;

pub use batch::{BatchCoordinator, BatchStatus, BatchTrigger, BatchUpload};
pub use broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStore};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{
    BetterImagesError, ConfigError, JobError, ProviderError, Result, StorageError, WorkerError,
};
pub use intake::UploadedImage;
pub use pipeline::{PipelineRunner, ProgressEvent, ProgressReporter};
pub use processor::{LocalProvider, ProgressFn, TransformProvider};
pub use service::{Download, ImageService, JobStatusView, PoolHealth, Preview};
pub use worker::{
    Job, JobStatus, OutputFormat, PipelineOptions, ResultKind, UpscaleFactor, WorkerPool,
};
