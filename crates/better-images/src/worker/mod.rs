pub mod dispatch;
pub mod job;
pub mod pool;

pub use dispatch::JobDispatcher;
pub use job::{Job, JobStatus, OutputFormat, PipelineOptions, ResultKind, UpscaleFactor};
pub use pool::WorkerPool;
