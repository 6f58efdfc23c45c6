use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BetterImagesError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Transform error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Client-facing error taxonomy for job and batch operations.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl JobError {
    pub fn job_not_found(id: &str) -> Self {
        JobError::NotFound {
            what: "Job",
            id: id.to_string(),
        }
    }

    pub fn batch_not_found(id: &str) -> Self {
        JobError::NotFound {
            what: "Batch",
            id: id.to_string(),
        }
    }

    pub fn file_not_found(kind: &str) -> Self {
        JobError::NotFound {
            what: "File",
            id: kind.to_string(),
        }
    }
}

/// Failures raised inside a transformation step. Treated opaquely by the
/// pipeline: the message is captured verbatim on the failed job.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Scale must be 2 or 4, got {0}")]
    UnsupportedScale(u32),

    #[error("Icon size must be between 1 and 256, got {0}")]
    InvalidIconSize(u32),

    #[error("Upscaling {width}x{height} by {scale} exceeds the maximum image size")]
    TooLarge { width: u32, height: u32, scale: u32 },

    #[error("Cannot read image '{path}': {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Cannot write image '{path}': {source}")]
    WriteImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start '{program}': {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed: {message}")]
    CommandFailed { program: String, message: String },

    #[error("'{program}' did not produce '{path}'")]
    MissingOutput { program: String, path: PathBuf },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive '{path}': {message}")]
    Archive { path: PathBuf, message: String },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker pool is shut down")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, BetterImagesError>;
