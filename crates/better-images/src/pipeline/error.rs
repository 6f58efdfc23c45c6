use thiserror::Error;

use crate::error::{JobError, ProviderError, StorageError};
use crate::worker::job::FailureKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Transformation panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Job(#[from] JobError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Provider(_) | PipelineError::Panicked(_) => FailureKind::Provider,
            PipelineError::Storage(_) => FailureKind::Storage,
            PipelineError::Job(_) => FailureKind::Worker,
        }
    }
}
