use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::broadcast::JobStore;
use crate::error::JobError;
use crate::sanitize;
use crate::storage::FileStorage;
use crate::worker::job::{allowed_extension, Job};

pub const INVALID_TYPE_MESSAGE: &str = "Invalid file type. Allowed: PNG, JPG, WEBP, BMP, TIFF";

/// Reply to a successful upload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadedImage {
    pub id: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

/// Accepts uploaded bytes and registers a job for them.
pub struct Intake {
    store: Arc<JobStore>,
    storage: Arc<FileStorage>,
    max_upload_bytes: usize,
}

impl Intake {
    pub fn new(store: Arc<JobStore>, storage: Arc<FileStorage>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            storage,
            max_upload_bytes,
        }
    }

    /// Validates and stores an upload, reads its dimensions, then creates an `uploaded` job.
    pub fn accept(
        &self,
        filename: &str,
        content: &[u8],
        batch_id: Option<&str>,
    ) -> Result<UploadedImage, JobError> {
        let filename = sanitize::client_file_name(filename);
        let ext = allowed_extension(&filename)
            .ok_or_else(|| JobError::Validation(INVALID_TYPE_MESSAGE.to_string()))?;
        if content.is_empty() {
            return Err(JobError::Validation("Empty file".to_string()));
        }
        if content.len() > self.max_upload_bytes {
            return Err(JobError::Validation(format!(
                "File too large: {} bytes (limit {})",
                content.len(),
                self.max_upload_bytes
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let path = self.storage.store_upload(&id, &ext, content)?;

        let (width, height) = match image::image_dimensions(&path) {
            Ok(dims) => dims,
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&path) {
                    warn!("Could not remove rejected upload {}: {}", path.display(), remove_err);
                }
                return Err(JobError::Validation(format!("Not a readable image: {}", e)));
            }
        };

        let mut job = Job::with_id(id, path, filename.clone(), width, height);
        if let Some(batch_id) = batch_id {
            job = job.in_batch(batch_id);
        }
        let id = self.store.create(job)?;

        info!("Uploaded {} as {} ({}x{})", filename, id, width, height);
        Ok(UploadedImage {
            id,
            filename,
            width,
            height,
        })
    }
}
