//! Axum handlers. Core operations block on file I/O and image decoding, so
//! every call into the service goes through [`blocking`].

pub mod batch;
pub mod health;
pub mod jobs;

use std::path::Path;

use serde::Deserialize;

use better_images::{resolve, JobError, ResultKind};

use crate::error::{AppError, AppResult};

/// `?type=` selector shared by download and preview routes.
#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl KindQuery {
    /// The requested kind, `final` when absent.
    pub fn result_kind(&self) -> Result<ResultKind, JobError> {
        resolve::parse_kind(self.kind.as_deref().unwrap_or("final"))
    }
}

/// Runs `f` on the blocking thread pool.
pub async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Result<T, JobError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::InternalError(format!("Blocking task failed: {e}")))?
        .map_err(AppError::from)
}

/// Reads an artifact for the response body. A file removed since it was
/// resolved is reported like any other missing file.
pub async fn read_artifact(path: &Path, kind: &str) -> AppResult<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(JobError::file_not_found(kind).into())
        }
        Err(e) => Err(AppError::InternalError(format!(
            "Failed to read {}: {e}",
            better_images::sanitize::redact_path(path)
        ))),
    }
}

/// `Content-Disposition` value carrying `filename` in both the plain and the
/// RFC 5987 form.
pub fn content_disposition(disposition: &str, filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{disposition}; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}
