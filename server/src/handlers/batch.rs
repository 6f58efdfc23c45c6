//! Batch routes: multi-file upload, trigger, folded status and ZIP download.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use better_images::{
    BatchStatus, BatchTrigger, BatchUpload, OutputFormat, PipelineOptions, UpscaleFactor,
};

use super::{blocking, content_disposition, read_artifact};
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchProcessRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub upscale: Option<UpscaleFactor>,
    #[serde(default)]
    pub remove_bg: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

/// POST /api/batch/upload
///
/// Multipart form with one `files` field per image. Unacceptable files are
/// listed in `skipped` instead of failing the whole upload.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<BatchUpload>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        if filename.is_empty() {
            continue;
        }
        files.push((filename, data.to_vec()));
    }

    let service = Arc::clone(&state.service);
    let batch = blocking(move || service.batches().create_batch(files)).await?;
    Ok(Json(batch))
}

/// POST /api/batch-process
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<BatchProcessRequest>, JsonRejection>,
) -> AppResult<Json<BatchTrigger>> {
    let Json(request) = payload?;
    let options = PipelineOptions {
        upscale: request.upscale,
        remove_bg: request.remove_bg,
        format: request.format,
    };

    let service = Arc::clone(&state.service);
    let ids = request.ids;
    let trigger = blocking(move || service.batches().trigger_batch(&ids, &options)).await?;
    Ok(Json(trigger))
}

/// GET /api/batch/status/{batch_id}
pub async fn status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<Json<BatchStatus>> {
    Ok(Json(state.service.batches().batch_status(&batch_id)?))
}

/// GET /api/batch/download/{batch_id}
pub async fn download(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> AppResult<Response> {
    let service = Arc::clone(&state.service);
    let id = batch_id.clone();
    let archive = blocking(move || service.batches().bundle(&id)).await?;
    let bytes = read_artifact(&archive, "archive").await?;

    let filename = archive
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("batch_{batch_id}.zip"));

    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                content_disposition("attachment", &filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

