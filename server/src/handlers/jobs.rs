//! Single-image routes: upload, process, status, download, preview, resize.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use better_images::{
    resolve, JobError, JobStatusView, OutputFormat, PipelineOptions, UploadedImage,
    UpscaleFactor,
};

use super::{blocking, content_disposition, read_artifact, KindQuery};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub upscale: Option<UpscaleFactor>,
    #[serde(default)]
    pub remove_bg: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

impl ProcessRequest {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            upscale: self.upscale,
            remove_bg: self.remove_bg,
            format: self.format,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub max_dimension: Option<u32>,
}

fn required_id(id: Option<String>) -> AppResult<String> {
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| JobError::Validation("Missing job ID".to_string()).into())
}

/// POST /api/upload
///
/// Multipart form with a `file` field.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadedImage>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) =
        upload.ok_or_else(|| JobError::Validation("No file provided".to_string()))?;
    if filename.is_empty() {
        return Err(JobError::Validation("No file selected".to_string()).into());
    }

    let service = Arc::clone(&state.service);
    let uploaded = blocking(move || service.upload(&filename, &data)).await?;
    Ok(Json(uploaded))
}

/// POST /api/process
///
/// Queues the pipeline and returns immediately; progress is polled through
/// the status route.
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(request) = payload?;
    let options = request.options();
    let id = required_id(request.id)?;

    let service = Arc::clone(&state.service);
    let job_id = id.clone();
    blocking(move || service.process(&job_id, &options)).await?;

    Ok(Json(json!({ "id": id, "status": "processing" })))
}

/// GET /api/status/{id}
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobStatusView>> {
    Ok(Json(state.service.status(&id)?))
}

/// GET /api/download/{id}?type=
///
/// Redirects to a URL ending in the file's download name so browsers save it
/// under that name.
pub async fn download_redirect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<KindQuery>,
) -> AppResult<Redirect> {
    let kind = query.result_kind()?;
    let name = state.service.download_name(&id, kind)?;
    Ok(Redirect::temporary(&format!(
        "/api/download/{}/{}?type={}",
        urlencoding::encode(&id),
        urlencoding::encode(&name),
        kind.as_str()
    )))
}

/// GET /api/download/{id}/{filename}?type=
///
/// The path's file name is cosmetic; the attachment name comes from the job.
pub async fn download(
    State(state): State<AppState>,
    Path((id, _filename)): Path<(String, String)>,
    Query(query): Query<KindQuery>,
) -> AppResult<Response> {
    let kind = query.result_kind()?;
    let download = state.service.download(&id, kind)?;
    let bytes = read_artifact(&download.path, kind.as_str()).await?;

    Ok((
        [
            (CONTENT_TYPE, resolve::content_type(&download.path)),
            (
                CONTENT_DISPOSITION,
                content_disposition("attachment", &download.filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/preview/{id}?type=
pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<KindQuery>,
) -> AppResult<Response> {
    let kind = query.result_kind()?;
    let preview = state.service.preview(&id, kind)?;
    let bytes = read_artifact(&preview.path, kind.as_str()).await?;

    Ok(([(CONTENT_TYPE, preview.content_type)], bytes).into_response())
}

/// POST /api/resize
///
/// Shrinks the job's source so its longer side is at most `max_dimension`
/// and resets the job to `uploaded`.
pub async fn resize(
    State(state): State<AppState>,
    payload: Result<Json<ResizeRequest>, JsonRejection>,
) -> AppResult<Json<UploadedImage>> {
    let Json(request) = payload?;
    let id = required_id(request.id)?;
    let max_dimension = request
        .max_dimension
        .ok_or_else(|| AppError::from(JobError::Validation("Missing max_dimension".to_string())))?;

    let service = Arc::clone(&state.service);
    let resized = blocking(move || service.resize(&id, max_dimension)).await?;
    Ok(Json(resized))
}
