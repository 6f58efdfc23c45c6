//! Router construction and request helpers for API tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use better_images::processor::output_path;
use better_images::{
    Config, ImageService, ProgressFn, ProviderError, TransformProvider, UpscaleFactor,
};
use better_images_server::config::{LogFormat, ServerConfig};
use better_images_server::router::build_app_router;
use better_images_server::state::AppState;

const BOUNDARY: &str = "better-images-test-boundary";

/// Provider that copies its input, optionally after a delay.
pub struct CopyProvider {
    delay: Duration,
}

impl CopyProvider {
    fn copy(&self, input: &Path, output: PathBuf) -> Result<PathBuf, ProviderError> {
        std::thread::sleep(self.delay);
        std::fs::copy(input, &output).map_err(|e| ProviderError::Io {
            path: output.clone(),
            source: e,
        })?;
        Ok(output)
    }

    fn stub(&self, output: PathBuf, bytes: &[u8]) -> Result<PathBuf, ProviderError> {
        std::thread::sleep(self.delay);
        std::fs::write(&output, bytes).map_err(|e| ProviderError::Io {
            path: output.clone(),
            source: e,
        })?;
        Ok(output)
    }
}

impl TransformProvider for CopyProvider {
    fn upscale(
        &self,
        path: &Path,
        factor: UpscaleFactor,
        _progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        self.copy(path, output_path(path, &format!("_x{}", factor.value()), None))
    }

    fn remove_background(
        &self,
        path: &Path,
        _progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        self.copy(path, output_path(path, "_nobg", Some("png")))
    }

    fn to_vector(&self, path: &Path, _progress: ProgressFn<'_>) -> Result<PathBuf, ProviderError> {
        self.stub(
            output_path(path, "", Some("svg")),
            b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>",
        )
    }

    fn to_icon_set(
        &self,
        path: &Path,
        _sizes: &[u32],
        _progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        self.stub(output_path(path, "", Some("ico")), b"\x00\x00\x01\x00")
    }
}

/// A router over a service rooted in a temp directory.
pub struct TestApp {
    temp_dir: TempDir,
    pub service: Arc<ImageService>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every transformation sleeps for `delay` first.
    pub fn with_delay(delay: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            upload_directory: temp_dir.path().join("uploads"),
            output_directory: temp_dir.path().join("outputs"),
            worker_count: 2,
            ..Config::default()
        };

        let static_dir = temp_dir.path().join("static");
        std::fs::create_dir_all(&static_dir).expect("Failed to create static dir");
        std::fs::write(static_dir.join("index.html"), "<!doctype html><title>Better Images</title>")
            .expect("Failed to write index.html");

        let server_config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            config_path: None,
            static_dir,
            log_format: LogFormat::Text,
        };

        let service = Arc::new(
            ImageService::new(config, Arc::new(CopyProvider { delay }))
                .expect("Failed to start service"),
        );
        let router = build_app_router(AppState::new(Arc::clone(&service)), &server_config);

        Self {
            temp_dir,
            service,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_files(&self, uri: &str, field: &str, files: &[(&str, Vec<u8>)]) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(field, files)))
                .unwrap(),
        )
        .await
    }

    /// Uploads a PNG and returns the job id.
    pub async fn upload_png(&self, filename: &str) -> String {
        let response = self
            .post_files("/api/upload", "file", &[(filename, png_bytes(8, 6))])
            .await;
        assert_eq!(response.status(), 200);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    /// Polls the status route until the job is `done` or `error`.
    pub async fn wait_for_terminal(&self, id: &str) -> serde_json::Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        loop {
            let json = body_json(self.get(&format!("/api/status/{id}")).await).await;
            if json["status"] == "done" || json["status"] == "error" {
                return json;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for job {id}: {json}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.service.shutdown();
    }
}

pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbaImage::from_pixel(w, h, image::Rgba([10, 200, 90, 255]))
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf.into_inner()
}

fn multipart_body(field: &str, files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
