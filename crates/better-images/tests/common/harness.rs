//! Test harness for isolated service execution.
//!
//! The `TestHarness` struct provides a complete isolated environment:
//! - Temporary upload and output directories
//! - An `ImageService` backed by a `MockProvider`
//! - Helpers to upload generated images and wait for jobs to settle

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use better_images::{Config, ImageService, JobStatus, JobStatusView, UploadedImage};

use super::mock_provider::MockProvider;

/// Encodes a solid `w`×`h` PNG.
pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbaImage::from_pixel(w, h, image::Rgba([30, 144, 255, 255]))
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf.into_inner()
}

/// Encodes a solid `w`×`h` JPEG.
pub fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(w, h, image::Rgb([200, 120, 40]))
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .expect("Failed to encode JPEG");
    buf.into_inner()
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub provider: Arc<MockProvider>,
    pub service: ImageService,
}

impl TestHarness {
    /// Harness with two workers and default settings.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_workers(worker_count: usize) -> Self {
        Self::with_config(|config| config.worker_count = worker_count)
    }

    /// Harness whose config is adjusted by `configure` after the directories
    /// have been pointed into the temp dir.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config {
            upload_directory: temp_dir.path().join("uploads"),
            output_directory: temp_dir.path().join("outputs"),
            worker_count: 2,
            ..Config::default()
        };
        configure(&mut config);

        let provider = Arc::new(MockProvider::new());
        let service = ImageService::new(config, provider.clone()).expect("Failed to start service");

        Self {
            temp_dir,
            provider,
            service,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn output_dir(&self) -> &Path {
        &self.service.config().output_directory
    }

    pub fn upload_png(&self, filename: &str, w: u32, h: u32) -> UploadedImage {
        self.service
            .upload(filename, &png_bytes(w, h))
            .expect("Upload failed")
    }

    /// Polls until the job reaches `done` or `error`.
    pub fn wait_for_terminal(&self, id: &str) -> JobStatusView {
        self.wait_for_status(id, |s| s.is_terminal())
    }

    pub fn wait_for_status(&self, id: &str, accept: impl Fn(JobStatus) -> bool) -> JobStatusView {
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            let status = self.service.status(id).expect("Job vanished");
            if accept(status.status) {
                return status;
            }
            assert!(
                Instant::now() < deadline,
                "Timed out waiting for job {} (last status {}, progress {:?})",
                id,
                status.status,
                status.progress
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Polls until `cond` holds or fails the test after a timeout.
    pub fn wait_until(&self, what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(15);
        while !cond() {
            assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.provider.release();
        self.service.shutdown();
    }
}
