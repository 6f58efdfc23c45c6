//! Scriptable `TransformProvider` for integration tests.
//!
//! Outputs are real files next to the input so the pipeline, resolver and
//! bundler see the same layout the local provider produces. Individual jobs
//! can be made to fail or panic, every call can be delayed or held behind a
//! gate, and peak concurrency is tracked.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use better_images::processor::output_path;
use better_images::{ProgressFn, ProviderError, TransformProvider, UpscaleFactor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Fail,
    Panic,
}

#[derive(Default)]
pub struct MockProvider {
    delay: Mutex<Duration>,
    // (job id, operation) -> scripted behavior
    scripted: Mutex<HashMap<(String, &'static str), Behavior>>,
    gate_closed: Mutex<bool>,
    gate: Condvar,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Makes `operation` fail for the job with `job_id`.
    pub fn fail_job(&self, job_id: &str, operation: &'static str) {
        self.scripted
            .lock()
            .unwrap()
            .insert((job_id.to_string(), operation), Behavior::Fail);
    }

    /// Makes `operation` panic for the job with `job_id`.
    pub fn panic_job(&self, job_id: &str, operation: &'static str) {
        self.scripted
            .lock()
            .unwrap()
            .insert((job_id.to_string(), operation), Behavior::Panic);
    }

    /// Holds every call until [`release`](Self::release).
    pub fn hold(&self) {
        *self.gate_closed.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.gate_closed.lock().unwrap() = false;
        self.gate.notify_all();
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn wait_for_gate(&self) {
        let guard = self.gate_closed.lock().unwrap();
        let _guard = self
            .gate
            .wait_timeout_while(guard, Duration::from_secs(10), |closed| *closed)
            .unwrap();
    }

    fn behavior(&self, input: &Path, operation: &'static str) -> Option<Behavior> {
        let name = input.file_name()?.to_str()?;
        let scripted = self.scripted.lock().unwrap();
        scripted
            .iter()
            .find(|((id, op), _)| *op == operation && name.starts_with(id.as_str()))
            .map(|(_, behavior)| *behavior)
    }

    fn run(
        &self,
        operation: &'static str,
        input: &Path,
        output: PathBuf,
        progress: ProgressFn<'_>,
        write: impl FnOnce(&Path, &Path) -> Result<(), ProviderError>,
    ) -> Result<PathBuf, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);

        progress(&format!("{} started", operation));
        self.wait_for_gate();
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match self.behavior(input, operation) {
            Some(Behavior::Panic) => panic!("{} crashed", operation),
            Some(Behavior::Fail) => {
                return Err(ProviderError::CommandFailed {
                    program: operation.to_string(),
                    message: "model weights not found".to_string(),
                })
            }
            None => {}
        }

        write(input, &output)?;
        progress(&format!("{} finished", operation));
        Ok(output)
    }
}

/// Decrements the running count even when the call panics.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn reencode(input: &Path, output: &Path) -> Result<(), ProviderError> {
    let img = image::open(input).map_err(|e| ProviderError::ReadImage {
        path: input.to_path_buf(),
        source: e,
    })?;
    img.to_rgba8()
        .save(output)
        .map_err(|e| ProviderError::WriteImage {
            path: output.to_path_buf(),
            source: e,
        })
}

fn write_bytes(output: &Path, bytes: &[u8]) -> Result<(), ProviderError> {
    std::fs::write(output, bytes).map_err(|e| ProviderError::Io {
        path: output.to_path_buf(),
        source: e,
    })
}

impl TransformProvider for MockProvider {
    fn upscale(
        &self,
        path: &Path,
        factor: UpscaleFactor,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        let output = output_path(path, &format!("_x{}", factor.value()), Some("png"));
        self.run("upscale", path, output, progress, reencode)
    }

    fn remove_background(
        &self,
        path: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        let output = output_path(path, "_nobg", Some("png"));
        self.run("remove_background", path, output, progress, reencode)
    }

    fn to_vector(&self, path: &Path, progress: ProgressFn<'_>) -> Result<PathBuf, ProviderError> {
        let output = output_path(path, "", Some("svg"));
        self.run("to_vector", path, output, progress, |_, out| {
            write_bytes(out, b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>")
        })
    }

    fn to_icon_set(
        &self,
        path: &Path,
        _sizes: &[u32],
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        let output = output_path(path, "", Some("ico"));
        self.run("to_icon_set", path, output, progress, |_, out| {
            write_bytes(out, b"\x00\x00\x01\x00")
        })
    }
}
