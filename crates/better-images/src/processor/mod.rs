pub mod command;
pub mod icon;
pub mod upscale;

use std::path::{Path, PathBuf};

use crate::config::{CommandConfig, Config};
use crate::error::ProviderError;
use crate::worker::job::UpscaleFactor;

/// Progress callback handed to transformations. Each call replaces the
/// job's visible progress message.
pub type ProgressFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Performs the actual image transformations.
///
/// Every operation reads `path`, writes a new file and returns its path.
/// Implementations may block for a long time; they run on pool workers.
pub trait TransformProvider: Send + Sync {
    fn upscale(
        &self,
        path: &Path,
        factor: UpscaleFactor,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError>;

    fn remove_background(
        &self,
        path: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError>;

    fn to_vector(&self, path: &Path, progress: ProgressFn<'_>) -> Result<PathBuf, ProviderError>;

    fn to_icon_set(
        &self,
        path: &Path,
        sizes: &[u32],
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError>;
}

/// Provider running on the local machine: raster work through the `image`
/// crate, matting and tracing through external command-line tools.
pub struct LocalProvider {
    max_input_dimension: u32,
    background_removal: CommandConfig,
    vectorizer: CommandConfig,
}

impl LocalProvider {
    pub fn new(
        max_input_dimension: u32,
        background_removal: CommandConfig,
        vectorizer: CommandConfig,
    ) -> Self {
        Self {
            max_input_dimension,
            background_removal,
            vectorizer,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_input_dimension,
            config.background_removal.clone(),
            config.vectorizer.clone(),
        )
    }
}

impl TransformProvider for LocalProvider {
    fn upscale(
        &self,
        path: &Path,
        factor: UpscaleFactor,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        upscale::upscale(path, factor.value(), self.max_input_dimension, progress)
    }

    fn remove_background(
        &self,
        path: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        let _span = tracing::info_span!("processor.remove_background").entered();
        progress("Removing background...");
        let output = output_path(path, "_nobg", Some("png"));
        let elapsed = command::run(&self.background_removal, path, &output)?;
        progress(&format!("Background removed in {:.1}s", elapsed.as_secs_f64()));
        Ok(output)
    }

    fn to_vector(&self, path: &Path, progress: ProgressFn<'_>) -> Result<PathBuf, ProviderError> {
        let _span = tracing::info_span!("processor.to_vector").entered();
        progress("Converting to SVG...");
        let output = output_path(path, "", Some("svg"));
        let elapsed = command::run(&self.vectorizer, path, &output)?;
        progress(&format!("SVG created in {:.1}s", elapsed.as_secs_f64()));
        Ok(output)
    }

    fn to_icon_set(
        &self,
        path: &Path,
        sizes: &[u32],
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, ProviderError> {
        icon::to_icon_set(path, sizes, progress)
    }
}

/// Sibling of `input` named `<stem><suffix>.<ext>`; keeps the input's
/// extension when `ext` is `None`.
pub fn output_path(input: &Path, suffix: &str, ext: Option<&str>) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let ext = ext
        .map(|e| e.to_string())
        .or_else(|| {
            input
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_string())
        })
        .unwrap_or_else(|| "png".to_string());
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}{}.{}", stem, suffix, ext))
}
