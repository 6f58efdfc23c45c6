use std::path::{Path, PathBuf};
use std::time::Instant;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::info;

use crate::error::ProviderError;
use crate::processor::{output_path, ProgressFn};
use crate::sanitize;

/// Upscales `path` by `scale` (2 or 4) with Lanczos resampling.
///
/// Sources larger than `max_input_dimension` on either side are shrunk first
/// so a 4x run cannot explode memory. Images with an alpha channel are
/// written as PNG; others keep their format.
pub fn upscale(
    path: &Path,
    scale: u32,
    max_input_dimension: u32,
    progress: ProgressFn<'_>,
) -> Result<PathBuf, ProviderError> {
    let _span = tracing::info_span!("processor.upscale", scale).entered();

    if scale != 2 && scale != 4 {
        return Err(ProviderError::UnsupportedScale(scale));
    }

    progress("Checking image size...");
    let img = open(path)?;
    let img = shrink_if_needed(path, img, max_input_dimension)?;

    let (w, h) = img.dimensions();
    let (target_w, target_h) = scaled_size(w, h, scale)?;
    progress(&format!(
        "Upscaling {}×{} → {}×{}...",
        w, h, target_w, target_h
    ));

    let start = Instant::now();
    let has_alpha = img.color().has_alpha();
    let upscaled = img.resize_exact(target_w, target_h, FilterType::Lanczos3);

    let suffix = format!("_x{}", scale);
    let output = if has_alpha {
        output_path(path, &suffix, Some("png"))
    } else {
        output_path(path, &suffix, None)
    };
    save(&upscaled, &output)?;

    progress(&format!(
        "Upscaled in {:.1}s",
        start.elapsed().as_secs_f64()
    ));
    Ok(output)
}

fn open(path: &Path) -> Result<DynamicImage, ProviderError> {
    image::open(path).map_err(|e| ProviderError::ReadImage {
        path: path.to_path_buf(),
        source: e,
    })
}

fn shrink_if_needed(
    path: &Path,
    img: DynamicImage,
    max_dim: u32,
) -> Result<DynamicImage, ProviderError> {
    let (w, h) = img.dimensions();
    if w <= max_dim && h <= max_dim {
        return Ok(img);
    }

    let (new_w, new_h) = fit_within(w, h, max_dim);
    info!(
        "Resizing {} {}×{} → {}×{} before upscaling",
        sanitize::redact_path(path),
        w,
        h,
        new_w,
        new_h
    );

    let resized = img.resize_exact(new_w, new_h, FilterType::Lanczos3);
    save(&resized, &output_path(path, "_resized", None))?;
    Ok(resized)
}

/// Target size for an upscale. The pixel count must fit in a `u32`.
fn scaled_size(w: u32, h: u32, scale: u32) -> Result<(u32, u32), ProviderError> {
    let too_large = || ProviderError::TooLarge {
        width: w,
        height: h,
        scale,
    };
    let target_w = w.checked_mul(scale).ok_or_else(too_large)?;
    let target_h = h.checked_mul(scale).ok_or_else(too_large)?;
    target_w.checked_mul(target_h).ok_or_else(too_large)?;
    Ok((target_w, target_h))
}

/// Largest size with the same aspect ratio that fits in a `max_dim` square.
pub fn fit_within(w: u32, h: u32, max_dim: u32) -> (u32, u32) {
    let ratio = (max_dim as f64 / w as f64).min(max_dim as f64 / h as f64);
    let new_w = ((w as f64 * ratio) as u32).max(1);
    let new_h = ((h as f64 * ratio) as u32).max(1);
    (new_w, new_h)
}

/// Saves `img` in the format implied by `path`, normalizing the pixel
/// layout to one every enabled encoder accepts.
pub fn save(img: &DynamicImage, path: &Path) -> Result<(), ProviderError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let normalized = if ext == "jpg" || ext == "jpeg" || !img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        DynamicImage::ImageRgba8(img.to_rgba8())
    };

    normalized
        .save(path)
        .map_err(|e| ProviderError::WriteImage {
            path: path.to_path_buf(),
            source: e,
        })
}
