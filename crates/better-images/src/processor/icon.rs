use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::ico::{IcoEncoder, IcoFrame};
use image::imageops::FilterType;
use image::ExtendedColorType;

use crate::error::ProviderError;
use crate::processor::{output_path, ProgressFn};

/// Writes a multi-resolution ICO with one square RGBA frame per size.
pub fn to_icon_set(
    path: &Path,
    sizes: &[u32],
    progress: ProgressFn<'_>,
) -> Result<PathBuf, ProviderError> {
    let _span = tracing::info_span!("processor.to_icon_set").entered();

    if let Some(bad) = sizes.iter().find(|s| **s == 0 || **s > 256) {
        return Err(ProviderError::InvalidIconSize(*bad));
    }

    progress(&format!("Creating ICO with sizes {:?}...", sizes));

    let img = image::open(path).map_err(|e| ProviderError::ReadImage {
        path: path.to_path_buf(),
        source: e,
    })?;
    let rgba = img.to_rgba8();

    let output = output_path(path, "", Some("ico"));
    let write_err = |e: image::ImageError| ProviderError::WriteImage {
        path: output.clone(),
        source: e,
    };

    let mut frames = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let resized = image::imageops::resize(&rgba, size, size, FilterType::Lanczos3);
        let frame = IcoFrame::as_png(resized.as_raw(), size, size, ExtendedColorType::Rgba8)
            .map_err(write_err)?;
        frames.push(frame);
    }

    let file = File::create(&output).map_err(|e| ProviderError::Io {
        path: output.clone(),
        source: e,
    })?;
    IcoEncoder::new(BufWriter::new(file))
        .encode_images(&frames)
        .map_err(write_err)?;

    progress(&format!("ICO saved with {} sizes", sizes.len()));
    Ok(output)
}
