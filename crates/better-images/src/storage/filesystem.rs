use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::Config;
use crate::error::StorageError;

/// Owns the upload and output directories.
///
/// Uploads are stored as `<job id>.<ext>`, per-run working copies and every
/// produced artifact live in the output directory.
pub struct FileStorage {
    upload_directory: PathBuf,
    output_directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(upload_directory: P, output_directory: Q) -> Self {
        Self {
            upload_directory: upload_directory.as_ref().to_path_buf(),
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.upload_directory, &config.output_directory)
    }

    pub fn upload_directory(&self) -> &Path {
        &self.upload_directory
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn ensure_directories(&self) -> Result<(), StorageError> {
        ensure_directory(&self.upload_directory)?;
        ensure_directory(&self.output_directory)
    }

    /// Writes uploaded bytes to `<id>.<ext>`. Never overwrites an existing file.
    pub fn store_upload(&self, id: &str, ext: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        ensure_directory(&self.upload_directory)?;
        let path = self.upload_directory.join(format!("{}.{}", id, ext));

        // create_new is O_CREAT | O_EXCL
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => return Err(StorageError::WriteFile { path, source: e }),
        };

        file.write_all(content).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Copies `source` to `<id>_work.<ext>` in the output directory, replacing
    /// any copy left by an earlier run.
    pub fn working_copy(&self, id: &str, source: &Path) -> Result<PathBuf, StorageError> {
        ensure_directory(&self.output_directory)?;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let target = self.output_directory.join(format!("{}_work.{}", id, ext));

        std::fs::copy(source, &target).map_err(|e| StorageError::CopyFile {
            from: source.to_path_buf(),
            to: target.clone(),
            source: e,
        })?;
        Ok(target)
    }

    /// Where a source shrunk to fit `max_dimension` is kept.
    pub fn resized_source_path(&self, id: &str, max_dimension: u32, ext: &str) -> PathBuf {
        self.upload_directory
            .join(format!("{}_max{}.{}", id, max_dimension, ext))
    }

    /// Deletes `paths`, skipping `keep` and files already gone. Returns how many
    /// files were removed; failures are logged and otherwise ignored.
    pub fn remove_artifacts<'a, I>(&self, paths: I, keep: &Path) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut removed = 0;
        for path in paths {
            if path == keep || !path.exists() {
                continue;
            }
            match remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("{}", e),
            }
        }
        removed
    }

    pub fn archive_path(&self, batch_id: &str) -> PathBuf {
        self.output_directory.join(format!("batch_{}.zip", batch_id))
    }

    /// Writes a deflate ZIP of `entries` (name inside the archive, file on
    /// disk) and returns its path.
    ///
    /// The archive is built in a temp file next to its destination and
    /// renamed into place, so readers of the path always see a complete
    /// archive even while another bundle of the same batch is being written.
    pub fn write_archive(
        &self,
        batch_id: &str,
        entries: &[(String, PathBuf)],
    ) -> Result<PathBuf, StorageError> {
        ensure_directory(&self.output_directory)?;
        let path = self.archive_path(batch_id);
        let archive_err = |message: String| StorageError::Archive {
            path: path.clone(),
            message,
        };

        let staging = NamedTempFile::new_in(&self.output_directory).map_err(|e| {
            StorageError::WriteFile {
                path: self.output_directory.clone(),
                source: e,
            }
        })?;

        {
            let mut zip = ZipWriter::new(BufWriter::new(staging.as_file()));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            for (name, source) in entries {
                zip.start_file(name.as_str(), options)
                    .map_err(|e| archive_err(e.to_string()))?;
                let mut input = File::open(source)
                    .map_err(|e| archive_err(format!("{}: {}", source.display(), e)))?;
                std::io::copy(&mut input, &mut zip)
                    .map_err(|e| archive_err(format!("{}: {}", source.display(), e)))?;
            }

            let mut writer = zip.finish().map_err(|e| archive_err(e.to_string()))?;
            writer.flush().map_err(|e| StorageError::WriteFile {
                path: staging.path().to_path_buf(),
                source: e,
            })?;
        }

        staging.persist(&path).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e.error,
        })?;

        debug!("Wrote {} entries to {}", entries.len(), path.display());
        Ok(path)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

pub(crate) fn remove_file(path: &Path) -> Result<(), StorageError> {
    std::fs::remove_file(path).map_err(|e| StorageError::RemoveFile {
        path: path.to_path_buf(),
        source: e,
    })
}
