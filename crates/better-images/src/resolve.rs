//! Maps a job and a requested result kind to a file on disk and to the
//! name the client should save it under.

use std::path::{Path, PathBuf};

use crate::error::JobError;
use crate::worker::job::{Job, ResultKind};

/// Path of the artifact of `kind`. `Original` is the job's current source.
///
/// Fails with `NotFound` when the job has no such result or the file has
/// since disappeared from disk.
pub fn resolve(job: &Job, kind: ResultKind) -> Result<PathBuf, JobError> {
    let path = artifact(job, kind).ok_or_else(|| JobError::file_not_found(kind.as_str()))?;
    if !path.is_file() {
        return Err(JobError::file_not_found(kind.as_str()));
    }
    Ok(path.to_path_buf())
}

/// `<upload stem><kind suffix><artifact extension>`, e.g. `cat_processed.png`.
pub fn download_name(job: &Job, kind: ResultKind) -> String {
    let stem = Path::new(&job.original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");

    let ext = artifact(job, kind)
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_string())
        .unwrap_or_else(|| fallback_extension(kind).to_string());

    format!("{}{}.{}", stem, kind.download_suffix(), ext)
}

/// Parses a `type` query value. Unknown kinds are reported as a missing
/// file, the same as a known kind the job never produced.
pub fn parse_kind(raw: &str) -> Result<ResultKind, JobError> {
    raw.parse().map_err(|_| JobError::file_not_found(raw))
}

/// MIME type for serving `path` inline.
pub fn content_type(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("svg") => "image/svg+xml".to_string(),
        Some("ico") => "image/x-icon".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

fn artifact(job: &Job, kind: ResultKind) -> Option<&Path> {
    match kind {
        ResultKind::Original => Some(job.source.as_path()),
        other => job.results.get(&other).map(PathBuf::as_path),
    }
}

fn fallback_extension(kind: ResultKind) -> &'static str {
    match kind {
        ResultKind::Svg => "svg",
        ResultKind::Ico => "ico",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(original_name: &str) -> Job {
        Job::new(
            PathBuf::from("/uploads/abc.jpg"),
            original_name.to_string(),
            10,
            10,
        )
    }

    #[test]
    fn test_download_name_final_png() {
        let mut job = job("cat.jpg");
        job.results
            .insert(ResultKind::Final, PathBuf::from("/out/abc_work_x2_nobg.png"));
        assert_eq!(download_name(&job, ResultKind::Final), "cat_processed.png");
    }

    #[test]
    fn test_download_name_suffixes() {
        let mut job = job("holiday photo.jpeg");
        job.results
            .insert(ResultKind::Upscaled, PathBuf::from("/out/abc_work_x4.jpeg"));
        job.results
            .insert(ResultKind::NoBackground, PathBuf::from("/out/abc_nobg.png"));
        job.results.insert(ResultKind::Svg, PathBuf::from("/out/abc.svg"));

        assert_eq!(
            download_name(&job, ResultKind::Upscaled),
            "holiday photo_upscaled.jpeg"
        );
        assert_eq!(
            download_name(&job, ResultKind::NoBackground),
            "holiday photo_nobg.png"
        );
        assert_eq!(download_name(&job, ResultKind::Svg), "holiday photo.svg");
        assert_eq!(download_name(&job, ResultKind::Original), "holiday photo.jpg");
    }

    #[test]
    fn test_download_name_without_artifact_uses_fallback() {
        let job = job("logo.png");
        assert_eq!(download_name(&job, ResultKind::Svg), "logo.svg");
        assert_eq!(download_name(&job, ResultKind::Ico), "logo.ico");
        assert_eq!(download_name(&job, ResultKind::Final), "logo_processed.png");
    }

    #[test]
    fn test_resolve_absent_kind_is_not_found() {
        let mut job = job("cat.png");
        job.results.insert(ResultKind::Final, PathBuf::from("/out/x.png"));
        assert!(matches!(
            resolve(&job, ResultKind::Svg),
            Err(JobError::NotFound { what: "File", .. })
        ));
    }

    #[test]
    fn test_resolve_deleted_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.png");
        std::fs::write(&path, b"x").unwrap();

        let mut job = job("cat.png");
        job.results.insert(ResultKind::Final, path.clone());
        assert_eq!(resolve(&job, ResultKind::Final).unwrap(), path);

        std::fs::remove_file(&path).unwrap();
        assert!(resolve(&job, ResultKind::Final).is_err());
    }

    #[test]
    fn test_resolve_original_uses_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("abc.png");
        std::fs::write(&source, b"x").unwrap();
        let job = Job::new(source.clone(), "cat.png".into(), 1, 1);
        assert_eq!(resolve(&job, ResultKind::Original).unwrap(), source);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("no_background").unwrap(), ResultKind::NoBackground);
        assert!(matches!(
            parse_kind("thumbnail"),
            Err(JobError::NotFound { what: "File", .. })
        ));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("a.ICO")), "image/x-icon");
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type(Path::new("a.zip")), "application/zip");
    }
}
