//! Age-based cleanup of produced artifacts.

use std::path::Path;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use walkdir::WalkDir;

use super::filesystem::remove_file;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Deletes regular files under `directory` last modified more than `max_age` ago.
///
/// Jobs keep their result paths; a swept artifact simply resolves to not-found
/// afterwards.
pub fn sweep(directory: &Path, max_age: Duration) -> SweepReport {
    let mut report = SweepReport::default();
    let cutoff = match SystemTime::now().checked_sub(max_age) {
        Some(cutoff) => cutoff,
        None => return report,
    };

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => continue,
        };
        if modified >= cutoff {
            continue;
        }

        match remove_file(entry.path()) {
            Ok(()) => {
                debug!("Swept {}", entry.path().display());
                report.removed += 1;
            }
            Err(e) => {
                warn!("{}", e);
                report.failed += 1;
            }
        }
    }

    if report.removed > 0 || report.failed > 0 {
        info!(
            "Retention sweep of {}: removed {}, failed {}",
            directory.display(),
            report.removed,
            report.failed
        );
    }
    report
}
