use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use better_images::ImageService;

/// Spawns the periodic output sweep. `None` when no retention age is
/// configured.
pub fn spawn_retention_sweep(service: Arc<ImageService>) -> Option<JoinHandle<()>> {
    let retention = &service.config().retention;
    let max_age_hours = retention.max_age_hours?;
    let period = Duration::from_secs(retention.sweep_interval_secs.max(1));

    tracing::info!(
        max_age_hours,
        interval_secs = period.as_secs(),
        "Starting output retention sweep"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let service = Arc::clone(&service);
            match tokio::task::spawn_blocking(move || service.sweep_outputs()).await {
                Ok(Some(report)) if report.removed > 0 || report.failed > 0 => {
                    tracing::info!(
                        removed = report.removed,
                        failed = report.failed,
                        "Swept expired outputs"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Retention sweep task failed"),
            }
        }
    }))
}
