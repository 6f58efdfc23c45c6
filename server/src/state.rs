use std::sync::Arc;

use better_images::ImageService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImageService>,
}

impl AppState {
    pub fn new(service: Arc<ImageService>) -> Self {
        Self { service }
    }
}
