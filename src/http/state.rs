use crate::studio::Studio;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
}

impl AppState {
    pub fn new(studio: Arc<Studio>) -> Self {
        Self { studio }
    }
}
