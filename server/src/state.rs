//! Application state for the inference server

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crop_disease::backend::DefaultBackend;
use crop_disease::inference::Predictor;

use crate::error::ApiError;
use crate::fetch::ImageFetcher;

/// Shared application state, built once at startup
pub struct AppState {
    /// Loaded classifier; handlers work on clones
    predictor: Mutex<Predictor<DefaultBackend>>,
    num_classes: usize,
    /// Outbound client for image URLs
    pub fetcher: ImageFetcher,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(predictor: Predictor<DefaultBackend>, fetcher: ImageFetcher) -> Self {
        Self {
            num_classes: predictor.num_classes(),
            predictor: Mutex::new(predictor),
            fetcher,
            started_at: Instant::now(),
        }
    }

    /// Snapshot of the predictor for one request
    pub fn predictor(&self) -> Result<Predictor<DefaultBackend>, ApiError> {
        let predictor = self
            .predictor
            .lock()
            .map_err(|_| ApiError::Internal("predictor lock poisoned".to_string()))?;
        Ok(predictor.clone())
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
