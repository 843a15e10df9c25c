//! Welcome endpoint

use axum::Json;
use serde::{Deserialize, Serialize};

pub const WELCOME_MESSAGE: &str =
    "Welcome to the Crop Disease Detection API. Use the /predict endpoint to get predictions.";

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

/// GET / - Welcome message
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: WELCOME_MESSAGE.to_string(),
    })
}
