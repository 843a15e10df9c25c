//! Prediction endpoint

use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crop_disease::inference::Prediction;

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<Prediction>,
}

/// POST /predict - Classify the image at `image_url`
///
/// Returns one prediction per class, highest confidence first.
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload?;
    debug!("Fetching {}", request.image_url);

    let bytes = state.fetcher.fetch(&request.image_url).await.map_err(|e| {
        warn!("Image fetch failed for {}: {}", request.image_url, e);
        ApiError::from(e)
    })?;

    let predictor = state.predictor()?;
    let predictions = tokio::task::spawn_blocking(move || predictor.predict_bytes(&bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("inference task failed: {}", e)))??;

    Ok(Json(PredictResponse { predictions }))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::routing::get;
    use axum::Router;
    use serde_json::{json, Value};

    use super::*;
    use crate::routes::{app, test_support};

    async fn fixture_server() -> SocketAddr {
        let png = test_support::png_bytes();
        let strip = test_support::png_sized(400, 8);
        let router = Router::new()
            .route("/leaf.png", get(move || async move { png }))
            .route("/strip.png", get(move || async move { strip }))
            .route(
                "/slow.png",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    test_support::png_bytes()
                }),
            )
            .route("/page.html", get(|| async { "<html>not an image</html>" }));
        test_support::spawn(router).await
    }

    async fn post_predict(api: SocketAddr, body: Value) -> (reqwest::StatusCode, Value) {
        let response = reqwest::Client::new()
            .post(format!("http://{}/predict", api))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_zero_logits_give_half_confidence() {
        let images = fixture_server().await;
        let api = test_support::spawn(app(test_support::zero_logit_state())).await;

        let (status, body) = post_predict(
            api,
            json!({ "image_url": format!("http://{}/leaf.png", images) }),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::OK);

        let response: PredictResponse = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(response.predictions.len(), 2);
        let mut names: Vec<&str> = response
            .predictions
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["blight", "healthy"]);
        for p in &response.predictions {
            assert!((p.confidence - 0.5).abs() < 1e-6);
            assert!(p.disease_id.is_none());
        }
        assert!(body["predictions"][0]["disease_id"].is_null());
    }

    #[tokio::test]
    async fn test_missing_image_is_bad_request() {
        let images = fixture_server().await;
        let api = test_support::spawn(app(test_support::zero_logit_state())).await;

        let (status, body) = post_predict(
            api,
            json!({ "image_url": format!("http://{}/missing.png", images) }),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Image fetch failed: "));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_bad_request() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let api = test_support::spawn(app(test_support::zero_logit_state())).await;
        let (status, body) = post_predict(
            api,
            json!({ "image_url": format!("http://{}/leaf.png", closed) }),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Image fetch failed: "));
    }

    #[tokio::test]
    async fn test_slow_image_host_times_out() {
        let images = fixture_server().await;
        let state = test_support::zero_logit_state_with_timeout(Duration::from_millis(200));
        let api = test_support::spawn(app(state)).await;

        let (status, body) = post_predict(
            api,
            json!({ "image_url": format!("http://{}/slow.png", images) }),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Image fetch failed: "));
    }

    #[tokio::test]
    async fn test_elongated_image_is_unprocessable() {
        let images = fixture_server().await;
        let api = test_support::spawn(app(test_support::zero_logit_state())).await;

        let (status, body) = post_predict(
            api,
            json!({ "image_url": format!("http://{}/strip.png", images) }),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Image decode failed: "));
        assert!(detail.contains("aspect ratio"));
    }

    #[tokio::test]
    async fn test_non_image_body_is_unprocessable() {
        let images = fixture_server().await;
        let api = test_support::spawn(app(test_support::zero_logit_state())).await;

        let (status, body) = post_predict(
            api,
            json!({ "image_url": format!("http://{}/page.html", images) }),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Image decode failed: "));
    }

    #[tokio::test]
    async fn test_missing_field_is_unprocessable() {
        let api = test_support::spawn(app(test_support::zero_logit_state())).await;

        let (status, body) = post_predict(api, json!({ "url": "http://example.com" })).await;
        assert_eq!(status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }
}
