//! Outbound image download

use std::time::Duration;

use thiserror::Error;

/// Network failure or non-success status while fetching an image
#[derive(Error, Debug)]
#[error("{0}")]
pub struct FetchError(#[from] reqwest::Error);

/// HTTP client with a fixed per-request timeout
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the body; 4xx/5xx responses are errors
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
