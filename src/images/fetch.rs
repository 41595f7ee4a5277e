// src/images/fetch.rs
use async_trait::async_trait;

use super::ImageFetcher;
use crate::error::CallError;

/// Plain GET download; only `image/*` responses are accepted.
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CallError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CallError::from_reqwest("fetch-image", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CallError::from_status("fetch-image", status, ""));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(CallError::permanent(format!(
                "fetch-image: {url} is not an image (content-type '{content_type}')"
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CallError::from_reqwest("fetch-image", e))?;
        if bytes.is_empty() {
            return Err(CallError::permanent(format!("fetch-image: {url} returned no bytes")));
        }
        Ok(bytes.to_vec())
    }
}
