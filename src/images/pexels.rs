// src/images/pexels.rs
use async_trait::async_trait;
use serde::Deserialize;

use super::StockPhotoSearch;
use crate::error::CallError;

const SEARCH_URL: &str = "https://api.pexels.com/v1/search";

/// Pexels photo search. Returns the first hit's `large2x` (else `large`) URL.
pub struct PexelsSearch {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl PexelsSearch {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: SEARCH_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SearchResp {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    src: PhotoSrc,
}

#[derive(Debug, Deserialize)]
struct PhotoSrc {
    large2x: Option<String>,
    large: Option<String>,
}

fn first_photo_url(resp: SearchResp) -> Option<String> {
    resp.photos
        .into_iter()
        .next()
        .and_then(|p| p.src.large2x.or(p.src.large))
        .filter(|u| !u.trim().is_empty())
}

#[async_trait]
impl StockPhotoSearch for PexelsSearch {
    async fn search(&self, query: &str) -> Result<Option<String>, CallError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .send()
            .await
            .map_err(|e| CallError::from_reqwest("stock-search", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status("stock-search", status, &body));
        }
        let body: SearchResp = resp
            .json()
            .await
            .map_err(|e| CallError::permanent(format!("stock-search: decoding response: {e}")))?;
        Ok(first_photo_url(body))
    }
}
