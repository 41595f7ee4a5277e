// src/images/freeimage.rs
use async_trait::async_trait;
use serde::Deserialize;

use super::ImageHost;
use crate::error::CallError;

/// FreeImage.host upload API (multipart `key` + `source`).
pub struct FreeImageHost {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl FreeImageHost {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResp {
    image: Option<UploadedImage>,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    url: Option<String>,
    display_url: Option<String>,
}

fn public_url(resp: UploadResp) -> Option<String> {
    resp.image
        .and_then(|i| i.url.or(i.display_url))
        .filter(|u| !u.trim().is_empty())
}

#[async_trait]
impl ImageHost for FreeImageHost {
    async fn upload(&self, bytes: &[u8]) -> Result<String, CallError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("image.jpg");
        let form = reqwest::multipart::Form::new()
            .text("key", self.api_key.clone())
            .text("format", "json")
            .part("source", part);
        let resp = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CallError::from_reqwest("upload", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status("upload", status, &body));
        }
        let body: UploadResp = resp
            .json()
            .await
            .map_err(|e| CallError::permanent(format!("upload: decoding response: {e}")))?;
        public_url(body).ok_or_else(|| CallError::permanent("upload: host returned no image URL"))
    }
}
