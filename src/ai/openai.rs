// src/ai/openai.rs
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{GenerationBackend, TextTask};
use crate::config::OpenAiConfig;
use crate::error::CallError;

const USER_AGENT: &str = concat!("ai-news-writer/", env!("CARGO_PKG_VERSION"));

/// OpenAI Chat Completions + Images API.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model_rank: String,
    model_post: String,
    model_image: String,
    image_size: String,
}

impl OpenAiBackend {
    pub fn new(cfg: &OpenAiConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            // image generation is slow; give it at least two minutes
            .timeout(timeout.max(Duration::from_secs(120)))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model_rank: cfg.model_rank.clone(),
            model_post: cfg.model_post.clone(),
            model_image: cfg.model_image.clone(),
            image_size: cfg.image_size.clone(),
        })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        what: &str,
        path: &str,
        req: &Req,
    ) -> Result<Resp, CallError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .map_err(|e| CallError::from_reqwest(what, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::from_status(what, status, &body));
        }
        resp.json::<Resp>()
            .await
            .map_err(|e| CallError::permanent(format!("{what}: decoding response: {e}")))
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageReq<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'static str>,
}

#[derive(Deserialize)]
struct ImageResp {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn complete(&self, task: TextTask, prompt: &str) -> Result<String, CallError> {
        let (model, sys, temperature, response_format) = match task {
            TextTask::Score => (
                self.model_rank.as_str(),
                "You rate news for an audience of AI practitioners and business owners. Answer in the requested format only.",
                0.0,
                None,
            ),
            TextTask::Post => (
                self.model_post.as_str(),
                "You write analytical social-media posts about AI news. Output strictly one JSON object.",
                0.7,
                Some(ResponseFormat { kind: "json_object" }),
            ),
        };
        let req = ChatReq {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            response_format,
        };

        let body: ChatResp = self.post_json(task.as_str(), "/chat/completions", &req).await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(CallError::permanent(format!("{}: empty completion", task.as_str())));
        }
        Ok(content)
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, CallError> {
        // dall-e models need an explicit b64 format; gpt-image models always return b64
        let response_format = self.model_image.starts_with("dall-e").then_some("b64_json");
        let req = ImageReq {
            model: &self.model_image,
            prompt,
            size: &self.image_size,
            n: 1,
            response_format,
        };
        let body: ImageResp = self
            .post_json("generate-image", "/images/generations", &req)
            .await?;
        let datum = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CallError::permanent("generate-image: empty data"))?;

        if let Some(b64) = datum.b64_json {
            return base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| CallError::permanent(format!("generate-image: bad base64: {e}")));
        }
        if let Some(url) = datum.url {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| CallError::from_reqwest("generate-image download", e))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CallError::from_status("generate-image download", status, ""));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| CallError::from_reqwest("generate-image download", e))?;
            return Ok(bytes.to_vec());
        }
        Err(CallError::permanent("generate-image: no image in response"))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
