// src/compose.rs
//! Post generation: one backend request per surviving item, JSON payload
//! validated before it is accepted.

use std::sync::Arc;

use serde::Deserialize;

use crate::ai::{GenerationBackend, TextTask};
use crate::error::CallError;
use crate::model::{GeneratedPost, ItemStatus, NewsItem};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ComposeSettings {
    pub language: String,
    pub min_chars: usize,
    pub max_chars: usize,
    /// Content-level attempts when the reply is not a valid post.
    pub regenerate_attempts: u32,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            language: "Russian".to_string(),
            min_chars: 800,
            max_chars: 1700,
            regenerate_attempts: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    title: Option<String>,
    summary: Option<String>,
    body: Option<String>,
    hashtags: Option<Vec<String>>,
}

pub struct PostComposer {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
    settings: ComposeSettings,
}

impl PostComposer {
    pub fn new(backend: Arc<dyn GenerationBackend>, retry: RetryPolicy, settings: ComposeSettings) -> Self {
        Self {
            backend,
            retry,
            settings,
        }
    }

    pub fn build_prompt(&self, item: &NewsItem, keywords: &[&str]) -> String {
        let s = &self.settings;
        let keywords = if keywords.is_empty() {
            "AI".to_string()
        } else {
            keywords.join(", ")
        };
        format!(
            "You are an AI specialist and IT automation engineer with a project-management background.\n\
             Write strictly in {lang}.\n\
             Write an analytical post with practical takeaways for IT specialists and business owners, \
             first person, stating your own position. Highlight key ideas with **bold** where it fits. \
             No hashtags inside the text.\n\n\
             Reply with strictly one JSON object with fields:\n\
             title - headline up to 100 characters;\n\
             summary - 300 to 400 characters;\n\
             body - the post, {min} to {max} characters;\n\
             hashtags - array of 3 to 4 single words in {lang}, without '#'.\n\
             No other fields.\n\n\
             News title: {title}\n\
             News description: {summary}\n\
             Source: {source}\n\
             Keywords: {keywords}",
            lang = s.language,
            min = s.min_chars,
            max = s.max_chars,
            title = item.title,
            summary = item.summary,
            source = item.source_name,
            keywords = keywords,
        )
    }

    /// Generate, validate and attach the post. On success the item is `PostGenerated`.
    pub async fn generate_post(&self, item: &mut NewsItem, keywords: &[&str]) -> Result<String, CallError> {
        let prompt = self.build_prompt(item, keywords);
        let attempts = self.settings.regenerate_attempts.max(1);
        let mut last_err = CallError::permanent("generate-post: no attempt made");
        for attempt in 1..=attempts {
            let reply = self
                .retry
                .run("generate-post", || self.backend.complete(TextTask::Post, &prompt))
                .await?;
            match self.parse_and_validate(&reply) {
                Ok(post) => {
                    let text = post.formatted();
                    item.generated_post = Some(post);
                    item.advance(ItemStatus::PostGenerated);
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(
                        source_id = %item.source_id,
                        attempt,
                        error = %e,
                        "generated post rejected"
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    pub fn parse_and_validate(&self, reply: &str) -> Result<GeneratedPost, CallError> {
        let json = strip_code_fence(reply);
        let p: Payload = serde_json::from_str(json)
            .map_err(|e| CallError::permanent(format!("generate-post: invalid JSON: {e}")))?;

        let missing = |f: &str| CallError::permanent(format!("generate-post: missing field {f}"));
        let title = p.title.ok_or_else(|| missing("title"))?.trim().to_string();
        let summary = p.summary.ok_or_else(|| missing("summary"))?.trim().to_string();
        let body = p.body.ok_or_else(|| missing("body"))?.trim().to_string();
        let hashtags: Vec<String> = p
            .hashtags
            .ok_or_else(|| missing("hashtags"))?
            .into_iter()
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let len = body.chars().count();
        if len < self.settings.min_chars || len > self.settings.max_chars {
            return Err(CallError::permanent(format!(
                "generate-post: body length {len} outside {}..={}",
                self.settings.min_chars, self.settings.max_chars
            )));
        }
        if summary.is_empty() {
            return Err(CallError::permanent("generate-post: empty summary"));
        }
        if !(3..=4).contains(&hashtags.len()) {
            return Err(CallError::permanent(format!(
                "generate-post: expected 3-4 hashtags, got {}",
                hashtags.len()
            )));
        }

        Ok(GeneratedPost {
            title,
            summary,
            body,
            hashtags,
        })
    }
}

/// Models sometimes wrap JSON in ```json fences despite instructions.
fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
