// src/ai/mod.rs
//! Generation backend: relevance scoring, post text and illustration images.

pub mod cache;
pub mod openai;

use async_trait::async_trait;

use crate::error::CallError;

pub use openai::OpenAiBackend;

/// Which text request is being made; backends may route to different models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextTask {
    Score,
    Post,
}

impl TextTask {
    pub fn as_str(self) -> &'static str {
        match self {
            TextTask::Score => "score",
            TextTask::Post => "generate-post",
        }
    }
}

/// One call = one network request; retries are applied by the caller.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, task: TextTask, prompt: &str) -> Result<String, CallError>;
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, CallError>;
    fn provider_name(&self) -> &'static str;
}
