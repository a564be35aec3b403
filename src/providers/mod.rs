// src/providers/mod.rs

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;
use crate::extract::RawModelOutput;

pub mod mistral;
pub mod stub;

/// One chat message sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Sampling knobs forwarded to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { temperature: 0.0, max_tokens: 1200 }
    }
}

/// A common trait for Large Language Model (LLM) providers.
///
/// Implementations decide the shape of the reply (plain text or chunk list)
/// once, here, and hand it on as a [`RawModelOutput`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends `messages` to `model` and returns the raw reply content.
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<RawModelOutput>;
}
