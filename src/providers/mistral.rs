// src/providers/mistral.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::MistralConfig;
use crate::errors::{GenError, Result};
use crate::extract::RawModelOutput;
use crate::providers::{ChatMessage, CompletionOptions, LlmProvider};

/// A provider for the Mistral chat completions API.
pub struct MistralProvider {
    client: Client,
    config: MistralConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    // Either a string or a list of typed chunks.
    #[serde(default)]
    content: serde_json::Value,
}

impl MistralProvider {
    /// Creates a new `MistralProvider`.
    pub fn new(client: Client, config: MistralConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl LlmProvider for MistralProvider {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<RawModelOutput> {
        let url = format!("{}/v1/chat/completions", self.config.api_base.trim_end_matches('/'));

        log::info!("📡 Calling Mistral: {} with model: {}", url, model);

        let body = ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let start = Instant::now();

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        log::info!("📥 Mistral response status: {} ({}ms)", status, latency_ms);

        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(GenError::ApiError {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let chat_resp: ChatResponse = resp.json().await?;

        let content = chat_resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenError::UnexpectedResponse("No choices in response".to_string()))?;

        let output = RawModelOutput::from_json(content);
        if matches!(&output, RawModelOutput::PlainText(text) if text.is_empty()) {
            return Err(GenError::EmptyResponse);
        }

        Ok(output)
    }
}
