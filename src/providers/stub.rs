// src/providers/stub.rs

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

use crate::errors::Result;
use crate::extract::{PYTEST_END, PYTEST_START, RawModelOutput};
use crate::providers::{ChatMessage, CompletionOptions, LlmProvider};

static TARGET_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"from under_test import (\w+)").expect("valid import regex"));

/// Offline provider used when `STUB_GEN=1`. Answers every prompt with a
/// tiny deterministic pytest module, in whichever reply format was asked for.
pub struct StubProvider;

impl StubProvider {
    /// The module the stub produces for `symbol`.
    pub fn module_for(symbol: &str) -> String {
        format!(
            "from under_test import {symbol}\n\
             import pytest\n\n\
             @pytest.mark.parametrize('a,b,expected', [(2, 3, 6)])\n\
             def test_{symbol}(a, b, expected):\n    \
             assert {symbol}(a, b) == expected\n"
        )
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<RawModelOutput> {
        log::debug!("🧪 Stub generation for model: {}", model);

        let symbol = messages
            .iter()
            .rev()
            .find_map(|m| TARGET_IMPORT.captures(&m.content))
            .map_or_else(|| "target".to_string(), |caps| caps[1].to_string());
        let module = Self::module_for(&symbol);

        let wants_json = messages
            .iter()
            .any(|m| m.role == "system" && m.content.contains("VALID JSON"));

        let reply = if wants_json {
            json!({
                "tests_b64": STANDARD.encode(&module),
                "rationale": "Stub generation; no model was called.",
            })
            .to_string()
        } else {
            format!("{PYTEST_START}\n{module}{PYTEST_END}\n")
        };

        Ok(RawModelOutput::PlainText(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{TestPayload, decode_json, extract_delimited};

    #[actix_rt::test]
    async fn test_stub_marker_reply() {
        let messages = vec![
            ChatMessage::system("Return ONLY the pytest file content"),
            ChatMessage::user("from under_test import power"),
        ];
        let out = StubProvider
            .generate("stub", &messages, &CompletionOptions::default())
            .await
            .unwrap()
            .into_text();
        let module = extract_delimited(&out, PYTEST_START, PYTEST_END).unwrap();
        assert!(module.starts_with("from under_test import power"));
        assert!(module.contains("def test_power(a, b, expected):"));
    }

    #[actix_rt::test]
    async fn test_stub_json_reply() {
        let messages = vec![
            ChatMessage::system("You must output VALID JSON only"),
            ChatMessage::user("from under_test import mult"),
        ];
        let out = StubProvider
            .generate("stub", &messages, &CompletionOptions::default())
            .await
            .unwrap();
        let payload = TestPayload::from_object(decode_json(out).unwrap()).unwrap();
        let (module, _) = payload.into_module().unwrap();
        assert_eq!(module, StubProvider::module_for("mult"));
    }
}
