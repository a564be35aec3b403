// src/extract.rs
//! Turns raw model output into either a JSON object or a marker-delimited
//! text block. Models wrap their answers in prose, markdown fences and
//! byte-order marks; everything here is about tolerating that noise while
//! still failing loudly (with an excerpt) when nothing usable is present.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::errors::{GenError, Result};

pub const PYTEST_START: &str = "<<<PYTEST_START>>>";
pub const PYTEST_END: &str = "<<<PYTEST_END>>>";

/// Module name the source file is copied to, and that generated tests import from.
pub const SOURCE_MODULE: &str = "under_test";

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid leading fence regex"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("valid trailing fence regex"));
static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"));

/// One chunk of a chunked model reply. Only chunks carrying `text` contribute.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub text: Option<String>,
}

/// Model output as it arrives from a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum RawModelOutput {
    PlainText(String),
    FragmentList(Vec<Fragment>),
}

impl RawModelOutput {
    /// Classifies a provider's `content` value once, at the provider boundary.
    pub fn from_json(content: Value) -> Self {
        match content {
            Value::String(s) => RawModelOutput::PlainText(s),
            Value::Array(items) => RawModelOutput::FragmentList(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(mut obj) => Fragment {
                            text: match obj.remove("text") {
                                Some(Value::String(s)) => Some(s),
                                _ => None,
                            },
                        },
                        _ => Fragment::default(),
                    })
                    .collect(),
            ),
            Value::Null => RawModelOutput::PlainText(String::new()),
            other => RawModelOutput::PlainText(other.to_string()),
        }
    }

    /// Flattens the output to a single string.
    pub fn into_text(self) -> String {
        match self {
            RawModelOutput::PlainText(text) => text,
            RawModelOutput::FragmentList(fragments) => {
                fragments.into_iter().filter_map(|f| f.text).collect()
            }
        }
    }
}

impl From<String> for RawModelOutput {
    fn from(text: String) -> Self {
        RawModelOutput::PlainText(text)
    }
}

impl From<&str> for RawModelOutput {
    fn from(text: &str) -> Self {
        RawModelOutput::PlainText(text.to_string())
    }
}

/// Removes a leading ```` ``` ```` / ```` ```json ```` fence and a trailing fence.
pub fn strip_markdown_fences(text: &str) -> String {
    let text = text.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }
    let without_leading = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE.replace(&without_leading, "").into_owned()
}

/// Drops a BOM and any commentary before the first `{`.
pub fn locate_first_object_start(text: &str) -> &str {
    let text = text.trim_start_matches('\u{feff}');
    match text.find('{') {
        Some(idx) => &text[idx..],
        None => text,
    }
}

/// Decodes a JSON object out of a model reply.
///
/// Tries the cleaned text as a whole first, then the first greedy `{...}`
/// span. Fails with `BadUpstreamResponse` when neither decodes to an object.
pub fn decode_json(raw: impl Into<RawModelOutput>) -> Result<Map<String, Value>> {
    let text = raw.into().into_text();
    let stripped = strip_markdown_fences(&text);
    let cleaned = locate_first_object_start(&stripped);

    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(_) => {
            let span = GREEDY_OBJECT.find(cleaned).ok_or_else(|| {
                GenError::bad_upstream("Model did not return valid JSON", cleaned)
            })?;
            serde_json::from_str::<Value>(span.as_str()).map_err(|e| {
                GenError::bad_upstream(format!("JSON parse failed: {}", e), cleaned)
            })?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(GenError::bad_upstream("Model returned JSON that is not an object", cleaned)),
    }
}

/// Returns the trimmed text between the first `start` marker and the next `end` marker.
pub fn extract_delimited(text: &str, start: &str, end: &str) -> Result<String> {
    let start_idx = text
        .find(start)
        .ok_or_else(|| GenError::bad_upstream("Start marker not found in model output", text))?;
    let body_start = start_idx + start.len();
    let body_len = text[body_start..]
        .find(end)
        .ok_or_else(|| GenError::bad_upstream("End marker not found in model output", text))?;
    Ok(text[body_start..body_start + body_len].trim().to_string())
}

/// Prepends `from under_test import <symbol>` unless the module already imports from it.
pub fn ensure_import_present(tests_py: &str, symbol: &str) -> String {
    if tests_py.contains(&format!("from {} import ", SOURCE_MODULE)) {
        return tests_py.to_string();
    }
    format!("from {} import {}\n{}", SOURCE_MODULE, symbol, tests_py)
}

/// Fields a JSON-mode reply is expected to carry.
#[derive(Debug, Default, Deserialize)]
pub struct TestPayload {
    #[serde(default)]
    pub tests_b64: Option<String>,
    #[serde(default)]
    pub tests_py: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl TestPayload {
    pub fn from_object(object: Map<String, Value>) -> Result<Self> {
        let raw = Value::Object(object);
        serde_json::from_value(raw.clone())
            .map_err(|e| GenError::bad_upstream(format!("Unexpected payload shape: {}", e), &raw.to_string()))
    }

    /// Returns the test module and rationale. `tests_b64` wins over `tests_py`.
    pub fn into_module(self) -> Result<(String, String)> {
        let rationale = self.rationale.unwrap_or_default();

        let decoded = self.tests_b64.as_deref().and_then(|b64| {
            let bytes = STANDARD.decode(b64.trim()).ok()?;
            String::from_utf8(bytes).ok()
        });

        match decoded.or(self.tests_py) {
            Some(module) if !module.trim().is_empty() => Ok((module, rationale)),
            _ => Err(GenError::bad_upstream(
                "Model JSON carried neither usable tests_b64 nor tests_py",
                &rationale,
            )),
        }
    }
}
