// src/prompt.rs
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;

use crate::providers::ChatMessage;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid placeholder regex"));
static TOP_LEVEL_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:def|class)\s+([A-Za-z_]\w*)").expect("valid symbol regex")
});
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub const RAW_SYSTEM: &str = r#"
Return ONLY the pytest file content as plain text, between the markers:
<<<PYTEST_START>>>
... (pytest module text)
<<<PYTEST_END>>>

Rules:
- No JSON, no code fences, no commentary outside the markers.
- Use only pytest + Python stdlib.
- Use pytest.mark.parametrize where sensible.
- For floats: use pytest.approx.
- Import target as: from under_test import {{symbol}}
- Tests must be self-contained and runnable as tests/test_generated.py.
"#;

pub const RAW_USER: &str = r#"Write a pytest module that tests the callable {{symbol}} imported as:

from under_test import {{symbol}}

Human spec:
{{spec}}

Constraints:
- Do not modify the target code.
- Put ONLY the pytest file content between the markers.
<<<PYTEST_START>>>
<<<PYTEST_END>>>"#;

pub const JSON_SYSTEM: &str = r#"
You must output VALID JSON only with keys:
- "tests_b64": base64-encoded UTF-8 contents of a complete pytest module (preferred)
- "tests_py": plain string of the pytest module (optional, provided only if b64 is impossible)
- "rationale": short string

Rules:
- JSON only (no markdown fences).
- Use only pytest and the Python standard library.
- Prefer pytest.mark.parametrize where sensible.
- For floats, use pytest.approx (never exact == for 0.1+0.2).
- Do not mark str+str or list+list as invalid (Python allows those).
- If the spec forbids non-(int|float), include invalid cases expecting TypeError.
- No side-effects or file/network access in tests.
- Import the target with: from under_test import {{symbol}}
- Assume 'under_test.py' is at repo root; tests run from 'tests/'.
- Avoid extraneous characters before or after the JSON (no leading quotes, BOMs, or comments).
"#;

pub const JSON_USER: &str = r#"Target callable name: {{symbol}}

Write pytest tests for the callable imported as:
from under_test import {{symbol}}

Human spec:
{{spec}}

Size preset: {{size}}
Style hints: {{hints}}

Constraints:
- Do not modify the target code.
- The file must be directly runnable by pytest as tests/test_generated.py.
"#;

/// How large a test module to ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizePreset {
    Mini,
    #[default]
    Std,
    Max,
}

impl SizePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizePreset::Mini => "mini",
            SizePreset::Std => "std",
            SizePreset::Max => "max",
        }
    }
}

/// Replaces `{{key}}` placeholders with string values from `data`.
/// Unknown keys are left in place.
pub fn render_template(template: &str, data: &serde_json::Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            data.get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

/// Messages asking for a marker-delimited pytest module.
pub fn raw_messages(symbol: &str, spec: &str) -> Vec<ChatMessage> {
    let data = json!({ "symbol": symbol, "spec": spec.trim() });
    vec![
        ChatMessage::system(render_template(RAW_SYSTEM, &data)),
        ChatMessage::user(render_template(RAW_USER, &data)),
    ]
}

/// Messages asking for a `{tests_b64, tests_py, rationale}` JSON reply.
pub fn json_messages(symbol: &str, spec: &str, size: SizePreset, hints: &[String]) -> Vec<ChatMessage> {
    let hints = if hints.is_empty() { "none".to_string() } else { hints.join("; ") };
    let data = json!({
        "symbol": symbol,
        "spec": spec.trim(),
        "size": size.as_str(),
        "hints": hints,
    });
    vec![
        ChatMessage::system(render_template(JSON_SYSTEM, &data)),
        ChatMessage::user(render_template(JSON_USER, &data)),
    ]
}

/// Name of the first top-level `def` or `class` in a Python module.
pub fn detect_symbol_name(code: &str) -> Option<String> {
    TOP_LEVEL_SYMBOL.captures(code).map(|caps| caps[1].to_string())
}

/// Whether `name` can appear in `from under_test import <name>` and in a
/// `test_<name>.py` file name.
pub fn is_python_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template_keeps_unknown_placeholders() {
        let rendered = render_template("{{ symbol }} and {{missing}}", &json!({"symbol": "power"}));
        assert_eq!(rendered, "power and {{missing}}");
    }

    #[test]
    fn test_raw_messages() {
        let messages = raw_messages("power", "  Only ints/floats.\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("from under_test import power"));
        assert!(messages[1].content.contains("Human spec:\nOnly ints/floats.\n"));
        assert!(messages[1].content.ends_with("<<<PYTEST_START>>>\n<<<PYTEST_END>>>"));
    }

    #[test]
    fn test_json_messages_include_size_and_hints() {
        let messages = json_messages("mult", "n/a", SizePreset::Max, &["no strings".to_string()]);
        assert!(messages[0].content.contains("VALID JSON"));
        assert!(messages[1].content.contains("Size preset: max"));
        assert!(messages[1].content.contains("Style hints: no strings"));
    }

    #[test]
    fn test_detect_symbol_name() {
        assert_eq!(detect_symbol_name("def power(a, b):\n    return a ** b\n").as_deref(), Some("power"));
        assert_eq!(
            detect_symbol_name("import math\n\nclass Shape:\n    def area(self):\n        pass\n").as_deref(),
            Some("Shape")
        );
        assert_eq!(detect_symbol_name("    def nested():\n        pass\n"), None);
        assert_eq!(detect_symbol_name("x = 1\n"), None);
    }

    #[test]
    fn test_is_python_identifier() {
        assert!(is_python_identifier("power"));
        assert!(is_python_identifier("_Shape2"));
        assert!(!is_python_identifier("2fast"));
        assert!(!is_python_identifier("../escape"));
        assert!(!is_python_identifier("f\nimport os"));
        assert!(!is_python_identifier(""));
    }
}
