// src/models.rs
use serde::{Deserialize, Serialize};

use crate::prompt::SizePreset;

/// Where generated tests are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestsMode {
    /// `tests/generated/test_<symbol>.py`
    #[default]
    PerSymbol,
    /// `tests/generated/test_generated.py`
    Single,
}

/// Reply format requested from the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Plain text between `<<<PYTEST_START>>>` / `<<<PYTEST_END>>>`.
    #[default]
    Markers,
    /// `{"tests_b64": ..., "tests_py": ..., "rationale": ...}`
    Json,
}

fn default_module_path() -> String {
    "under_test.py".to_string()
}

fn default_cleanup_old() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundleRequest {
    pub code: String,
    pub spec: String,
    #[serde(default)]
    pub size: SizePreset,
    #[serde(default)]
    pub style_hints: Vec<String>,
    #[serde(default = "default_module_path")]
    pub module_path: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub tests_mode: TestsMode,
    #[serde(default = "default_cleanup_old")]
    pub cleanup_old: bool,
    #[serde(default)]
    pub format: ResponseFormat,
}

impl BundleRequest {
    /// A request with every optional field at its default.
    pub fn new(code: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            spec: spec.into(),
            size: SizePreset::default(),
            style_hints: Vec::new(),
            module_path: default_module_path(),
            symbol: None,
            tests_mode: TestsMode::default(),
            cleanup_old: default_cleanup_old(),
            format: ResponseFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleResponse {
    pub code_path: String,
    pub tests_path: String,
    pub symbol: String,
    pub rationale: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateTextRequest {
    pub code: String,
    pub spec: String,
    #[serde(default)]
    pub size: SizePreset,
    #[serde(default)]
    pub style_hints: Vec<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub code_path: String,
    pub tests_path: String,
    pub symbol: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub code_path: Option<String>,
    #[serde(default)]
    pub tests_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub tests_path: String,
    pub exit_code: i32,
    pub output: String,
}

impl RunOutcome {
    /// Process exit status for the CLI. Codes outside 0..=255 (a runner
    /// killed by a signal reports -1) become 1, so they never read as a pass.
    pub fn exit_status(&self) -> u8 {
        u8::try_from(self.exit_code).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_request_defaults() {
        let req: BundleRequest = serde_json::from_value(json!({
            "code": "def f(): pass",
            "spec": "n/a"
        }))
        .unwrap();

        assert_eq!(req.size, SizePreset::Std);
        assert_eq!(req.module_path, "under_test.py");
        assert_eq!(req.tests_mode, TestsMode::PerSymbol);
        assert!(req.cleanup_old);
        assert_eq!(req.format, ResponseFormat::Markers);
        assert!(req.symbol.is_none());
    }

    #[test]
    fn test_bundle_request_rejects_unknown_size() {
        let res: Result<BundleRequest, _> = serde_json::from_value(json!({
            "code": "def f(): pass",
            "spec": "n/a",
            "size": "huge"
        }));
        assert!(res.is_err());
    }

    fn outcome(exit_code: i32) -> RunOutcome {
        RunOutcome {
            run_id: "run".to_string(),
            tests_path: "tests/generated/test_f.py".to_string(),
            exit_code,
            output: String::new(),
        }
    }

    #[test]
    fn test_exit_status_never_turns_failure_into_success() {
        assert_eq!(outcome(0).exit_status(), 0);
        assert_eq!(outcome(1).exit_status(), 1);
        assert_eq!(outcome(5).exit_status(), 5);
        assert_eq!(outcome(-1).exit_status(), 1);
        assert_eq!(outcome(300).exit_status(), 1);
    }

    #[test]
    fn test_tests_mode_wire_names() {
        let req: BundleRequest = serde_json::from_value(json!({
            "code": "", "spec": "", "tests_mode": "single", "format": "json"
        }))
        .unwrap();
        assert_eq!(req.tests_mode, TestsMode::Single);
        assert_eq!(req.format, ResponseFormat::Json);
    }
}
