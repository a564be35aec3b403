// src/config.rs
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{GenError, Result};
use crate::providers::CompletionOptions;
use crate::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://api.mistral.ai";
pub const DEFAULT_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_FALLBACK_MODEL: &str = "mistral-medium-latest";

/// Connection details for the Mistral API.
#[derive(Debug, Clone)]
pub struct MistralConfig {
    pub api_base: String,
    pub api_key: String,
}

/// How generated tests are executed.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Program and leading arguments; the tests directory is appended.
    pub command: Vec<String>,
    pub timeout: Duration,
    /// How much of stdout/stderr the HTTP run response keeps.
    pub output_tail_chars: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string(), "-q".to_string()],
            timeout: Duration::from_secs(10),
            output_tail_chars: 4000,
        }
    }
}

/// Application configuration, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mistral: Option<MistralConfig>,
    pub model: String,
    pub fallback_model: String,
    pub stub_mode: bool,
    pub run_enabled: bool,
    pub workspace_root: PathBuf,
    pub runner: RunnerConfig,
    pub retry: RetryPolicy,
    pub completion: CompletionOptions,
}

/// Optional TOML file; every value can still be overridden from the environment.
///
/// ```toml
/// model = "mistral-large-latest"
/// workspace_root = "/srv/spec2test"
///
/// [runner]
/// command = ["python", "-m", "pytest", "-q"]
/// timeout_secs = 20
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub runner: RunnerSection,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_sources(FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Load a TOML file, then apply environment overrides on top.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_sources(FileConfig::from_path(path)?, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from a file layer and a variable lookup.
    pub fn from_sources(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let stub_mode = lookup("STUB_GEN").as_deref() == Some("1");
        let run_enabled = lookup("ENABLE_RUN").as_deref() == Some("1");

        let api_base = lookup("MISTRAL_API_BASE")
            .or(file.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let mistral = lookup("MISTRAL_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| MistralConfig { api_base, api_key });

        if !stub_mode && mistral.is_none() {
            return Err(GenError::Config(
                "Set MISTRAL_API_KEY in .env or env vars (not required when STUB_GEN=1).".to_string(),
            ));
        }

        let model = lookup("MISTRAL_MODEL")
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let fallback_model = lookup("MISTRAL_FALLBACK_MODEL")
            .or(file.fallback_model)
            .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string());
        let workspace_root = lookup("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .or(file.workspace_root)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut runner = RunnerConfig::default();
        if let Some(command) = lookup("PYTEST_CMD")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .or(file.runner.command)
        {
            if command.is_empty() {
                return Err(GenError::Config("PYTEST_CMD must name a program".to_string()));
            }
            runner.command = command;
        }
        let timeout_secs = match lookup("RUN_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                GenError::Config(format!("RUN_TIMEOUT_SECS must be a whole number, got '{}'", raw))
            })?),
            None => file.runner.timeout_secs,
        };
        if let Some(secs) = timeout_secs {
            runner.timeout = Duration::from_secs(secs);
        }

        let mut completion = CompletionOptions::default();
        if let Some(max_tokens) = file.max_tokens {
            completion.max_tokens = max_tokens;
        }

        Ok(AppConfig {
            mistral,
            model,
            fallback_model,
            stub_mode,
            run_enabled,
            workspace_root,
            runner,
            retry: RetryPolicy::default(),
            completion,
        })
    }

    /// Directory holding `conftest.py` and the generated tests directory.
    pub fn tests_root(&self) -> PathBuf {
        self.workspace_root.join("tests")
    }

    /// Directory generated test modules are written to.
    pub fn generated_dir(&self) -> PathBuf {
        self.tests_root().join("generated")
    }

    /// Resolves a caller-supplied path against the workspace root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_api_key() {
        let config = AppConfig::from_sources(FileConfig::default(), lookup_from(&[("MISTRAL_API_KEY", "k")])).unwrap();

        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.fallback_model, DEFAULT_FALLBACK_MODEL);
        assert_eq!(config.mistral.as_ref().unwrap().api_base, DEFAULT_API_BASE);
        assert!(!config.stub_mode);
        assert!(!config.run_enabled);
        assert_eq!(config.runner.command, vec!["pytest", "-q"]);
        assert_eq!(config.runner.timeout, Duration::from_secs(10));
        assert_eq!(config.generated_dir(), PathBuf::from("./tests/generated"));
    }

    #[test]
    fn test_missing_key_requires_stub_mode() {
        let err = AppConfig::from_sources(FileConfig::default(), lookup_from(&[])).unwrap_err();
        assert!(matches!(err, GenError::Config(_)));

        let config = AppConfig::from_sources(FileConfig::default(), lookup_from(&[("STUB_GEN", "1")])).unwrap();
        assert!(config.stub_mode);
        assert!(config.mistral.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            model = "from-file"
            fallback_model = "fallback-from-file"
            workspace_root = "/srv/work"

            [runner]
            command = ["python", "-m", "pytest"]
            timeout_secs = 30
            "#,
        )
        .unwrap();

        let config = AppConfig::from_sources(
            file,
            lookup_from(&[
                ("STUB_GEN", "1"),
                ("ENABLE_RUN", "1"),
                ("MISTRAL_MODEL", "from-env"),
                ("RUN_TIMEOUT_SECS", "3"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model, "from-env");
        assert_eq!(config.fallback_model, "fallback-from-file");
        assert_eq!(config.workspace_root, PathBuf::from("/srv/work"));
        assert_eq!(config.runner.command, vec!["python", "-m", "pytest"]);
        assert_eq!(config.runner.timeout, Duration::from_secs(3));
        assert!(config.run_enabled);
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        let err = AppConfig::from_sources(
            FileConfig::default(),
            lookup_from(&[("STUB_GEN", "1"), ("RUN_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, GenError::Config(_)));
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"blue\"").is_err());
    }
}
