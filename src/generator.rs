// src/generator.rs
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{GenError, Result};
use crate::extract::{
    PYTEST_END, PYTEST_START, SOURCE_MODULE, TestPayload, decode_json, ensure_import_present,
    extract_delimited,
};
use crate::models::{
    BundleRequest, BundleResponse, GenerateTextRequest, ResponseFormat, RunOutcome, RunRequest,
    RunResponse, TestsMode,
};
use crate::prompt::{self, SizePreset};
use crate::providers::{ChatMessage, LlmProvider};
use crate::retry::{Sleeper, chat_with_fallback};
use crate::sandbox::{self, tail};

/// Path-setup file kept next to `tests/generated/` so pytest finds the source module.
pub const WORKSPACE_CONFTEST: &str = "import sys, pathlib\n\
ROOT = pathlib.Path(__file__).resolve().parents[1]\n\
if str(ROOT) not in sys.path:\n    sys.path.insert(0, str(ROOT))\n";

const MARKERS_RATIONALE: &str =
    "Generated via raw-text markers; floats use pytest.approx; imports from under_test.py.";

/// Ties the configuration to a model provider for one request.
pub struct Generator<'a> {
    config: &'a AppConfig,
    provider: &'a dyn LlmProvider,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a AppConfig, provider: &'a dyn LlmProvider, sleeper: &'a dyn Sleeper) -> Self {
        Self { config, provider, sleeper }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let output = chat_with_fallback(
            self.provider,
            &self.config.model,
            &self.config.fallback_model,
            messages,
            &self.config.completion,
            &self.config.retry,
            self.sleeper,
        )
        .await?;
        Ok(output.into_text())
    }

    /// Asks for a marker-delimited pytest module and returns the text between the markers.
    pub async fn tests_text(&self, symbol: &str, spec: &str) -> Result<String> {
        let text = self.chat(&prompt::raw_messages(symbol, spec)).await?;
        extract_delimited(&text, PYTEST_START, PYTEST_END)
    }

    /// Asks for a JSON payload and returns `(module, rationale)`.
    pub async fn tests_json(
        &self,
        symbol: &str,
        spec: &str,
        size: SizePreset,
        hints: &[String],
    ) -> Result<(String, String)> {
        let text = self.chat(&prompt::json_messages(symbol, spec, size, hints)).await?;
        TestPayload::from_object(decode_json(text)?)?.into_module()
    }

    /// Writes the source module, generates tests for it and saves them under
    /// `tests/generated/`.
    pub async fn generate_and_save(&self, req: &BundleRequest) -> Result<BundleResponse> {
        let symbol = requested_symbol(req.symbol.as_deref())?
            .or_else(|| prompt::detect_symbol_name(&req.code))
            .ok_or(GenError::SymbolNotDetected)?;

        let code_path = self.config.resolve(&req.module_path);
        write_file(&code_path, &req.code)?;

        log::info!("🎯 Generating tests for '{}' ({:?} format)", symbol, req.format);

        let (tests_py, rationale) = match req.format {
            ResponseFormat::Markers => (
                self.tests_text(&symbol, &req.spec).await?,
                MARKERS_RATIONALE.to_string(),
            ),
            ResponseFormat::Json => {
                self.tests_json(&symbol, &req.spec, req.size, &req.style_hints)
                    .await?
            }
        };
        let tests_py = ensure_import_present(&tests_py, &symbol);

        let gen_dir = self.config.generated_dir();
        std::fs::create_dir_all(&gen_dir)?;

        let tests_path = match req.tests_mode {
            TestsMode::PerSymbol => {
                let path = gen_dir.join(format!("test_{}.py", symbol));
                if req.cleanup_old {
                    remove_other_test_modules(&gen_dir, &path);
                }
                path
            }
            TestsMode::Single => gen_dir.join("test_generated.py"),
        };

        let conftest = self.config.tests_root().join("conftest.py");
        if !conftest.exists() {
            std::fs::write(&conftest, WORKSPACE_CONFTEST)?;
        }

        std::fs::write(&tests_path, tests_py)?;
        log::info!("💾 Saved tests to {}", tests_path.display());

        Ok(BundleResponse {
            code_path: code_path.display().to_string(),
            tests_path: tests_path.display().to_string(),
            symbol,
            rationale,
            generated_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Generates and saves tests, then runs them in the sandbox.
    pub async fn generate_and_run(&self, req: &BundleRequest) -> Result<RunResponse> {
        ensure_run_enabled(self.config)?;

        let saved = self.generate_and_save(req).await?;
        let run_id = Uuid::new_v4().to_string();
        log::info!("▶️  Run {} for '{}'", run_id, saved.symbol);

        let result = sandbox::run_tests(
            &self.config.runner,
            Path::new(&saved.code_path),
            Some(Path::new(&saved.tests_path)),
            &self.config.generated_dir(),
        )
        .await?;

        let limit = self.config.runner.output_tail_chars;
        Ok(RunResponse {
            run_id,
            code_path: saved.code_path,
            tests_path: saved.tests_path,
            symbol: saved.symbol,
            exit_code: result.exit_code,
            stdout: tail(&result.stdout, limit),
            stderr: tail(&result.stderr, limit),
        })
    }

    /// Generates a test module and returns it as text. The source is still
    /// written to `under_test.py` so the module can be run later.
    pub async fn generate_text(&self, req: &GenerateTextRequest) -> Result<String> {
        let symbol = requested_symbol(req.symbol.as_deref())?
            .or_else(|| prompt::detect_symbol_name(&req.code))
            .unwrap_or_else(|| "target".to_string());

        write_file(&self.config.resolve(format!("{}.py", SOURCE_MODULE)), &req.code)?;

        let tests_py = self.tests_text(&symbol, &req.spec).await?;
        Ok(ensure_import_present(&tests_py, &symbol))
    }
}

/// Runs an already generated test module (the newest one unless a path is given).
pub async fn run_existing(config: &AppConfig, req: &RunRequest) -> Result<RunOutcome> {
    ensure_run_enabled(config)?;

    let code_path = config.resolve(req.code_path.as_deref().unwrap_or("under_test.py"));
    let tests_path = match req.tests_path.as_deref() {
        Some(path) => config.resolve(path),
        None => sandbox::latest_generated_test(&config.generated_dir())?,
    };

    let run_id = Uuid::new_v4().to_string();
    log::info!("▶️  Run {} for {}", run_id, tests_path.display());

    let result = sandbox::run_tests(&config.runner, &code_path, Some(&tests_path), &config.generated_dir()).await?;

    Ok(RunOutcome {
        run_id,
        tests_path: tests_path.display().to_string(),
        exit_code: result.exit_code,
        output: result.combined_output,
    })
}

/// A caller-supplied symbol, trimmed. Blank counts as absent; anything that
/// is not a Python identifier is rejected before a file is touched.
fn requested_symbol(symbol: Option<&str>) -> Result<Option<String>> {
    match symbol.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) if prompt::is_python_identifier(s) => Ok(Some(s.to_string())),
        Some(s) => Err(GenError::InvalidSymbol(s.to_string())),
        None => Ok(None),
    }
}

pub fn ensure_run_enabled(config: &AppConfig) -> Result<()> {
    if config.run_enabled { Ok(()) } else { Err(GenError::RunDisabled) }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

fn remove_other_test_modules(gen_dir: &Path, keep: &Path) {
    let entries = match std::fs::read_dir(gen_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not list {} for cleanup: {}", gen_dir.display(), e);
            return;
        }
    };

    let stale: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| sandbox::is_test_module(path) && path.file_name() != keep.file_name())
        .collect();

    for path in stale {
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("🧹 Removed old test module {}", path.display()),
            Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}
