// src/api/state.rs
use reqwest::Client;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::{GenError, Result};
use crate::generator::Generator;
use crate::providers::{LlmProvider, mistral::MistralProvider, stub::StubProvider};
use crate::retry::{Sleeper, TokioSleeper};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub provider: Arc<dyn LlmProvider>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl AppState {
    /// Picks the stub provider in stub mode, the Mistral provider otherwise.
    pub fn new(config: AppConfig) -> Result<Self> {
        let provider: Arc<dyn LlmProvider> = if config.stub_mode {
            log::info!("🧪 STUB_GEN=1: generating tests without calling a model");
            Arc::new(StubProvider)
        } else {
            let mistral = config
                .mistral
                .clone()
                .ok_or_else(|| GenError::Config("MISTRAL_API_KEY is not set".to_string()))?;
            Arc::new(MistralProvider::new(Client::new(), mistral))
        };
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: AppConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn generator(&self) -> Generator<'_> {
        Generator::new(&self.config, self.provider.as_ref(), self.sleeper.as_ref())
    }
}
