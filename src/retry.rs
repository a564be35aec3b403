// src/retry.rs
use async_trait::async_trait;
use std::time::Duration;

use crate::errors::{GenError, Result};
use crate::extract::RawModelOutput;
use crate::providers::{ChatMessage, CompletionOptions, LlmProvider};

/// Exponential backoff applied around model calls only.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// Base delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=max_ms))
    }
}

/// Sleeps between attempts. Injected so tests don't wait on a real clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Calls `model` until it answers, retrying only on capacity signals.
pub async fn call_with_retries(
    provider: &dyn LlmProvider,
    model: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<RawModelOutput> {
    for attempt in 1..=policy.max_attempts {
        match provider.generate(model, messages, options).await {
            Ok(output) => return Ok(output),
            Err(e) if e.is_capacity_signal() => {
                if attempt == policy.max_attempts {
                    log::warn!("⏳ {} still throttled after {} attempts: {}", model, attempt, e);
                    break;
                }
                let delay = policy.base_delay(attempt - 1) + policy.jitter();
                log::warn!(
                    "⏳ {} throttled (attempt {}/{}), retrying in {}ms: {}",
                    model,
                    attempt,
                    policy.max_attempts,
                    delay.as_millis(),
                    e
                );
                sleeper.sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(GenError::UpstreamUnavailable {
        model: model.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Runs the retry loop against `primary`, then once more against `fallback`
/// if the primary never got through.
pub async fn chat_with_fallback(
    provider: &dyn LlmProvider,
    primary: &str,
    fallback: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<RawModelOutput> {
    match call_with_retries(provider, primary, messages, options, policy, sleeper).await {
        Err(GenError::UpstreamUnavailable { .. }) => {
            log::warn!("🔁 Falling back from {} to {}", primary, fallback);
            call_with_retries(provider, fallback, messages, options, policy, sleeper).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed script of results and records which models were asked.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<RawModelOutput>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<RawModelOutput>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(
            &self,
            model: &str,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<RawModelOutput> {
            self.calls.lock().unwrap().push(model.to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenError::ApiError { status: 429, body: "exhausted".into() }))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy { max_jitter: Duration::ZERO, ..RetryPolicy::default() }
    }

    fn throttled() -> Result<RawModelOutput> {
        Err(GenError::ApiError { status: 429, body: "Too Many Requests".into() })
    }

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let secs: Vec<u64> = (0..6).map(|i| policy.base_delay(i).as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.base_delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert!(policy.jitter() <= policy.max_jitter);
        }
        assert_eq!(no_jitter().jitter(), Duration::ZERO);
    }

    #[actix_rt::test]
    async fn test_retries_capacity_errors_then_succeeds() {
        let provider = ScriptedProvider::new(vec![throttled(), throttled(), Ok("done".into())]);
        let sleeper = RecordingSleeper::default();

        let out = call_with_retries(&provider, "large", &[], &CompletionOptions::default(), &no_jitter(), &sleeper)
            .await
            .unwrap();

        assert_eq!(out.into_text(), "done");
        assert_eq!(provider.calls().len(), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[actix_rt::test]
    async fn test_other_errors_are_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(GenError::ApiError {
            status: 401,
            body: "Unauthorized".into(),
        })]);
        let sleeper = RecordingSleeper::default();

        let err = chat_with_fallback(
            &provider,
            "large",
            "medium",
            &[],
            &CompletionOptions::default(),
            &no_jitter(),
            &sleeper,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenError::ApiError { status: 401, .. }));
        assert_eq!(provider.calls(), vec!["large".to_string()]);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_fallback_model_used_after_exhaustion() {
        let mut script: Vec<_> = (0..6).map(|_| throttled()).collect();
        script.push(Ok("from fallback".into()));
        let provider = ScriptedProvider::new(script);
        let sleeper = RecordingSleeper::default();

        let out = chat_with_fallback(
            &provider,
            "large",
            "medium",
            &[],
            &CompletionOptions::default(),
            &no_jitter(),
            &sleeper,
        )
        .await
        .unwrap();

        assert_eq!(out.into_text(), "from fallback");
        let calls = provider.calls();
        assert_eq!(calls.iter().filter(|m| *m == "large").count(), 6);
        assert_eq!(calls.last().map(String::as_str), Some("medium"));
    }

    #[actix_rt::test]
    async fn test_unavailable_after_both_models_exhausted() {
        let provider = ScriptedProvider::new(Vec::new());
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy { max_attempts: 2, ..no_jitter() };

        let err = chat_with_fallback(&provider, "large", "medium", &[], &CompletionOptions::default(), &policy, &sleeper)
            .await
            .unwrap_err();

        match err {
            GenError::UpstreamUnavailable { model, attempts } => {
                assert_eq!(model, "medium");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.calls(), vec!["large", "large", "medium", "medium"]);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }
}
