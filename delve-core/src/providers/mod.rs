//! Completion provider implementations.
//!
//! Currently ships a single concrete provider speaking the OpenAI Responses
//! API. Use `create_provider()` to instantiate it from config.

pub mod openai_responses;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use crate::config::RetryConfig;
pub use openai_responses::OpenAiResponsesProvider;

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs`),
/// `LlmError::Transport`, and `LlmError::Timeout`. Auth, malformed and parse
/// errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is retryable (transient).
fn is_retryable(err: &LlmError) -> bool {
    err.is_transport()
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    if let LlmError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs.saturating_mul(1000);
        return server_ms.max(compute_exponential_backoff(config, attempt));
    }
    compute_exponential_backoff(config, attempt)
}

/// Exponential backoff with optional jitter of up to 25%.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        let jitter = (capped as f64 * 0.25 * jitter_fraction()) as u64;
        capped + jitter
    } else {
        capped
    }
}

fn jitter_fraction() -> f64 {
    (uuid::Uuid::new_v4().as_u128() % 1000) as f64 / 1000.0
}

/// Resolve the API key: explicit config value first, then the environment.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    if let Some(key) = config.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        return Ok(key.clone());
    }
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| LlmError::AuthFailed {
            provider: format!("{}: env var '{}' not set", config.provider, config.api_key_env),
        })
}

/// Create a completion provider based on the configuration.
///
/// Every provider name routes to the Responses API client; `base_url` can
/// point it at any compatible endpoint.
pub fn create_provider(
    config: &LlmConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.provider != "openai" {
        tracing::warn!(
            provider = %config.provider,
            "Unknown provider, using the OpenAI Responses client"
        );
    }
    Ok(Arc::new(OpenAiResponsesProvider::new(config, retry.clone())?))
}
