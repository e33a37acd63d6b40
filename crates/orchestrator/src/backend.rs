//! The external analysis backend and the retry policy wrapped around it.

use crate::config::OrchestratorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl TokenUsage {
    pub const fn total(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

/// Classified backend failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("Rate limited by backend")]
    RateLimited,

    #[error("Backend server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend call cancelled")]
    Cancelled,
}

impl BackendError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Unavailable(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::MalformedResponse(_) | Self::Cancelled => false,
        }
    }
}

/// External analysis service invoked once per chunk
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str {
        "backend"
    }

    async fn invoke(&self, prompt: &str, token_budget: usize)
        -> Result<BackendResponse, BackendError>;
}

/// Successful call plus how many attempts it took
#[derive(Debug, Clone)]
pub struct RetriedResponse {
    pub response: BackendResponse,
    pub attempts: u32,
}

/// Final failure of a retried call plus how many attempts were made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    pub error: BackendError,
    pub attempts: u32,
}

/// Bounded retries with exponential backoff and a per-call timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry.base_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
            timeout: config.step_timeout(),
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn call(
        &self,
        backend: &dyn Backend,
        prompt: &str,
        token_budget: usize,
        cancel: &CancellationToken,
    ) -> Result<RetriedResponse, RetryFailure> {
        let mut attempt = 1;
        let fail = |error: BackendError, attempts: u32| RetryFailure { error, attempts };
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(BackendError::Cancelled),
                result = tokio::time::timeout(self.timeout, backend.invoke(prompt, token_budget)) => {
                    result.unwrap_or_else(|_| Err(BackendError::Timeout(self.timeout.as_millis() as u64)))
                }
            };

            match result {
                Ok(response) => {
                    return Ok(RetriedResponse {
                        response,
                        attempts: attempt,
                    })
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "{} call failed (attempt {attempt}/{}): {err}; retrying in {} ms",
                        backend.name(),
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(fail(BackendError::Cancelled, attempt)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(fail(err, attempt)),
            }
        }
    }
}
