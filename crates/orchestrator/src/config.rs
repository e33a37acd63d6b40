use crate::error::{OrchestratorError, Result};
use crate::limits;
use corpus_chunker::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Files larger than this are skipped by the scanner
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB

/// Backend retry behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Orchestration settings, loadable from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub chunker: ChunkerConfig,

    /// Upper bound on files processed concurrently within a batch
    pub max_concurrent_tasks: usize,

    pub max_files_per_batch: usize,

    pub enable_sampling: bool,

    /// Corpus size (files) above which sampling applies
    pub sampling_threshold: usize,

    /// Number of files kept when sampling
    pub sample_cap: usize,

    /// Keep running after a failed step instead of halting
    pub skip_failed_steps: bool,

    /// Maximum tokens the backend accepts in one call
    pub backend_token_budget: usize,

    pub retry: RetryConfig,

    /// Per backend call
    pub step_timeout_ms: u64,

    /// Batches slower than this halve the concurrency of later batches
    pub batch_time_budget_ms: Option<u64>,

    pub max_file_size_bytes: u64,

    /// Entries kept by the file content cache
    pub content_cache_entries: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            max_concurrent_tasks: limits::default_concurrency(),
            max_files_per_batch: 100,
            enable_sampling: true,
            sampling_threshold: 1_000,
            sample_cap: 500,
            skip_failed_steps: true,
            backend_token_budget: 32_000,
            retry: RetryConfig::default(),
            step_timeout_ms: 120_000,
            batch_time_budget_ms: None,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            content_cache_entries: 256,
        }
    }
}

impl OrchestratorConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `CORPUS_PREP_*` environment overrides
    #[must_use]
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.max_concurrent_tasks = limits::parse_concurrency(
            lookup(limits::CONCURRENCY_ENV).as_deref(),
            self.max_concurrent_tasks,
        );
        self.max_files_per_batch = limits::parse_usize(
            lookup(limits::FILES_PER_BATCH_ENV).as_deref(),
            self.max_files_per_batch,
        );
        self.skip_failed_steps = limits::parse_bool(
            lookup(limits::SKIP_FAILED_ENV).as_deref(),
            self.skip_failed_steps,
        );
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker
            .validate()
            .map_err(OrchestratorError::InvalidConfig)?;

        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks must be > 0"));
        }
        if self.max_files_per_batch == 0 {
            return Err(invalid("max_files_per_batch must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be >= 1"));
        }
        if self.enable_sampling && self.sample_cap == 0 {
            return Err(invalid("sample_cap must be > 0 when sampling is enabled"));
        }
        if self.backend_token_budget == 0 {
            return Err(invalid("backend_token_budget must be > 0"));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn batch_time_budget(&self) -> Option<Duration> {
        self.batch_time_budget_ms.map(Duration::from_millis)
    }
}

fn invalid(msg: &str) -> OrchestratorError {
    OrchestratorError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.max_concurrent_tasks >= 1 && config.max_concurrent_tasks <= 32);
        assert_eq!(config.max_files_per_batch, 100);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = OrchestratorConfig::from_toml(
            r#"
max_files_per_batch = 10
skip_failed_steps = false

[chunker]
target_chunk_tokens = 1000
max_chunk_tokens = 1500
min_chunk_tokens = 300

[retry]
max_attempts = 5
"#,
        )
        .unwrap();

        assert_eq!(config.max_files_per_batch, 10);
        assert!(!config.skip_failed_steps);
        assert_eq!(config.chunker.max_chunk_tokens, 1500);
        assert_eq!(config.chunker.overlap_tokens, 200);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            OrchestratorConfig::from_toml("max_files_per_batch = \"lots\""),
            Err(OrchestratorError::ConfigParse(_))
        ));
    }

    #[test]
    fn env_overrides_parse_trim_and_clamp() {
        let env: HashMap<&str, &str> = HashMap::from([
            (limits::CONCURRENCY_ENV, " 999 "),
            (limits::FILES_PER_BATCH_ENV, "7"),
            (limits::SKIP_FAILED_ENV, "false"),
        ]);
        let config = OrchestratorConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_concurrent_tasks, 32);
        assert_eq!(config.max_files_per_batch, 7);
        assert!(!config.skip_failed_steps);
    }

    #[test]
    fn validation_rejects_zero_limits() {
        let config = OrchestratorConfig {
            max_files_per_batch: 0,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = OrchestratorConfig {
            retry: RetryConfig {
                max_attempts: 0,
                ..RetryConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
