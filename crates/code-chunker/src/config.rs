use serde::{Deserialize, Serialize};

/// Maximum distance (in bytes) a chunk end may be moved to reach a boundary
pub const DEFAULT_BOUNDARY_SEARCH_RADIUS: usize = 2000;

/// Configuration for chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Target chunk size in tokens (soft limit)
    pub target_chunk_tokens: usize,

    /// Maximum chunk size in tokens (hard limit)
    pub max_chunk_tokens: usize,

    /// Minimum chunk size in tokens (avoid tiny fragments)
    pub min_chunk_tokens: usize,

    /// Tokens repeated from the end of a chunk at the start of the next one
    pub overlap_tokens: usize,

    /// Snap chunk ends to detected structural boundaries
    pub semantic_boundaries: bool,

    /// How far from the naive end offset a boundary may be, in bytes
    pub boundary_search_radius: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_chunk_tokens: 20_000,
            max_chunk_tokens: 25_000,
            min_chunk_tokens: 5_000,
            overlap_tokens: 200,
            semantic_boundaries: true,
            boundary_search_radius: DEFAULT_BOUNDARY_SEARCH_RADIUS,
        }
    }
}

impl ChunkerConfig {
    /// Build a config with explicit sizes and the remaining defaults
    pub fn with_sizes(target: usize, max: usize, min: usize) -> Self {
        Self {
            target_chunk_tokens: target,
            max_chunk_tokens: max,
            min_chunk_tokens: min,
            ..Default::default()
        }
    }

    /// Shrink the config so one chunk plus `reserved_tokens` of prompt fits in `token_budget`.
    ///
    /// Sizes that already fit are left untouched.
    #[must_use]
    pub fn fit_to_budget(mut self, token_budget: usize, reserved_tokens: usize) -> Self {
        let available = token_budget.saturating_sub(reserved_tokens).max(1);
        if self.max_chunk_tokens <= available {
            return self;
        }

        self.max_chunk_tokens = available;
        self.target_chunk_tokens = self.target_chunk_tokens.min(available * 4 / 5).max(1);
        self.min_chunk_tokens = self.min_chunk_tokens.min(self.target_chunk_tokens / 4);
        self.overlap_tokens = self
            .overlap_tokens
            .min(self.min_chunk_tokens.saturating_sub(1));
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_tokens == 0 {
            return Err("max_chunk_tokens must be > 0".to_string());
        }

        if self.min_chunk_tokens > self.target_chunk_tokens {
            return Err(format!(
                "min_chunk_tokens ({}) cannot exceed target_chunk_tokens ({})",
                self.min_chunk_tokens, self.target_chunk_tokens
            ));
        }

        if self.target_chunk_tokens > self.max_chunk_tokens {
            return Err(format!(
                "target_chunk_tokens ({}) cannot exceed max_chunk_tokens ({})",
                self.target_chunk_tokens, self.max_chunk_tokens
            ));
        }

        if self.overlap_tokens > 0 && self.overlap_tokens >= self.min_chunk_tokens {
            return Err(format!(
                "overlap_tokens ({}) must be smaller than min_chunk_tokens ({})",
                self.overlap_tokens, self.min_chunk_tokens
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ChunkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_chunk_tokens, 20_000);
        assert_eq!(config.max_chunk_tokens, 25_000);
        assert_eq!(config.min_chunk_tokens, 5_000);
        assert_eq!(config.overlap_tokens, 200);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChunkerConfig::default();

        // Invalid: min > target
        config.min_chunk_tokens = 1000;
        config.target_chunk_tokens = 500;
        assert!(config.validate().is_err());

        // Invalid: target > max
        config.min_chunk_tokens = 50;
        config.overlap_tokens = 10;
        config.target_chunk_tokens = 2000;
        config.max_chunk_tokens = 1000;
        assert!(config.validate().is_err());

        // Invalid: max = 0
        config.max_chunk_tokens = 0;
        assert!(config.validate().is_err());

        // Invalid: overlap swallows the minimum chunk
        config.target_chunk_tokens = 512;
        config.max_chunk_tokens = 1024;
        config.overlap_tokens = 50;
        assert!(config.validate().is_err());

        // Valid configuration
        config.overlap_tokens = 20;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fit_to_budget_shrinks_oversized_config() {
        let config = ChunkerConfig::default().fit_to_budget(8_000, 1_000);
        assert_eq!(config.max_chunk_tokens, 7_000);
        assert!(config.target_chunk_tokens <= 5_600);
        assert!(config.validate().is_ok(), "{config:?}");
    }

    #[test]
    fn test_fit_to_budget_keeps_fitting_config() {
        let config = ChunkerConfig::default();
        assert_eq!(config.clone().fit_to_budget(128_000, 1_000), config);
    }

    #[test]
    fn test_deserialize_partial_toml_like_json() {
        let config: ChunkerConfig =
            serde_json::from_str(r#"{"target_chunk_tokens": 1000, "max_chunk_tokens": 1200, "min_chunk_tokens": 300}"#)
                .unwrap();
        assert_eq!(config.overlap_tokens, 200);
        assert!(config.semantic_boundaries);
        assert!(config.validate().is_ok());
    }
}
