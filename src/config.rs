// Configuration module for cqlint
// Reads from environment variables with sensible defaults

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// How per-node risk contributions are folded into the overall risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskAggregation {
    Mean,
    Max,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Graph store read-pool size (CQLINT_POOL_SIZE)
    pub pool_size: u32,

    /// Graph store read-pool minimum idle connections (CQLINT_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Batch orchestrator worker count (CQLINT_WORKERS)
    pub workers: usize,

    /// Batch statement count above which a batch is oversized (CQLINT_BATCH_THRESHOLD)
    pub batch_threshold: usize,

    /// Timeout for one external reasoning call in milliseconds (CQLINT_SEMANTIC_TIMEOUT_MS)
    pub semantic_timeout_ms: u64,

    /// Retry budget for the reasoning call (CQLINT_SEMANTIC_RETRIES)
    pub semantic_retries: u32,

    /// Fixed backoff between reasoning retries in milliseconds (CQLINT_SEMANTIC_BACKOFF_MS)
    pub semantic_backoff_ms: u64,

    /// Semantic classification cache capacity in entries (CQLINT_SEMANTIC_CACHE_CAPACITY)
    pub semantic_cache_capacity: u64,

    /// Per-file soft time limit in milliseconds (CQLINT_SOFT_LIMIT_MS)
    pub soft_limit_ms: u64,

    /// Per-file hard time limit in milliseconds (CQLINT_HARD_LIMIT_MS)
    pub hard_limit_ms: u64,

    /// Risk aggregation policy: mean or max (CQLINT_RISK_AGGREGATION)
    pub risk_aggregation: RiskAggregation,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_min_idle: 2,
            workers: 4,
            batch_threshold: 100,
            semantic_timeout_ms: 2_000,
            semantic_retries: 2,
            semantic_backoff_ms: 250,
            semantic_cache_capacity: 4_096,
            soft_limit_ms: 5_000,
            hard_limit_ms: 10_000,
            risk_aggregation: RiskAggregation::Mean,
        }
    }
}

macro_rules! parse_env {
    ($config:ident, $field:ident, $var:literal) => {
        if let Ok(val) = env::var($var) {
            if let Ok(parsed) = val.parse() {
                $config.$field = parsed;
            } else {
                eprintln!(
                    "cqlint: Warning: Invalid {} value: {}, using default: {:?}",
                    $var, val, $config.$field
                );
            }
        }
    };
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        parse_env!(config, pool_size, "CQLINT_POOL_SIZE");
        parse_env!(config, pool_min_idle, "CQLINT_POOL_MIN_IDLE");
        parse_env!(config, workers, "CQLINT_WORKERS");
        parse_env!(config, batch_threshold, "CQLINT_BATCH_THRESHOLD");
        parse_env!(config, semantic_timeout_ms, "CQLINT_SEMANTIC_TIMEOUT_MS");
        parse_env!(config, semantic_retries, "CQLINT_SEMANTIC_RETRIES");
        parse_env!(config, semantic_backoff_ms, "CQLINT_SEMANTIC_BACKOFF_MS");
        parse_env!(
            config,
            semantic_cache_capacity,
            "CQLINT_SEMANTIC_CACHE_CAPACITY"
        );
        parse_env!(config, soft_limit_ms, "CQLINT_SOFT_LIMIT_MS");
        parse_env!(config, hard_limit_ms, "CQLINT_HARD_LIMIT_MS");

        if let Ok(val) = env::var("CQLINT_RISK_AGGREGATION") {
            match val.to_ascii_lowercase().as_str() {
                "mean" => config.risk_aggregation = RiskAggregation::Mean,
                "max" => config.risk_aggregation = RiskAggregation::Max,
                other => eprintln!(
                    "cqlint: Warning: Invalid CQLINT_RISK_AGGREGATION value: {}, using default: mean",
                    other
                ),
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.pool_min_idle, 2);
        assert_eq!(config.workers, 4);
        assert_eq!(config.batch_threshold, 100);
        assert_eq!(config.semantic_retries, 2);
        assert_eq!(config.risk_aggregation, RiskAggregation::Mean);
    }
}
