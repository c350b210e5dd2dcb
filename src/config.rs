use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub openrouter_api_key: Option<String>,
    pub model: String,
    pub quality_threshold: f64,
    pub max_parallel_queries: usize,
    /// Deadline applied around each dispatched agent query. `None` waits
    /// indefinitely.
    pub query_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Self {
        let query_timeout = std::env::var("SCRIVENER_QUERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        Self {
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            model: std::env::var("SCRIVENER_MODEL")
                .unwrap_or_else(|_| "anthropic/claude-3-opus".to_string()),
            quality_threshold: std::env::var("SCRIVENER_QUALITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::router::DEFAULT_QUALITY_THRESHOLD),
            max_parallel_queries: std::env::var("SCRIVENER_MAX_PARALLEL_QUERIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::director::DEFAULT_MAX_PARALLEL_QUERIES),
            query_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            model: "anthropic/claude-3-opus".to_string(),
            quality_threshold: crate::router::DEFAULT_QUALITY_THRESHOLD,
            max_parallel_queries: crate::director::DEFAULT_MAX_PARALLEL_QUERIES,
            query_timeout: None,
        }
    }
}
