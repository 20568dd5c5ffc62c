use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracko_storage::DEFAULT_BUS_CAPACITY;

const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Runtime settings, read from `TRACKO_*` environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    /// SQLite url; the seeded in-memory store is used when absent.
    pub database_url: Option<String>,
    pub nlp_config_path: Option<PathBuf>,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub allowed_origins: Vec<String>,
    pub bus_capacity: u32,
    pub deepseek_api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database_url: None,
            nlp_config_path: None,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 120,
            allowed_origins: Vec::new(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            deepseek_api_key: None,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            bind: non_empty("TRACKO_BIND").unwrap_or(defaults.bind),
            database_url: non_empty("TRACKO_DATABASE_URL"),
            nlp_config_path: non_empty("TRACKO_NLP_CONFIG").map(PathBuf::from),
            rate_limit_window: non_empty("TRACKO_RATE_LIMIT_WINDOW_SECONDS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: non_empty("TRACKO_RATE_LIMIT_MAX")
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(defaults.rate_limit_max),
            allowed_origins: non_empty("TRACKO_ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or_default(),
            bus_capacity: non_empty("TRACKO_BUS_CAPACITY")
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.bus_capacity),
            deepseek_api_key: non_empty("DEEPSEEK_API_KEY"),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
