use std::str::FromStr;

use anyhow::{Context, Result};

use crate::drift::DriftLimits;
use crate::llm_client::DEFAULT_API_BASE;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub port: u16,
    pub rust_log: String,
    /// How long catalogued models are served before the provider is queried again.
    pub model_cache_days: i64,
    pub history_limit: i64,
    pub deviation_count: usize,
    pub drift_limits: DriftLimits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_api_base: std::env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            model_cache_days: parse_env("MODEL_CACHE_DAYS", 7)?,
            history_limit: parse_env("HISTORY_LIMIT", 10)?,
            deviation_count: parse_env("DEVIATION_COUNT", 5)?,
            drift_limits: DriftLimits {
                max_records: parse_env("DRIFT_MAX_RECORDS", DriftLimits::default().max_records)?,
                max_dimensions: parse_env(
                    "DRIFT_MAX_DIMENSIONS",
                    DriftLimits::default().max_dimensions,
                )?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_when_unset() {
        let value: u16 = parse_env("PROMPTR_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(value, 8080);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("PROMPTR_TEST_BAD_LIMIT", "ten");
        let result: Result<i64> = parse_env("PROMPTR_TEST_BAD_LIMIT", 10);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_env_reads_value() {
        std::env::set_var("PROMPTR_TEST_DEVIATIONS", "12");
        let value: usize = parse_env("PROMPTR_TEST_DEVIATIONS", 5).unwrap();
        assert_eq!(value, 12);
    }
}
