// Process configuration, read once from the environment at boot

use crate::types::DEFAULT_TIMEOUT_MS;
use thiserror::Error;

pub const DEFAULT_PISTON_URL: &str = "https://emkc.org/api/v2/piston";
pub const DEFAULT_JUDGE0_HOST: &str = "https://judge0-ce.p.rapidapi.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub frontend_url: Option<String>,
    pub redis_url: Option<String>,
    /// `None` when Fallback A was explicitly disabled with an empty `PISTON_URL`
    pub piston_url: Option<String>,
    pub piston_api_key: Option<String>,
    pub judge0_host: String,
    pub judge0_url: Option<String>,
    pub judge0_api_key: Option<String>,
    pub execution_timeout_ms: u64,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    pub trust_proxy: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            frontend_url: None,
            redis_url: None,
            piston_url: Some(DEFAULT_PISTON_URL.to_string()),
            piston_api_key: None,
            judge0_host: DEFAULT_JUDGE0_HOST.to_string(),
            judge0_url: None,
            judge0_api_key: None,
            execution_timeout_ms: DEFAULT_TIMEOUT_MS,
            rate_limit_max: 10,
            rate_limit_window_ms: 60_000,
            trust_proxy: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let piston_url = match lookup("PISTON_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url.trim_end_matches('/').to_string()),
            None => defaults.piston_url,
        };

        Ok(Self {
            port: parse_number(&lookup, "PORT", defaults.port)?,
            frontend_url: non_empty("FRONTEND_URL"),
            redis_url: non_empty("REDIS_URL"),
            piston_url,
            piston_api_key: non_empty("PISTON_API_KEY"),
            judge0_host: non_empty("JUDGE0_HOST")
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or(defaults.judge0_host),
            judge0_url: non_empty("JUDGE0_URL").map(|u| u.trim_end_matches('/').to_string()),
            judge0_api_key: non_empty("JUDGE0_API_KEY"),
            execution_timeout_ms: parse_number(
                &lookup,
                "EXECUTION_TIMEOUT_MS",
                defaults.execution_timeout_ms,
            )?,
            rate_limit_max: parse_number(&lookup, "RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            rate_limit_window_ms: parse_number(
                &lookup,
                "RATE_LIMIT_WINDOW_MS",
                defaults.rate_limit_window_ms,
            )?,
            trust_proxy: lookup("TRUST_PROXY")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.trust_proxy),
        })
    }

    /// Fallback B needs either a RapidAPI key or a self-hosted URL
    pub fn judge0_configured(&self) -> bool {
        self.judge0_api_key.is_some() || self.judge0_url.is_some()
    }

    /// Base URL Fallback B talks to; a self-hosted URL wins over the RapidAPI host
    pub fn judge0_base_url(&self) -> &str {
        self.judge0_url.as_deref().unwrap_or(&self.judge0_host)
    }
}

fn parse_number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rate_limit_max, 10);
        assert_eq!(config.rate_limit_window_ms, 60_000);
        assert!(!config.judge0_configured());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("FRONTEND_URL", "https://ide.example.com"),
            ("PISTON_URL", "http://piston.local/api/v2/"),
            ("JUDGE0_API_KEY", "secret"),
            ("RATE_LIMIT_MAX", "3"),
            ("TRUST_PROXY", "true"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.frontend_url.as_deref(), Some("https://ide.example.com"));
        assert_eq!(config.piston_url.as_deref(), Some("http://piston.local/api/v2"));
        assert!(config.judge0_configured());
        assert_eq!(config.judge0_base_url(), DEFAULT_JUDGE0_HOST);
        assert_eq!(config.rate_limit_max, 3);
        assert!(config.trust_proxy);
    }

    #[test]
    fn test_empty_piston_url_disables_fallback_a() {
        let config = config_from(&[("PISTON_URL", "")]).unwrap();
        assert_eq!(config.piston_url, None);
    }

    #[test]
    fn test_self_hosted_judge0_counts_as_configured() {
        let config = config_from(&[("JUDGE0_URL", "http://judge0:2358/")]).unwrap();
        assert!(config.judge0_configured());
        assert_eq!(config.judge0_base_url(), "http://judge0:2358");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = config_from(&[("EXECUTION_TIMEOUT_MS", "soon")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                name: "EXECUTION_TIMEOUT_MS",
                value: "soon".to_string()
            }
        );
    }
}
