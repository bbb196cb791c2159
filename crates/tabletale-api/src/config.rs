//! Server configuration, read once from the environment.

use std::str::FromStr;
use std::time::Duration;

use tabletale_session::domain::state::DEFAULT_MAX_TURNS;
use tabletale_session::memory::DEFAULT_SESSION_TTL_SECS;

use crate::error::AppError;

/// Settings for the narrative generator endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeSettings {
    /// Chat completions URL.
    pub api_url: String,
    /// Bearer token; empty sends no auth.
    pub api_key: String,
    /// Model name sent with each request.
    pub model: String,
    /// Upper bound on one generator call.
    pub timeout: Duration,
}

/// Settings for the optional scene renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    /// Images endpoint URL.
    pub api_url: String,
    /// Bearer token; empty sends no auth.
    pub api_key: String,
}

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Durable snapshot database. Without it ended sessions are not kept.
    pub database_url: Option<String>,
    /// Session cache expiry.
    pub session_ttl: chrono::Duration,
    /// How often expired sessions are swept from memory.
    pub sweep_interval: Duration,
    /// Narrative generator.
    pub narrative: NarrativeSettings,
    /// Scene renderer, present only when enabled and configured.
    pub images: Option<ImageSettings>,
    /// Log entries sent to the generator.
    pub log_window: usize,
    /// Turn limit for sessions that do not set one.
    pub max_turns: u64,
    /// OTLP collector; tracing export is off without it.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = var("NARRATIVE_API_URL").ok_or_else(|| {
            AppError::Config("NARRATIVE_API_URL environment variable must be set".to_owned())
        })?;
        let api_key = var("NARRATIVE_API_KEY").unwrap_or_default();
        let narrative = NarrativeSettings {
            api_url,
            api_key: api_key.clone(),
            model: var("NARRATIVE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_owned()),
            timeout: Duration::from_secs(parse_or(&var, "NARRATIVE_TIMEOUT_SECS", 60)?),
        };

        let images = if parse_bool(&var, "IMAGE_GEN_ENABLED")? {
            let api_url = var("IMAGE_API_URL").ok_or_else(|| {
                AppError::Config("IMAGE_GEN_ENABLED requires IMAGE_API_URL".to_owned())
            })?;
            Some(ImageSettings {
                api_url,
                api_key: var("IMAGE_API_KEY").unwrap_or(api_key),
            })
        } else {
            None
        };

        let max_turns: u64 = parse_or(&var, "MAX_TURNS", DEFAULT_MAX_TURNS)?;
        let sweep_secs: u64 = parse_or(&var, "SWEEP_INTERVAL_SECS", 300)?;
        if sweep_secs == 0 {
            return Err(AppError::Config(
                "SWEEP_INTERVAL_SECS must be at least 1".to_owned(),
            ));
        }
        if max_turns == 0 {
            return Err(AppError::Config("MAX_TURNS must be at least 1".to_owned()));
        }

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&var, "PORT", 3000)?,
            database_url: var("DATABASE_URL"),
            session_ttl: chrono::Duration::seconds(parse_or(
                &var,
                "SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
            )?),
            sweep_interval: Duration::from_secs(sweep_secs),
            narrative,
            images,
            log_window: parse_or(&var, "LOG_WINDOW", 12)?,
            max_turns,
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw}): {e}"))),
    }
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, AppError> {
    match var(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no") => Ok(false),
        Some(v) => Err(AppError::Config(format!("{key} must be a boolean, got {v}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_the_generator_is_set() {
        let config = config_from(&[("NARRATIVE_API_URL", "http://llm.local/v1/chat")]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.database_url, None);
        assert_eq!(config.session_ttl, chrono::Duration::hours(24));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.narrative.timeout, Duration::from_secs(60));
        assert_eq!(config.narrative.api_key, "");
        assert_eq!(config.log_window, 12);
        assert_eq!(config.max_turns, 10);
        assert!(config.images.is_none());
    }

    #[test]
    fn test_missing_generator_url_is_a_config_error() {
        let result = config_from(&[("PORT", "8080")]);
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("NARRATIVE_API_URL")));
    }

    #[test]
    fn test_bad_port_is_a_config_error() {
        let result = config_from(&[
            ("NARRATIVE_API_URL", "http://llm.local"),
            ("PORT", "eighty"),
        ]);
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("PORT")));
    }

    #[test]
    fn test_enabled_images_inherit_the_narrative_key() {
        let config = config_from(&[
            ("NARRATIVE_API_URL", "http://llm.local"),
            ("NARRATIVE_API_KEY", "sk-test"),
            ("IMAGE_GEN_ENABLED", "yes"),
            ("IMAGE_API_URL", "http://img.local"),
        ])
        .unwrap();

        let images = config.images.unwrap();
        assert_eq!(images.api_url, "http://img.local");
        assert_eq!(images.api_key, "sk-test");
    }

    #[test]
    fn test_enabled_images_without_url_is_a_config_error() {
        let result = config_from(&[
            ("NARRATIVE_API_URL", "http://llm.local"),
            ("IMAGE_GEN_ENABLED", "true"),
        ]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected() {
        let result = config_from(&[
            ("NARRATIVE_API_URL", "http://llm.local"),
            ("SWEEP_INTERVAL_SECS", "0"),
        ]);
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("SWEEP_INTERVAL_SECS")));
    }

    #[test]
    fn test_zero_max_turns_is_rejected() {
        let result = config_from(&[("NARRATIVE_API_URL", "http://llm.local"), ("MAX_TURNS", "0")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
