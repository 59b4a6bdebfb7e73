use crate::access::RetryPolicy;
use crate::core::{OrmError, Result};
use crate::dialect::Capabilities;
use serde::{Deserialize, Serialize};

pub const ENV_URL: &str = "RUSTMEMORM_URL";
pub const ENV_MAX_RETRIES: &str = "RUSTMEMORM_MAX_DEADLOCK_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "RUSTMEMORM_DEADLOCK_RETRY_DELAY_MS";

fn default_retry_delay_unit_ms() -> u64 {
    1
}

/// Access layer configuration
///
/// Names the database, optionally pins its dialect, and sets the retry
/// policy of every `Access` built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrmConfig {
    /// Connection URL, also used to pick the dialect
    pub url: String,

    /// Dialect name; takes precedence over the URL when set
    #[serde(default)]
    pub dialect: Option<String>,

    /// Batch resubmissions after a row count mismatch
    #[serde(default)]
    pub max_retries: u32,

    /// Base of the linear retry backoff in milliseconds
    #[serde(default = "default_retry_delay_unit_ms")]
    pub retry_delay_unit_ms: u64,

    /// Replaces the dialect's capability flags
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
}

impl OrmConfig {
    /// Create a new configuration for `url`
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            dialect: None,
            max_retries: 0,
            retry_delay_unit_ms: default_retry_delay_unit_ms(),
            capabilities: None,
        }
    }

    /// Pin the dialect by name
    pub fn dialect(mut self, name: &str) -> Self {
        self.dialect = Some(name.to_string());
        self
    }

    /// Set the number of retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the retry delay unit
    pub fn retry_delay_unit_ms(mut self, unit_ms: u64) -> Self {
        self.retry_delay_unit_ms = unit_ms;
        self
    }

    /// Override the dialect's capabilities
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay_unit_ms)
    }

    /// Read the configuration from the process environment
    ///
    /// Unset retry variables keep their defaults (0 retries, 1 ms unit).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup(ENV_URL)
            .ok_or_else(|| OrmError::Config(format!("{} is not set", ENV_URL)))?;
        let mut config = Self::new(&url);
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_number(ENV_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_DELAY_MS) {
            config.retry_delay_unit_ms = parse_number(ENV_RETRY_DELAY_MS, &raw)?;
        }
        Ok(config)
    }

    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| OrmError::Config(format!("Invalid configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| OrmError::Config(format!("Cannot serialize configuration: {}", err)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() && self.dialect.is_none() {
            return Err(OrmError::Config(
                "Either url or dialect must be set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| OrmError::Config(format!("{} must be a non-negative integer, got '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder_pattern() {
        let config = OrmConfig::new("jdbc:h2:mem:app")
            .dialect("h2")
            .max_retries(5)
            .retry_delay_unit_ms(3)
            .capabilities(Capabilities::TOTAL_ONLY);

        assert_eq!(config.dialect.as_deref(), Some("h2"));
        assert_eq!(config.retry_policy(), RetryPolicy::new(5, 3));
        assert_eq!(config.capabilities, Some(Capabilities::TOTAL_ONLY));
    }

    #[test]
    fn test_from_json_defaults() {
        let config = OrmConfig::from_json(r#"{"url": "jdbc:postgresql://db/app"}"#).unwrap();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_delay_unit_ms, 1);
        assert_eq!(config.dialect, None);
    }

    #[test]
    fn test_from_json_rejects_empty_target() {
        assert!(matches!(
            OrmConfig::from_json(r#"{"url": ""}"#),
            Err(OrmError::Config(_))
        ));
        assert!(OrmConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_URL, "rustmemorm:memory"),
            (ENV_MAX_RETRIES, "4"),
            (ENV_RETRY_DELAY_MS, "0"),
        ]
        .into_iter()
        .collect();
        let config = OrmConfig::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.retry_policy(), RetryPolicy::new(4, 0));

        let bad = OrmConfig::from_lookup(|name| match name {
            ENV_URL => Some("rustmemorm:memory".to_string()),
            ENV_MAX_RETRIES => Some("many".to_string()),
            _ => None,
        });
        assert!(matches!(bad, Err(OrmError::Config(_))));
    }

    #[test]
    fn test_json_round_trip_keeps_capabilities() {
        let config = OrmConfig::new("jdbc:oracle:thin:@db:1521:app").capabilities(Capabilities::NONE);
        let parsed = OrmConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
