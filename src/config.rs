//! TOML-based service configuration with environment overrides.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Top-level configuration parsed from TOML.
///
/// All fields have defaults, so an empty file (or no file) yields a working
/// configuration. Load with [`AppConfig::from_toml_file`], then layer
/// environment overrides with [`AppConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Upstream forecast API.
    #[serde(default)]
    pub carbon_api: CarbonApiConfig,
    /// Forecast cache behaviour.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Request limits and result shaping.
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream forecast API parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CarbonApiConfig {
    /// Base URL of the Carbon Intensity API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CarbonApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.carbonintensity.org.uk".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Forecast cache parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum age of a served entry, in minutes.
    pub ttl_minutes: u32,
    /// Base delay before the single retry of a failed fetch, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 30,
            retry_backoff_ms: 250,
        }
    }
}

impl CacheConfig {
    /// TTL as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.ttl_minutes))
    }

    /// Retry backoff as a std duration.
    pub fn retry_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Request limits and result shaping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulingConfig {
    /// Shortest accepted job duration (minutes).
    pub min_duration_minutes: u32,
    /// Longest accepted job duration (minutes).
    pub max_duration_minutes: u32,
    /// Number of alternative windows returned alongside the primary.
    pub max_alternatives: usize,
    /// Days past the start date the upstream forecast reaches.
    pub max_forecast_days: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            min_duration_minutes: 30,
            max_duration_minutes: 1440,
            max_alternatives: 3,
            max_forecast_days: 2,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"cache.ttl_minutes"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Environment variable names consulted by [`AppConfig::apply_env_overrides`].
pub const ENV_API_URL: &str = "GREEN_SCHED_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "GREEN_SCHED_TIMEOUT_SECS";
pub const ENV_CACHE_TTL_MINUTES: &str = "GREEN_SCHED_CACHE_TTL_MINUTES";
pub const ENV_PORT: &str = "GREEN_SCHED_PORT";

impl AppConfig {
    /// Parses configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the variable if a numeric value does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup, so tests need not touch
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the variable if a numeric value does not parse.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.carbon_api.base_url = url;
        }
        if let Some(v) = lookup(ENV_TIMEOUT_SECS) {
            self.carbon_api.timeout_secs = parse_env(ENV_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_CACHE_TTL_MINUTES) {
            self.cache.ttl_minutes = parse_env(ENV_CACHE_TTL_MINUTES, &v)?;
        }
        if let Some(v) = lookup(ENV_PORT) {
            self.server.port = parse_env(ENV_PORT, &v)?;
        }
        Ok(())
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.carbon_api.base_url.trim().is_empty() {
            errors.push(ConfigError {
                field: "carbon_api.base_url".into(),
                message: "must not be empty".into(),
            });
        }
        if self.carbon_api.timeout_secs == 0 {
            errors.push(ConfigError {
                field: "carbon_api.timeout_secs".into(),
                message: "must be > 0".into(),
            });
        }
        if self.cache.ttl_minutes == 0 {
            errors.push(ConfigError {
                field: "cache.ttl_minutes".into(),
                message: "must be > 0".into(),
            });
        }

        let s = &self.scheduling;
        if s.min_duration_minutes < 30 {
            errors.push(ConfigError {
                field: "scheduling.min_duration_minutes".into(),
                message: "must be >= 30 (one forecast period)".into(),
            });
        }
        if s.min_duration_minutes > s.max_duration_minutes {
            errors.push(ConfigError {
                field: "scheduling.min_duration_minutes".into(),
                message: "must be <= scheduling.max_duration_minutes".into(),
            });
        }
        if s.max_forecast_days == 0 {
            errors.push(ConfigError {
                field: "scheduling.max_forecast_days".into(),
                message: "must be > 0".into(),
            });
        }

        errors
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        field: key.to_string(),
        message: format!("\"{value}\" is not a valid number"),
    })
}
