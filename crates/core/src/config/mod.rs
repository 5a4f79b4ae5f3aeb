//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SWCACHE_*, nested with `__`)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Initial state of the kill-switch. When false every request is
    /// passed straight to the network.
    ///
    /// Set via SWCACHE_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// User-Agent string for upstream requests.
    ///
    /// Set via SWCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connect timeout in milliseconds. Never bounds a live stream's duration.
    ///
    /// Set via SWCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long shutdown waits for in-flight recordings before aborting them.
    ///
    /// Set via SWCACHE_SHUTDOWN_GRACE_MS environment variable.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Event-stream route and cache settings.
    #[serde(default)]
    pub sse: SseConfig,

    /// Requests that always bypass caching.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Event-stream interception settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Exact-match paths to intercept, e.g. `/api/events`.
    ///
    /// Set via SWCACHE_SSE__ROUTES (TOML array syntax).
    #[serde(default)]
    pub routes: Vec<String>,

    /// Cache partition holding recorded streams.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Maximum number of recorded streams kept in the partition.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Records older than this are evicted regardless of count.
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: u64,

    /// How request URLs are reduced to cache keys.
    #[serde(default)]
    pub key_policy: KeyPolicy,

    /// Per-branch buffer cap for the stream duplicator, in bytes.
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
}

/// Cache key normalization policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Canonical URL including the query string.
    #[default]
    FullUrl,
    /// Canonical URL with the query string removed.
    IgnoreQuery,
}

/// Pass-through patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Hostnames or path fragments that are never cached.
    #[serde(default)]
    pub patterns: Vec<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_cache_name() -> String {
    "sse-cache".into()
}

fn default_max_entries() -> usize {
    50
}

fn default_max_age_seconds() -> u64 {
    24 * 60 * 60
}

fn default_max_buffered_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            enabled: true,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            sse: SseConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            cache_name: default_cache_name(),
            max_entries: default_max_entries(),
            max_age_seconds: default_max_age_seconds(),
            key_policy: KeyPolicy::default(),
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

impl SseConfig {
    /// Whether `path` is one of the intercepted routes.
    pub fn matches_path(&self, path: &str) -> bool {
        self.routes.iter().any(|route| route == path)
    }
}

impl AppConfig {
    /// Connect timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Shutdown grace period for background recordings.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SWCACHE_`
    /// 2. TOML file from `SWCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./swcache.sqlite"));
        assert_eq!(config.user_agent, "swcache/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert!(config.enabled);
        assert!(config.sse.routes.is_empty());
        assert_eq!(config.sse.cache_name, "sse-cache");
        assert_eq!(config.sse.max_entries, 50);
        assert_eq!(config.sse.max_age_seconds, 86_400);
        assert_eq!(config.sse.key_policy, KeyPolicy::FullUrl);
        assert!(config.ignore.patterns.is_empty());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_matches_path_is_exact() {
        let sse = SseConfig { routes: vec!["/api/events".into()], ..Default::default() };
        assert!(sse.matches_path("/api/events"));
        assert!(!sse.matches_path("/api/events/more"));
        assert!(!sse.matches_path("/api"));
    }

    #[test]
    fn test_from_toml_layer() {
        let toml = r#"
            enabled = false

            [sse]
            routes = ["/stream"]
            cache_name = "streams"
            max_entries = 3
            key_policy = "ignore_query"
        "#;
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));
        let config = AppConfig::from_figment(figment).unwrap();

        assert!(!config.enabled);
        assert_eq!(config.sse.routes, vec!["/stream".to_string()]);
        assert_eq!(config.sse.cache_name, "streams");
        assert_eq!(config.sse.max_entries, 3);
        assert_eq!(config.sse.max_age_seconds, 86_400);
        assert_eq!(config.sse.key_policy, KeyPolicy::IgnoreQuery);
    }

    #[test]
    fn test_invalid_layer_rejected() {
        let figment =
            Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string("[sse]\nmax_entries = 0"));
        let result = AppConfig::from_figment(figment);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
