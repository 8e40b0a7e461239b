//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HTTPSTASH_*)
//! 2. TOML config file (if HTTPSTASH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use http::Method;
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Subdirectory of the platform cache directory used when `cache_dir` is unset.
pub const CACHE_SUBDIR: &str = "httpstash";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HTTPSTASH_*)
/// 2. TOML config file (if HTTPSTASH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory of the cache.
    ///
    /// Set via HTTPSTASH_CACHE_DIR environment variable. When unset, the
    /// platform cache directory (`$XDG_CACHE_HOME` on Linux) plus `httpstash` is used.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum age of a servable entry in seconds. `None` keeps entries forever.
    ///
    /// Set via HTTPSTASH_TTL_SECS environment variable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: Option<u64>,

    /// Keep entries forever, ignoring `ttl_secs`.
    ///
    /// Set via HTTPSTASH_NEVER_EXPIRE environment variable.
    #[serde(default)]
    pub never_expire: bool,

    /// HTTP methods eligible for caching.
    ///
    /// Set via HTTPSTASH_METHODS environment variable (e.g. `[GET,HEAD]`).
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,

    /// User-Agent string for upstream requests.
    ///
    /// Set via HTTPSTASH_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via HTTPSTASH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects to follow.
    ///
    /// Set via HTTPSTASH_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Responses buffered ahead of a slow replay consumer.
    ///
    /// Set via HTTPSTASH_REPLAY_BUFFER environment variable.
    #[serde(default = "default_replay_buffer")]
    pub replay_buffer: usize,
}

fn default_ttl_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

fn default_methods() -> Vec<String> {
    vec!["GET".into(), "HEAD".into()]
}

fn default_user_agent() -> String {
    "httpstash/0.1".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_redirects() -> usize {
    10
}

fn default_replay_buffer() -> usize {
    crate::cache::DEFAULT_REPLAY_BUFFER
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            ttl_secs: default_ttl_secs(),
            never_expire: false,
            methods: default_methods(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            replay_buffer: default_replay_buffer(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Entry TTL, or `None` when entries never expire.
    pub fn ttl(&self) -> Option<Duration> {
        if self.never_expire {
            return None;
        }
        self.ttl_secs.map(Duration::from_secs)
    }

    /// Resolve the cache root: explicit `cache_dir`, else the platform cache directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no cache directory is configured and
    /// the platform has none.
    pub fn cache_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join(CACHE_SUBDIR))
            .ok_or_else(|| ConfigError::Missing {
                field: "cache_dir".into(),
                hint: "Set HTTPSTASH_CACHE_DIR environment variable".into(),
            })
    }

    /// Parsed cacheable methods.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a method is not a valid HTTP token.
    pub fn cacheable_methods(&self) -> Result<Vec<Method>, ConfigError> {
        self.methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| ConfigError::Invalid {
                    field: "methods".into(),
                    reason: format!("'{m}' is not a valid HTTP method"),
                })
            })
            .collect()
    }

    /// Layered figment: defaults, optional TOML file, then environment.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("HTTPSTASH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("HTTPSTASH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HTTPSTASH_`
    /// 2. TOML file from `HTTPSTASH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

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
        assert!(config.cache_dir.is_none());
        assert_eq!(config.ttl_secs, Some(86_400));
        assert_eq!(config.methods, vec!["GET", "HEAD"]);
        assert_eq!(config.user_agent, "httpstash/0.1");
        assert_eq!(config.timeout_ms, 60_000);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.replay_buffer, 16);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.ttl(), Some(Duration::from_secs(86_400)));

        let config = AppConfig { ttl_secs: None, ..Default::default() };
        assert_eq!(config.ttl(), None);

        let config = AppConfig { never_expire: true, ..Default::default() };
        assert_eq!(config.ttl(), None);
    }

    #[test]
    fn test_cache_root_explicit() {
        let config = AppConfig { cache_dir: Some(PathBuf::from("/srv/cache")), ..Default::default() };
        assert_eq!(config.cache_root().unwrap(), PathBuf::from("/srv/cache"));
    }

    #[test]
    fn test_cacheable_methods() {
        let config = AppConfig { methods: vec!["get".into(), " HEAD ".into()], ..Default::default() };
        assert_eq!(config.cacheable_methods().unwrap(), vec![Method::GET, Method::HEAD]);

        let config = AppConfig { methods: vec!["NOT A METHOD".into()], ..Default::default() };
        assert!(matches!(config.cacheable_methods(), Err(ConfigError::Invalid { field, .. }) if field == "methods"));
    }

    #[test]
    fn test_load_from_env_and_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("httpstash.toml", "ttl_secs = 30\nuser_agent = \"from-file\"\nmethods = [\"GET\"]")?;
            jail.set_env("HTTPSTASH_CONFIG_FILE", "httpstash.toml");
            jail.set_env("HTTPSTASH_USER_AGENT", "from-env");
            jail.set_env("HTTPSTASH_CACHE_DIR", "/tmp/stash");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.ttl_secs, Some(30));
            assert_eq!(config.user_agent, "from-env");
            assert_eq!(config.methods, vec!["GET"]);
            assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/stash")));
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HTTPSTASH_TIMEOUT_MS", "5");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
            Ok(())
        });
    }

    #[test]
    fn test_load_never_expire() {
        figment::Jail::expect_with(|jail| {
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert!(!config.never_expire);
            assert_eq!(config.ttl(), Some(Duration::from_secs(86_400)));

            jail.create_file("httpstash.toml", "never_expire = true")?;
            jail.set_env("HTTPSTASH_CONFIG_FILE", "httpstash.toml");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert!(config.never_expire);
            assert_eq!(config.ttl(), None);

            jail.set_env("HTTPSTASH_NEVER_EXPIRE", "false");
            jail.set_env("HTTPSTASH_TTL_SECS", "120");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.ttl(), Some(Duration::from_secs(120)));
            Ok(())
        });
    }
}
