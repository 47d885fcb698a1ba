//! Configuration management for Quotagate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::duration::parse_duration;
use crate::error::{QuotagateError, Result};
use crate::ratelimit::{validate_prefix, Metadata, RateLimiterOptions};
use crate::store::DEFAULT_REMOTE_PREFIX;
use crate::strategy::FIXED_WINDOW;

/// Prefix of environment variables read by [`QuotagateConfig::load`].
pub const ENV_PREFIX: &str = "QUOTAGATE";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotagateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreSettings,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length, e.g. "1m"
    #[serde(default = "default_duration")]
    pub duration: String,

    /// Strategy name
    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default)]
    pub burst: u64,

    /// Counter key namespace
    #[serde(default)]
    pub prefix: String,

    /// Extra fields copied into every result
    #[serde(default)]
    pub metadata: Metadata,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            duration: default_duration(),
            strategy: default_strategy(),
            burst: 0,
            prefix: String::new(),
            metadata: Metadata::new(),
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_duration() -> String {
    "1m".to_string()
}

fn default_strategy() -> String {
    FIXED_WINDOW.to_string()
}

impl LimiterSettings {
    /// Reject durations that cannot serve as a window and ambiguous prefixes.
    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix)?;
        if parse_duration(&self.duration)? == 0 {
            return Err(QuotagateError::EmptyWindow {
                duration: self.duration.clone(),
            });
        }
        Ok(())
    }

    /// Limiter options without hooks.
    pub fn to_options(&self) -> RateLimiterOptions {
        let mut options = RateLimiterOptions::new(self.limit, self.duration.clone())
            .strategy(self.strategy.clone())
            .burst(self.burst)
            .prefix(self.prefix.clone());
        options.metadata = self.metadata.clone();
        options
    }
}

/// Counter store selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSettings {
    /// Bounded in-process store
    Memory(MemoryStoreSettings),

    /// Redis-backed store
    Redis {
        /// Connection URL, e.g. "redis://127.0.0.1:6379/0"
        url: String,
        /// Key namespace
        #[serde(default = "default_remote_prefix")]
        prefix: String,
    },
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings::Memory(MemoryStoreSettings::default())
    }
}

fn default_remote_prefix() -> String {
    DEFAULT_REMOTE_PREFIX.to_string()
}

/// In-process store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreSettings {
    /// Maximum distinct keys
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Expiry sweep period in milliseconds, 0 disables the sweep
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for MemoryStoreSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

fn default_max_size() -> usize {
    1000
}

fn default_cleanup_interval_ms() -> u64 {
    5 * 60 * 1000
}

impl MemoryStoreSettings {
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_ms > 0).then(|| Duration::from_millis(self.cleanup_interval_ms))
    }
}

impl QuotagateConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| QuotagateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file overlaid with
    /// `QUOTAGATE__SECTION__FIELD` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize::<QuotagateConfig>())
            .map_err(|e| QuotagateError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = QuotagateConfig::default();
        assert_eq!(config.limiter.limit, 100);
        assert_eq!(config.limiter.duration, "1m");
        assert_eq!(config.limiter.strategy, "fixed-window");
        assert_eq!(config.store, StoreSettings::Memory(MemoryStoreSettings::default()));
    }

    #[test]
    fn test_parse_memory_config() {
        let yaml = r#"
limiter:
  limit: 3
  duration: 30s
  strategy: approximated-sliding-window
  prefix: api
  metadata:
    tier: free
store:
  backend: memory
  max_size: 50
"#;
        let config = QuotagateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.limit, 3);
        assert_eq!(config.limiter.duration, "30s");
        assert_eq!(config.limiter.metadata["tier"], json!("free"));
        assert_eq!(
            config.store,
            StoreSettings::Memory(MemoryStoreSettings {
                max_size: 50,
                cleanup_interval_ms: 300_000,
            })
        );

        let options = config.limiter.to_options();
        assert_eq!(options.strategy, "approximated-sliding-window");
        assert_eq!(options.prefix, "api");
        assert_eq!(options.metadata["tier"], json!("free"));
    }

    #[test]
    fn test_parse_redis_config() {
        let yaml = r#"
store:
  backend: redis
  url: redis://cache:6379/2
"#;
        let config = QuotagateConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.store,
            StoreSettings::Redis {
                url: "redis://cache:6379/2".to_string(),
                prefix: "ratelimit".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err = QuotagateConfig::from_yaml("store:\n  backend: etcd\n").unwrap_err();
        assert!(matches!(err, QuotagateError::Config(_)));
    }

    #[test]
    fn test_cleanup_interval_zero_disables_sweep() {
        let settings = MemoryStoreSettings {
            max_size: 1,
            cleanup_interval_ms: 0,
        };
        assert_eq!(settings.cleanup_interval(), None);
        assert_eq!(
            MemoryStoreSettings::default().cleanup_interval(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_validate_duration() {
        let mut settings = LimiterSettings::default();
        assert!(settings.validate().is_ok());

        settings.duration = "0m".to_string();
        assert!(matches!(
            settings.validate().unwrap_err(),
            QuotagateError::EmptyWindow { .. }
        ));

        settings.duration = "fortnight".to_string();
        assert!(settings.validate().unwrap_err().is_config_error());

        let settings = LimiterSettings {
            prefix: "api:v1".to_string(),
            ..LimiterSettings::default()
        };
        assert!(matches!(
            settings.validate().unwrap_err(),
            QuotagateError::InvalidPrefix { .. }
        ));
    }

    #[test]
    fn test_load_layers_environment_over_file() {
        let path = std::env::temp_dir().join(format!("quotagate-test-{}.yaml", std::process::id()));
        std::fs::write(&path, "limiter:\n  limit: 3\n  duration: 10s\n").unwrap();
        std::env::set_var("QUOTAGATE__LIMITER__BURST", "7");

        let config = QuotagateConfig::load(Some(&path)).unwrap();
        std::env::remove_var("QUOTAGATE__LIMITER__BURST");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.limit, 3);
        assert_eq!(config.limiter.duration, "10s");
        assert_eq!(config.limiter.burst, 7);
        assert_eq!(config.limiter.strategy, "fixed-window");
    }
}
