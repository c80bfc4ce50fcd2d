use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Include internal error details in 500 responses. Never enable in production.
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Offset from UTC used to decide where one day ends and the next begins.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            cache_capacity: default_cache_capacity(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_sweep_interval() -> u64 {
    crate::cache::sweep::DEFAULT_SWEEP_INTERVAL.as_secs()
}
fn default_cache_capacity() -> u64 {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_session_ttl() -> u64 {
    604800 // 7 days
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_second")]
    pub per_second: u64,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_per_second() -> u64 {
    10
}
fn default_burst_size() -> u32 {
    50
}

/// Upper bound for `analytics.cache_ttl_secs` (one week).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

impl AppConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.analytics.cache_ttl_secs == 0 {
            return Err("analytics.cache_ttl_secs must be greater than zero".to_string());
        }
        if self.analytics.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(format!(
                "analytics.cache_ttl_secs must be at most {MAX_CACHE_TTL_SECS}, got {}",
                self.analytics.cache_ttl_secs
            ));
        }
        if self.analytics.sweep_interval_secs == 0 {
            return Err("analytics.sweep_interval_secs must be greater than zero".to_string());
        }
        if self.analytics.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(format!(
                "analytics.utc_offset_minutes must be within +/-1439, got {}",
                self.analytics.utc_offset_minutes
            ));
        }
        if self.database.pool_size == 0 {
            return Err("database.pool_size must be at least 1".to_string());
        }
        if self.rate_limit.per_second == 0 || self.rate_limit.burst_size == 0 {
            return Err(
                "rate_limit.per_second and rate_limit.burst_size must be non-zero".to_string(),
            );
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (BLOGPULSE__SERVER__PORT=3001, etc.)
        builder = builder.add_source(
            Environment::with_prefix("BLOGPULSE")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
