use std::env;
use std::fmt;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

const DEFAULT_PROFILE_CACHE_TTL_SECS: i64 = 300;
const DEFAULT_PROFILE_CACHE_CAPACITY: usize = 512;

/// Top-level configuration for the connection engine and its harnesses.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub profiles: ProfileCacheConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let ttl_secs = match env::var("CONNECT_PROFILE_CACHE_TTL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidCacheTtl)?,
            Err(_) => DEFAULT_PROFILE_CACHE_TTL_SECS,
        };

        let capacity = match env::var("CONNECT_PROFILE_CACHE_CAPACITY") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidCacheCapacity)?,
            Err(_) => DEFAULT_PROFILE_CACHE_CAPACITY,
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            profiles: ProfileCacheConfig { ttl_secs, capacity },
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Lifetime and size bounds for the display-profile cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileCacheConfig {
    pub ttl_secs: i64,
    pub capacity: usize,
}

impl ProfileCacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs)
    }
}

impl Default for ProfileCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_PROFILE_CACHE_TTL_SECS,
            capacity: DEFAULT_PROFILE_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidCacheTtl,
    InvalidCacheCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCacheTtl => {
                write!(f, "CONNECT_PROFILE_CACHE_TTL_SECS must be a positive integer")
            }
            ConfigError::InvalidCacheCapacity => {
                write!(f, "CONNECT_PROFILE_CACHE_CAPACITY must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
