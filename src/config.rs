// Application configuration
// Read once at startup from the environment (after dotenv has loaded .env)

use std::str::FromStr;
use std::time::Duration;

use crate::pricing::DEFAULT_CURRENCY;

/// Which storage implementation backs the services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                key: "STORE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Settings for the background job workers
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub queue_capacity: usize,
    /// How long finished job records stay queryable
    pub retention: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_base: Duration::from_millis(200),
            queue_capacity: 1024,
            retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub webhook_secret: Option<String>,
    pub cache_ttl: Duration,
    pub max_query_range_days: i64,
    pub jobs: JobSettings,
    pub currency: String,
}

impl AppConfig {
    /// Build the configuration from environment variables
    ///
    /// Unset optional values fall back to their defaults; set but
    /// unparsable values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match optional("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::Postgres,
        };

        let database_url = optional("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = optional("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let config = Self {
            store_backend,
            database_url,
            redis_url: optional("REDIS_URL"),
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 8080)?,
            jwt_secret,
            webhook_secret: optional("DIALOGFLOW_WEBHOOK_SECRET"),
            cache_ttl: Duration::from_secs(parsed("AVAILABILITY_CACHE_TTL_SECS", 300)?),
            max_query_range_days: parsed("MAX_QUERY_RANGE_DAYS", 30)?,
            jobs: JobSettings {
                workers: parsed("JOB_WORKERS", 4)?,
                max_attempts: parsed("JOB_MAX_ATTEMPTS", 3)?,
                retry_base: Duration::from_millis(parsed("JOB_RETRY_BASE_MS", 200)?),
                queue_capacity: parsed("JOB_QUEUE_CAPACITY", 1024)?,
                retention: Duration::from_secs(parsed("JOB_RETENTION_SECS", 3600)?),
            },
            currency: optional("DEFAULT_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        };

        if config.jobs.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "JOB_WORKERS",
                value: "0".to_string(),
            });
        }
        if config.jobs.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "JOB_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        if config.max_query_range_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_QUERY_RANGE_DAYS",
                value: config.max_query_range_days.to_string(),
            });
        }

        Ok(config)
    }

    /// Configuration for the in-memory backend, used by tests and local runs
    pub fn for_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            redis_url: None,
            host: "127.0.0.1".to_string(),
            port: 8080,
            jwt_secret: jwt_secret.into(),
            webhook_secret: None,
            cache_ttl: Duration::from_secs(300),
            max_query_range_days: 30,
            jobs: JobSettings::default(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
