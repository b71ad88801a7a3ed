use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Highest per-second API rate the limiter can express at millisecond resolution
pub const MAX_API_RATE_LIMIT: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub publisher: PublisherConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub external_url: Option<String>,
    pub api_rate_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Background ticker period
    pub interval_seconds: u64,
    /// Minimum spacing between throttled (opportunistic) checks
    pub throttle_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub min_password_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub api_max_limit: usize,
    pub max_request_body_size: usize,
    pub max_pages: usize, // Maximum pages to prevent overflow
}

/// Read an environment variable, falling back to `default`
fn env_or<T: FromStr>(name: &str, default: &str) -> Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {name} value")))
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./data/chapterhouse.db".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let external_url = std::env::var("EXTERNAL_URL").ok();
        let index_path = std::env::var("INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        Ok(Settings {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", "1")?,
                connection_timeout_seconds: env_or("DATABASE_CONNECTION_TIMEOUT", "30")?,
                idle_timeout_seconds: env_or("DATABASE_IDLE_TIMEOUT", "600")?,
            },
            server: ServerConfig {
                host,
                port: env_or("PORT", "3000")?,
                external_url,
                api_rate_limit: env_or("API_RATE_LIMIT", "20")?,
            },
            publisher: PublisherConfig {
                interval_seconds: env_or("PUBLISH_INTERVAL", "60")?,
                throttle_seconds: env_or("PUBLISH_THROTTLE", "300")?,
            },
            search: SearchConfig { index_path },
            cache: CacheConfig {
                ttl_seconds: env_or("CACHE_TTL", "60")?,
            },
            auth: AuthConfig {
                session_ttl_hours: env_or("SESSION_TTL_HOURS", "720")?,
                cookie_secure: env_or("COOKIE_SECURE", "false")?,
                min_password_length: env_or("MIN_PASSWORD_LENGTH", "8")?,
            },
            pagination: PaginationConfig {
                api_max_limit: env_or("API_MAX_LIMIT", "100")?,
                max_request_body_size: env_or("MAX_REQUEST_BODY_SIZE", "2097152")?,
                max_pages: env_or("MAX_PAGES", "10000")?,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Port must be non-zero".to_string()));
        }

        if self.server.api_rate_limit == 0 || self.server.api_rate_limit > MAX_API_RATE_LIMIT {
            return Err(Error::Config(format!(
                "API rate limit must be between 1 and {MAX_API_RATE_LIMIT} requests per second"
            )));
        }

        if self.publisher.interval_seconds == 0 {
            return Err(Error::Config(
                "Publish interval must be non-zero".to_string(),
            ));
        }

        if self.auth.session_ttl_hours <= 0 {
            return Err(Error::Config("Session TTL must be positive".to_string()));
        }

        if self.pagination.api_max_limit == 0 {
            return Err(Error::Config("API max limit must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Settings suitable for tests and in-memory runs
    pub fn for_testing() -> Self {
        Settings {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                external_url: None,
                api_rate_limit: 1000,
            },
            publisher: PublisherConfig {
                interval_seconds: 60,
                throttle_seconds: 300,
            },
            search: SearchConfig {
                index_path: "/tmp/chapterhouse-test-index".into(),
            },
            cache: CacheConfig { ttl_seconds: 60 },
            auth: AuthConfig {
                session_ttl_hours: 24,
                cookie_secure: false,
                min_password_length: 8,
            },
            pagination: PaginationConfig {
                api_max_limit: 100,
                max_request_body_size: 2_097_152,
                max_pages: 10000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::for_testing();
        assert!(settings.validate().is_ok());

        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::for_testing();
        settings.auth.session_ttl_hours = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rate_limit_bounds() {
        let mut settings = Settings::for_testing();
        settings.server.api_rate_limit = MAX_API_RATE_LIMIT;
        assert!(settings.validate().is_ok());

        settings.server.api_rate_limit = MAX_API_RATE_LIMIT + 1;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        settings.server.api_rate_limit = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_to_default() {
        let value: u64 = env_or("CHAPTERHOUSE_TEST_UNSET_VARIABLE", "42").unwrap();
        assert_eq!(value, 42);

        let bad: Result<u64> = env_or("CHAPTERHOUSE_TEST_UNSET_VARIABLE", "not-a-number");
        assert!(bad.is_err());
    }
}
