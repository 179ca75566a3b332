use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Postgres,
    Memory,
}

impl FromStr for StorageBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "document" => Ok(Self::Memory),
            other => bail!("unknown STORAGE_BACKEND '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown CACHE_BACKEND '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub redis_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Lifetime of an assembled feed page
    pub cache_ttl_secs: u64,
    pub max_page_size: u32,
    /// Clear the follower's cached pages when the follow graph changes
    pub invalidate_on_follow: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_feed_cache_ttl_secs(),
            max_page_size: default_max_page_size(),
            invalidate_on_follow: true,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage_backend: StorageBackendKind = env_or("STORAGE_BACKEND", "memory")
            .parse()
            .context("Invalid STORAGE_BACKEND")?;
        let database_url = std::env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackendKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORAGE_BACKEND=postgres");
        }

        let cache_backend: CacheBackendKind = env_or("CACHE_BACKEND", "memory")
            .parse()
            .context("Invalid CACHE_BACKEND")?;

        let config = Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                host: env_or("APP_HOST", "0.0.0.0"),
                port: env_or("APP_PORT", "8080")
                    .parse()
                    .context("Invalid APP_PORT")?,
            },
            storage: StorageConfig {
                backend: storage_backend,
                database_url,
                max_connections: env_or("DB_MAX_CONNECTIONS", "20")
                    .parse()
                    .context("Invalid DB_MAX_CONNECTIONS")?,
                min_connections: env_or("DB_MIN_CONNECTIONS", "5")
                    .parse()
                    .context("Invalid DB_MIN_CONNECTIONS")?,
            },
            cache: CacheConfig {
                backend: cache_backend,
                redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            },
            feed: FeedConfig {
                cache_ttl_secs: env_parse("FEED_CACHE_TTL_SECS", default_feed_cache_ttl_secs())?,
                max_page_size: env_parse("FEED_MAX_PAGE_SIZE", default_max_page_size())?,
                invalidate_on_follow: env_parse("FEED_INVALIDATE_ON_FOLLOW", true)?,
            },
        };

        if config.feed.max_page_size == 0 {
            bail!("FEED_MAX_PAGE_SIZE must be at least 1");
        }

        Ok(config)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parsed value of `name`, or `default` when unset
fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

fn default_feed_cache_ttl_secs() -> u64 {
    feed_cache::ttl::FEED
}

fn default_max_page_size() -> u32 {
    100
}
