//! Redis-backed cache store

use crate::{CacheError, CacheResult, CacheStore};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use std::time::Duration;
use tracing::{debug, info};

/// Keys fetched per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Cache store over a multiplexed Redis connection
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a managed connection to `url`
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis cache");
        Ok(Self::new(conn))
    }

    /// Add up to 10% jitter so entries written together do not expire together
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let ttl_with_jitter = Self::add_jitter(Self::ttl_secs(ttl));
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_with_jitter).await?;

        debug!(key = %key, ttl = ttl_with_jitter, "Redis set");
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn del_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            // SCAN rather than KEYS so large keyspaces never block the server
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                pipe.query_async::<_, ()>(&mut conn).await?;
                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = total_deleted, "Redis scan delete");
        Ok(total_deleted)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, Self::ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Unavailable(format!(
                "unexpected PING reply: {}",
                reply
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        for _ in 0..100 {
            let ttl = RedisCacheStore::add_jitter(1000);
            assert!((1000..=1090).contains(&ttl));
        }
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        assert_eq!(RedisCacheStore::ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(RedisCacheStore::ttl_secs(Duration::from_secs(900)), 900);
    }
}
