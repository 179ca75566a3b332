//! Feed assembly
//!
//! Serves a viewer's feed page from the cache when present. On a miss the
//! candidate page is fetched, scored concurrently, ranked and written back.

use crate::config::FeedConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::FeedPost;
use crate::services::candidates::CandidateSourceProvider;
use crate::services::invalidation::InvalidationHub;
use crate::services::scoring::ScoreEngine;
use chrono::{DateTime, Utc};
use feed_cache::{CacheClient, CacheKey};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct FeedAssembler {
    candidates: CandidateSourceProvider,
    scorer: ScoreEngine,
    cache: CacheClient,
    invalidation: InvalidationHub,
    config: FeedConfig,
}

impl FeedAssembler {
    pub fn new(
        candidates: CandidateSourceProvider,
        scorer: ScoreEngine,
        cache: CacheClient,
        invalidation: InvalidationHub,
        config: FeedConfig,
    ) -> Self {
        Self {
            candidates,
            scorer,
            cache,
            invalidation,
            config,
        }
    }

    pub async fn get_feed(&self, viewer_id: Uuid, page: u32, page_size: u32) -> Result<Vec<FeedPost>> {
        self.get_feed_at(viewer_id, page, page_size, Utc::now()).await
    }

    /// `get_feed` with an explicit scoring clock
    pub async fn get_feed_at(
        &self,
        viewer_id: Uuid,
        page: u32,
        page_size: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<FeedPost>> {
        self.validate_paging(page, page_size)?;
        let started = Instant::now();

        let key = CacheKey::feed_page(viewer_id, page, page_size);
        if let Some(cached) = self.cache.get::<Vec<FeedPost>>(&key).await {
            debug!(viewer_id = %viewer_id, page, page_size, "Feed served from cache");
            metrics::record_feed_request("cache", started.elapsed());
            return Ok(cached);
        }

        let candidates = self
            .candidates
            .candidates(viewer_id, page, page_size)
            .await?;
        let source = candidates.source;
        let candidate_count = candidates.posts.len();

        let ranked = self.scorer.rank(candidates.posts, viewer_id, now).await;
        let feed: Vec<FeedPost> = ranked
            .into_iter()
            .take(page_size as usize)
            .map(FeedPost::from)
            .collect();

        self.cache
            .set_with_ttl(&key, &feed, Duration::from_secs(self.config.cache_ttl_secs))
            .await;

        let elapsed = started.elapsed();
        metrics::record_feed_request(source.as_str(), elapsed);
        info!(
            viewer_id = %viewer_id,
            page,
            page_size,
            source = %source,
            candidates = candidate_count,
            returned = feed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Feed assembled"
        );
        Ok(feed)
    }

    /// Drop every cached page of the viewer's feed
    pub async fn invalidate_feed(&self, viewer_id: Uuid) -> usize {
        self.invalidation.invalidate_feed(viewer_id).await
    }

    pub fn max_page_size(&self) -> u32 {
        self.config.max_page_size
    }

    fn validate_paging(&self, page: u32, page_size: u32) -> Result<()> {
        if page < 1 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if page_size < 1 || page_size > self.config.max_page_size {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {}",
                self.config.max_page_size
            )));
        }
        Ok(())
    }
}
