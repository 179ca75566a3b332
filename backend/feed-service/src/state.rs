use crate::config::{CacheBackendKind, Config, FeedConfig, StorageBackendKind};
use crate::services::{
    CandidateSourceProvider, CommentService, FeedAssembler, FollowService, InvalidationHub,
    PostService, ReactionAggregator, ScoreEngine,
};
use crate::storage::{DocumentStore, PgStore, StorageBackend};
use anyhow::Context;
use feed_cache::CacheClient;
use std::sync::Arc;
use tracing::info;

/// Services shared by every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub feed: FeedAssembler,
    pub reactions: ReactionAggregator,
    pub comments: CommentService,
    pub follows: FollowService,
    pub posts: PostService,
    pub cache: CacheClient,
}

impl AppState {
    /// Connect the configured backends and wire the services
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn StorageBackend> = match config.storage.backend {
            StorageBackendKind::Postgres => {
                let url = config
                    .storage
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres backend")?;
                let store = PgStore::connect(
                    url,
                    config.storage.max_connections,
                    config.storage.min_connections,
                )
                .await
                .context("Failed to initialize PostgreSQL storage")?;
                Arc::new(store)
            }
            StorageBackendKind::Memory => Arc::new(DocumentStore::new()),
        };
        info!(backend = ?config.storage.backend, "Storage backend ready");

        let cache = match config.cache.backend {
            CacheBackendKind::Redis => CacheClient::redis(&config.cache.redis_url)
                .await
                .context("Failed to connect to Redis")?,
            CacheBackendKind::Memory => CacheClient::in_memory(),
        };
        info!(backend = ?config.cache.backend, "Cache backend ready");

        Ok(Self::from_parts(store, cache, config.feed.clone()))
    }

    pub fn from_parts(store: Arc<dyn StorageBackend>, cache: CacheClient, feed: FeedConfig) -> Self {
        let invalidation = InvalidationHub::new(cache.clone(), feed.invalidate_on_follow);
        let assembler = FeedAssembler::new(
            CandidateSourceProvider::new(store.clone()),
            ScoreEngine::new(cache.clone()),
            cache.clone(),
            invalidation.clone(),
            feed,
        );

        Self {
            feed: assembler,
            reactions: ReactionAggregator::new(store.clone(), cache.clone(), invalidation.clone()),
            comments: CommentService::new(store.clone(), invalidation.clone()),
            follows: FollowService::new(store.clone(), invalidation.clone()),
            posts: PostService::new(store, invalidation),
            cache,
        }
    }

    /// Memory storage and memory cache
    pub fn in_memory(feed: FeedConfig) -> Self {
        Self::from_parts(Arc::new(DocumentStore::new()), CacheClient::in_memory(), feed)
    }
}
