//! Reaction aggregation
//!
//! Owns reaction writes and every cache entry derived from reactions:
//! per-target totals, per-kind breakdowns and per-user state.

use crate::error::{AppError, Result};
use crate::models::{
    Post, PostCounter, Reaction, ReactionKind, ReactionScope, ReactionStatus, UpsertChange,
};
use crate::services::invalidation::InvalidationHub;
use crate::storage::StorageBackend;
use feed_cache::{ttl, CacheClient, CacheKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ReactionAggregator {
    store: Arc<dyn StorageBackend>,
    cache: CacheClient,
    invalidation: InvalidationHub,
}

impl ReactionAggregator {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        cache: CacheClient,
        invalidation: InvalidationHub,
    ) -> Self {
        Self {
            store,
            cache,
            invalidation,
        }
    }

    /// Set the user's reaction on the post or comment to `kind`
    pub async fn upsert(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
        kind: ReactionKind,
    ) -> Result<Reaction> {
        let post = self.require_target(post_id, comment_id).await?;

        let outcome = self
            .store
            .upsert_reaction(user_id, post_id, comment_id, kind)
            .await?;

        if outcome.change == UpsertChange::Unchanged {
            debug!(user_id = %user_id, post_id = %post_id, "Reaction unchanged");
            return Ok(outcome.reaction);
        }

        // The row is the source of truth: clear what it invalidates before
        // the follow-up counter write, which may fail on its own
        self.invalidation
            .on_reaction_changed(user_id, post_id, comment_id)
            .await;

        if outcome.change == UpsertChange::Inserted {
            if outcome.reaction.scope == ReactionScope::Post {
                self.adjust_like_counter(post_id, 1).await;
            }
            self.record_interaction(user_id, post.user_id).await;
        }

        info!(
            user_id = %user_id,
            post_id = %post_id,
            comment_id = ?comment_id,
            kind = ?kind,
            change = ?outcome.change,
            "Reaction upserted"
        );
        Ok(outcome.reaction)
    }

    /// Remove the user's reaction; false when there was none
    pub async fn remove(&self, user_id: Uuid, post_id: Uuid, comment_id: Option<Uuid>) -> Result<bool> {
        let Some(removed) = self
            .store
            .delete_reaction(user_id, post_id, comment_id)
            .await?
        else {
            return Ok(false);
        };

        self.invalidation
            .on_reaction_changed(user_id, post_id, comment_id)
            .await;

        if removed.scope == ReactionScope::Post {
            self.adjust_like_counter(post_id, -1).await;
        }

        info!(
            user_id = %user_id,
            post_id = %post_id,
            comment_id = ?comment_id,
            "Reaction removed"
        );
        Ok(true)
    }

    pub async fn has_reacted(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> Result<bool> {
        let key = match comment_id {
            Some(comment_id) => CacheKey::user_comment_like_status(user_id, comment_id),
            None => CacheKey::user_like_status(user_id, post_id),
        };
        if let Some(cached) = self.cache.get::<bool>(&key).await {
            return Ok(cached);
        }

        let reacted = self
            .store
            .find_reaction(user_id, post_id, comment_id)
            .await?
            .is_some();
        self.cache
            .set_with_ttl(&key, &reacted, Duration::from_secs(ttl::REACTION_STATE))
            .await;
        Ok(reacted)
    }

    /// Total reactions of every kind on the target
    pub async fn count_for(&self, post_id: Uuid, comment_id: Option<Uuid>) -> Result<i64> {
        let key = match comment_id {
            Some(comment_id) => CacheKey::comment_likes_count(comment_id),
            None => CacheKey::post_likes_count(post_id),
        };
        if let Some(cached) = self.cache.get::<i64>(&key).await {
            return Ok(cached);
        }

        let count = self.store.count_reactions(post_id, comment_id).await?;
        self.cache
            .set_with_ttl(&key, &count, Duration::from_secs(ttl::REACTION_COUNT))
            .await;
        Ok(count)
    }

    pub async fn reaction_breakdown(
        &self,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> Result<BTreeMap<ReactionKind, i64>> {
        let key = match comment_id {
            Some(comment_id) => CacheKey::comment_reaction_counts(comment_id),
            None => CacheKey::post_reaction_counts(post_id),
        };
        // Stored as pairs so the entry decodes without enum map keys
        if let Some(cached) = self.cache.get::<Vec<(ReactionKind, i64)>>(&key).await {
            return Ok(cached.into_iter().collect());
        }

        let counts = self.store.reaction_breakdown(post_id, comment_id).await?;
        self.cache
            .set_with_ttl(&key, &counts, Duration::from_secs(ttl::REACTION_COUNT))
            .await;
        Ok(counts.into_iter().collect())
    }

    pub async fn user_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> Result<Option<ReactionKind>> {
        let key = match comment_id {
            Some(comment_id) => CacheKey::user_comment_reaction_type(user_id, comment_id),
            None => CacheKey::user_reaction_type(user_id, post_id),
        };
        // A cached `null` records that the user has not reacted
        if let Some(cached) = self.cache.get::<Option<ReactionKind>>(&key).await {
            return Ok(cached);
        }

        let kind = self
            .store
            .find_reaction(user_id, post_id, comment_id)
            .await?
            .map(|reaction| reaction.kind);
        self.cache
            .set_with_ttl(&key, &kind, Duration::from_secs(ttl::REACTION_STATE))
            .await;
        Ok(kind)
    }

    pub async fn reaction_status(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> Result<ReactionStatus> {
        self.require_target(post_id, comment_id).await?;

        let (reaction_counts, user_reaction) = futures::try_join!(
            self.reaction_breakdown(post_id, comment_id),
            self.user_reaction(user_id, post_id, comment_id),
        )?;

        Ok(ReactionStatus {
            post_id,
            comment_id,
            likes_count: reaction_counts.values().sum(),
            has_reacted: user_reaction.is_some(),
            user_reaction,
            reaction_counts,
        })
    }

    /// Recompute the post's maintained counters from the stored rows
    pub async fn reconcile_counters(&self, post_id: Uuid) -> Result<Post> {
        let likes = self.store.count_reactions(post_id, None).await?;
        let comments = self.store.count_comments(post_id).await?;

        let post = self
            .store
            .set_counters(post_id, saturate(likes), saturate(comments))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        self.invalidation.on_post_engagement_changed(post_id).await;
        info!(post_id = %post_id, likes, comments, "Post counters reconciled");
        Ok(post)
    }

    /// Loads the post, checking the comment belongs to it when given
    async fn require_target(&self, post_id: Uuid, comment_id: Option<Uuid>) -> Result<Post> {
        let post = self
            .store
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        if let Some(comment_id) = comment_id {
            match self.store.get_comment(comment_id).await? {
                Some(comment) if comment.post_id == post_id => {}
                _ => {
                    return Err(AppError::NotFound(format!(
                        "Comment {} not found on post {}",
                        comment_id, post_id
                    )))
                }
            }
        }
        Ok(post)
    }

    /// Best effort: a failed write leaves drift for `reconcile_counters` to repair
    async fn adjust_like_counter(&self, post_id: Uuid, delta: i32) {
        if let Err(e) = self
            .store
            .increment_counter(post_id, PostCounter::Likes, delta)
            .await
        {
            warn!(post_id = %post_id, delta, error = %e, "Like counter not updated");
        }
        self.invalidation.on_post_engagement_changed(post_id).await;
    }

    async fn record_interaction(&self, user_id: Uuid, author_id: Uuid) {
        if user_id == author_id {
            return;
        }
        let key = CacheKey::interaction(user_id, author_id);
        if self
            .cache
            .increment(&key, Duration::from_secs(ttl::INTERACTION))
            .await
            .is_none()
        {
            warn!(user_id = %user_id, author_id = %author_id, "Interaction not recorded");
        }
    }
}

fn saturate(value: i64) -> i32 {
    i32::try_from(value.max(0)).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Comment;
    use crate::storage::{CommentStore, DocumentStore, PostStore};

    struct Fixture {
        store: Arc<DocumentStore>,
        cache: CacheClient,
        aggregator: ReactionAggregator,
        post: Post,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(DocumentStore::new());
        let cache = CacheClient::in_memory();
        let hub = InvalidationHub::new(cache.clone(), true);
        let aggregator = ReactionAggregator::new(store.clone(), cache.clone(), hub);
        let post = store
            .create_post(&Post::new(Uuid::new_v4(), "reactions", None))
            .await
            .unwrap();
        Fixture {
            store,
            cache,
            aggregator,
            post,
        }
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_row() {
        let fx = fixture().await;
        let user = Uuid::new_v4();

        let first = fx
            .aggregator
            .upsert(user, fx.post.id, None, ReactionKind::Like)
            .await
            .unwrap();
        let second = fx
            .aggregator
            .upsert(user, fx.post.id, None, ReactionKind::Like)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(fx.aggregator.count_for(fx.post.id, None).await.unwrap(), 1);
        let post = fx.store.get_post(fx.post.id).await.unwrap().unwrap();
        assert_eq!(post.likes(), 1);
    }

    #[tokio::test]
    async fn test_kind_change_updates_in_place() {
        let fx = fixture().await;
        let user = Uuid::new_v4();

        fx.aggregator
            .upsert(user, fx.post.id, None, ReactionKind::Like)
            .await
            .unwrap();
        assert_eq!(
            fx.aggregator.user_reaction(user, fx.post.id, None).await.unwrap(),
            Some(ReactionKind::Like)
        );

        fx.aggregator
            .upsert(user, fx.post.id, None, ReactionKind::Angry)
            .await
            .unwrap();
        assert_eq!(
            fx.aggregator.user_reaction(user, fx.post.id, None).await.unwrap(),
            Some(ReactionKind::Angry)
        );
        let post = fx.store.get_post(fx.post.id).await.unwrap().unwrap();
        assert_eq!(post.likes(), 1);
    }

    #[tokio::test]
    async fn test_missing_post_or_foreign_comment_not_found() {
        let fx = fixture().await;
        let user = Uuid::new_v4();

        let missing = fx
            .aggregator
            .upsert(user, Uuid::new_v4(), None, ReactionKind::Like)
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let other = fx
            .store
            .create_post(&Post::new(Uuid::new_v4(), "other", None))
            .await
            .unwrap();
        let foreign = fx
            .store
            .create_comment(&Comment::new(other.id, Uuid::new_v4(), "elsewhere"))
            .await
            .unwrap();
        let result = fx
            .aggregator
            .upsert(user, fx.post.id, Some(foreign.id), ReactionKind::Like)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_without_reaction_returns_false() {
        let fx = fixture().await;
        assert!(!fx
            .aggregator
            .remove(Uuid::new_v4(), fx.post.id, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_breakdown_empty_then_populated() {
        let fx = fixture().await;
        assert!(fx
            .aggregator
            .reaction_breakdown(fx.post.id, None)
            .await
            .unwrap()
            .is_empty());

        for kind in [ReactionKind::Like, ReactionKind::Like, ReactionKind::Wow] {
            fx.aggregator
                .upsert(Uuid::new_v4(), fx.post.id, None, kind)
                .await
                .unwrap();
        }

        let breakdown = fx.aggregator.reaction_breakdown(fx.post.id, None).await.unwrap();
        assert_eq!(breakdown.get(&ReactionKind::Like), Some(&2));
        assert_eq!(breakdown.get(&ReactionKind::Wow), Some(&1));
        // Second read comes from the cache
        assert_eq!(
            fx.aggregator.reaction_breakdown(fx.post.id, None).await.unwrap(),
            breakdown
        );
    }

    #[tokio::test]
    async fn test_absent_reaction_is_cached_as_null() {
        let fx = fixture().await;
        let user = Uuid::new_v4();

        assert_eq!(
            fx.aggregator.user_reaction(user, fx.post.id, None).await.unwrap(),
            None
        );
        let key = CacheKey::user_reaction_type(user, fx.post.id);
        assert!(fx.cache.memory().unwrap().contains(&key));
    }

    #[tokio::test]
    async fn test_interaction_counter_recorded_for_other_authors() {
        let fx = fixture().await;
        let viewer = Uuid::new_v4();

        fx.aggregator
            .upsert(viewer, fx.post.id, None, ReactionKind::Love)
            .await
            .unwrap();
        fx.aggregator
            .upsert(fx.post.user_id, fx.post.id, None, ReactionKind::Love)
            .await
            .unwrap();

        let memory = fx.cache.memory().unwrap();
        assert!(memory.contains(&CacheKey::interaction(viewer, fx.post.user_id)));
        assert!(!memory.contains(&CacheKey::interaction(fx.post.user_id, fx.post.user_id)));
    }

    #[tokio::test]
    async fn test_reconcile_counters_repairs_drift() {
        let fx = fixture().await;
        fx.aggregator
            .upsert(Uuid::new_v4(), fx.post.id, None, ReactionKind::Like)
            .await
            .unwrap();
        fx.store
            .create_comment(&Comment::new(fx.post.id, Uuid::new_v4(), "hi"))
            .await
            .unwrap();
        fx.store
            .set_counters(fx.post.id, 40, 0)
            .await
            .unwrap();

        let post = fx.aggregator.reconcile_counters(fx.post.id).await.unwrap();
        assert_eq!(post.likes(), 1);
        assert_eq!(post.comments(), 1);

        let missing = fx.aggregator.reconcile_counters(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
