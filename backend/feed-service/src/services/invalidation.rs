//! Cache invalidation rules
//!
//! Maps each mutation to the cache entries it makes stale. Keys come from
//! `feed_cache::CacheKey`, the same builders the readers use.

use feed_cache::{CacheClient, CacheKey};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct InvalidationHub {
    cache: CacheClient,
    invalidate_on_follow: bool,
}

impl InvalidationHub {
    pub fn new(cache: CacheClient, invalidate_on_follow: bool) -> Self {
        Self {
            cache,
            invalidate_on_follow,
        }
    }

    /// Entries derived from a user's reaction on a post or one of its comments
    pub fn reaction_keys(user_id: Uuid, post_id: Uuid, comment_id: Option<Uuid>) -> Vec<String> {
        let mut keys = vec![
            CacheKey::likes_by_post(post_id),
            CacheKey::post_likes_count(post_id),
            CacheKey::post_reaction_counts(post_id),
            CacheKey::user_like_status(user_id, post_id),
            CacheKey::user_reaction_type(user_id, post_id),
        ];

        if let Some(comment_id) = comment_id {
            keys.extend([
                CacheKey::likes_by_comment(comment_id),
                CacheKey::comment_likes_count(comment_id),
                CacheKey::comment_reaction_counts(comment_id),
                CacheKey::user_comment_like_status(user_id, comment_id),
                CacheKey::user_comment_reaction_type(user_id, comment_id),
            ]);
        }
        keys
    }

    pub async fn on_reaction_changed(&self, user_id: Uuid, post_id: Uuid, comment_id: Option<Uuid>) {
        let keys = Self::reaction_keys(user_id, post_id, comment_id);
        self.cache.remove_many(keys.as_slice()).await;
        debug!(
            user_id = %user_id,
            post_id = %post_id,
            comment_id = ?comment_id,
            keys = keys.len(),
            "Invalidated reaction cache"
        );
    }

    /// Entries of a post or comment shared by all users, and patterns over the per-user ones
    pub fn target_keys(post_id: Uuid, comment_id: Option<Uuid>) -> (Vec<String>, Vec<String>) {
        match comment_id {
            Some(comment_id) => (
                vec![
                    CacheKey::likes_by_comment(comment_id),
                    CacheKey::comment_likes_count(comment_id),
                    CacheKey::comment_reaction_counts(comment_id),
                ],
                vec![
                    CacheKey::user_comment_like_status_pattern(comment_id),
                    CacheKey::user_comment_reaction_type_pattern(comment_id),
                ],
            ),
            None => (
                vec![
                    CacheKey::likes_by_post(post_id),
                    CacheKey::post_likes_count(post_id),
                    CacheKey::post_reaction_counts(post_id),
                ],
                vec![
                    CacheKey::user_like_status_pattern(post_id),
                    CacheKey::user_reaction_type_pattern(post_id),
                ],
            ),
        }
    }

    /// A deleted comment takes its reactions with it and lowers the post's comment count
    pub async fn on_comment_removed(&self, post_id: Uuid, comment_id: Uuid) {
        let per_user = self.clear_target(post_id, Some(comment_id)).await;
        self.on_post_engagement_changed(post_id).await;
        debug!(post_id = %post_id, comment_id = %comment_id, per_user, "Invalidated comment cache");
    }

    /// A deleted post takes its comments and every reaction on either with it
    pub async fn on_post_removed(&self, post_id: Uuid, comment_ids: &[Uuid]) {
        let mut per_user = self.clear_target(post_id, None).await;
        for comment_id in comment_ids {
            per_user += self.clear_target(post_id, Some(*comment_id)).await;
        }
        self.on_post_engagement_changed(post_id).await;
        info!(
            post_id = %post_id,
            comments = comment_ids.len(),
            per_user,
            "Invalidated post cache"
        );
    }

    async fn clear_target(&self, post_id: Uuid, comment_id: Option<Uuid>) -> usize {
        let (keys, patterns) = Self::target_keys(post_id, comment_id);
        self.cache.remove_many(keys.as_slice()).await;
        let mut removed = 0;
        for pattern in &patterns {
            removed += self.cache.remove_pattern(pattern).await;
        }
        removed
    }

    /// Drops the follower's cached feed pages, when enabled
    pub async fn on_follow_changed(&self, follower_id: Uuid) -> usize {
        if !self.invalidate_on_follow {
            debug!(follower_id = %follower_id, "Follow invalidation disabled");
            return 0;
        }
        self.invalidate_feed(follower_id).await
    }

    /// Drops every viewer's engagement entry for the post
    pub async fn on_post_engagement_changed(&self, post_id: Uuid) -> usize {
        let removed = self
            .cache
            .remove_pattern(&CacheKey::engagement_pattern(post_id))
            .await;
        debug!(post_id = %post_id, removed, "Invalidated engagement scores");
        removed
    }

    pub async fn invalidate_feed(&self, user_id: Uuid) -> usize {
        let removed = self
            .cache
            .remove_pattern(&CacheKey::feed_pattern(user_id))
            .await;
        info!(user_id = %user_id, removed, "Invalidated feed pages");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_reaction_keys() {
        let (user, post) = (Uuid::new_v4(), Uuid::new_v4());
        let keys = InvalidationHub::reaction_keys(user, post, None);

        assert_eq!(
            keys,
            vec![
                format!("Likes:Post:{}", post),
                format!("LikesCount:Post:{}", post),
                format!("Reactions:Post:{}:Counts", post),
                format!("Like:User:{}:Post:{}", user, post),
                format!("Reaction:User:{}:Post:{}:Type", user, post),
            ]
        );
    }

    #[test]
    fn test_comment_reaction_keys_include_post_keys() {
        let (user, post, comment) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let keys = InvalidationHub::reaction_keys(user, post, Some(comment));

        assert_eq!(keys.len(), 10);
        assert!(keys.contains(&format!("LikesCount:Post:{}", post)));
        assert!(keys.contains(&format!("Likes:Comment:{}", comment)));
        assert!(keys.contains(&format!("Like:User:{}:Comment:{}", user, comment)));
        assert!(keys.contains(&format!("Reaction:User:{}:Comment:{}:Type", user, comment)));
    }

    #[tokio::test]
    async fn test_post_removal_clears_every_users_entries() {
        let cache = CacheClient::in_memory();
        let hub = InvalidationHub::new(cache.clone(), true);
        let (post, comment, other_post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        for user in [alice, bob] {
            for key in InvalidationHub::reaction_keys(user, post, Some(comment)) {
                cache.set(&key, &1).await;
            }
        }
        let kept = InvalidationHub::reaction_keys(alice, other_post, None);
        for key in &kept {
            cache.set(key, &1).await;
        }

        hub.on_post_removed(post, &[comment]).await;

        let mut expected = kept;
        expected.sort();
        assert_eq!(cache.memory().unwrap().keys(), expected);
    }

    #[tokio::test]
    async fn test_comment_removal_keeps_post_entries() {
        let cache = CacheClient::in_memory();
        let hub = InvalidationHub::new(cache.clone(), true);
        let (user, post, comment) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for key in InvalidationHub::reaction_keys(user, post, Some(comment)) {
            cache.set(&key, &1).await;
        }

        hub.on_comment_removed(post, comment).await;

        let memory = cache.memory().unwrap();
        assert!(memory.contains(&CacheKey::post_likes_count(post)));
        assert!(memory.contains(&CacheKey::user_like_status(user, post)));
        assert!(!memory.contains(&CacheKey::comment_likes_count(comment)));
        assert!(!memory.contains(&CacheKey::user_comment_like_status(user, comment)));
        assert!(!memory.contains(&CacheKey::user_comment_reaction_type(user, comment)));
    }

    #[tokio::test]
    async fn test_follow_flag_controls_feed_invalidation() {
        let cache = CacheClient::in_memory();
        let user = Uuid::new_v4();
        cache.set(&CacheKey::feed_page(user, 1, 10), &Vec::<u32>::new()).await;

        let disabled = InvalidationHub::new(cache.clone(), false);
        assert_eq!(disabled.on_follow_changed(user).await, 0);
        assert!(cache.memory().unwrap().contains(&CacheKey::feed_page(user, 1, 10)));

        let enabled = InvalidationHub::new(cache.clone(), true);
        assert_eq!(enabled.on_follow_changed(user).await, 1);
        assert!(cache.memory().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engagement_invalidation_spans_viewers() {
        let cache = CacheClient::in_memory();
        let hub = InvalidationHub::new(cache.clone(), true);
        let post = Uuid::new_v4();
        let other_post = Uuid::new_v4();

        for _ in 0..3 {
            cache
                .set(&CacheKey::engagement_score(post, Uuid::new_v4()), &1.5)
                .await;
        }
        let kept = CacheKey::engagement_score(other_post, Uuid::new_v4());
        cache.set(&kept, &2.0).await;

        assert_eq!(hub.on_post_engagement_changed(post).await, 3);
        assert_eq!(cache.memory().unwrap().keys(), vec![kept]);
    }
}
