//! Relevance scoring for feed candidates
//!
//! Score = w_r * recency + w_e * engagement + w_rel * relationship + w_c * content
//!
//! - Recency: exp(-0.1 * hours since post)
//! - Engagement: log10(1 + decayed weighted count), where the count is
//!   (likes + 2 * comments + 3 * shares) * exp(-0.5 * hours since post)
//! - Relationship: min(interactions / 10, 1) from the viewer->author counter
//! - Content: boosts for image, long text, hashtags and mentions, capped at 2

use crate::models::{Post, ScoredCandidate};
use chrono::{DateTime, Utc};
use feed_cache::{ttl, CacheClient, CacheKey};
use futures::future::join_all;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Relationship signal used when the interaction counter cannot be read
const RELATIONSHIP_FALLBACK: f64 = 0.1;

const CONTENT_SCORE_CAP: f64 = 2.0;

const LONG_POST_WORDS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub recency: f64,
    pub engagement: f64,
    pub relationship: f64,
    pub content: f64,
    /// Per-hour decay of the recency signal
    pub time_decay: f64,
    /// Per-hour decay of the engagement count
    pub engagement_decay: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            recency: 0.4,
            engagement: 0.3,
            relationship: 0.2,
            content: 0.1,
            time_decay: 0.1,
            engagement_decay: 0.5,
        }
    }
}

#[derive(Clone)]
pub struct ScoreEngine {
    cache: CacheClient,
    weights: ScoreWeights,
}

impl ScoreEngine {
    pub fn new(cache: CacheClient) -> Self {
        Self::with_weights(cache, ScoreWeights::default())
    }

    pub fn with_weights(cache: CacheClient, weights: ScoreWeights) -> Self {
        Self { cache, weights }
    }

    pub async fn compute_score(&self, post: &Post, viewer_id: Uuid, now: DateTime<Utc>) -> f64 {
        let recency = self.recency_score(post.created_at, now);
        let engagement = self.engagement_score(post, viewer_id, now).await;
        let relationship = self.relationship_score(post.user_id, viewer_id).await;
        let content = content_score(post);

        let w = &self.weights;
        let score = w.recency * recency
            + w.engagement * engagement
            + w.relationship * relationship
            + w.content * content;

        debug!(
            post_id = %post.id,
            viewer_id = %viewer_id,
            recency,
            engagement,
            relationship,
            content,
            score,
            "Scored post"
        );
        score
    }

    /// Score every post concurrently and sort best first
    pub async fn rank(
        &self,
        posts: Vec<Post>,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let scores = join_all(
            posts
                .iter()
                .map(|post| self.compute_score(post, viewer_id, now)),
        )
        .await;

        let mut ranked: Vec<ScoredCandidate> = posts
            .into_iter()
            .zip(scores)
            .map(|(post, score)| ScoredCandidate { post, score })
            .collect();
        ranked.sort_by(compare_ranked);
        ranked
    }

    pub fn recency_score(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        (-self.weights.time_decay * hours_since(created_at, now)).exp()
    }

    /// Decayed weighted interaction count, before the log transform
    pub fn decayed_engagement(&self, post: &Post, now: DateTime<Utc>) -> f64 {
        let weighted = (post.likes() + 2 * post.comments() + 3 * post.shares()) as f64;
        weighted * (-self.weights.engagement_decay * hours_since(post.created_at, now)).exp()
    }

    async fn engagement_score(&self, post: &Post, viewer_id: Uuid, now: DateTime<Utc>) -> f64 {
        let key = CacheKey::engagement_score(post.id, viewer_id);

        let decayed = match self.cache.get::<f64>(&key).await {
            Some(cached) => cached,
            None => {
                let decayed = self.decayed_engagement(post, now);
                self.cache
                    .set_with_ttl(&key, &decayed, Duration::from_secs(ttl::ENGAGEMENT))
                    .await;
                decayed
            }
        };

        (1.0 + decayed).log10()
    }

    async fn relationship_score(&self, author_id: Uuid, viewer_id: Uuid) -> f64 {
        let key = CacheKey::interaction(viewer_id, author_id);

        match self.cache.try_get::<i64>(&key).await {
            Ok(count) => {
                // No recorded interaction still counts as one
                let interactions = match count {
                    Some(n) if n > 0 => n,
                    _ => 1,
                };
                (interactions as f64 / 10.0).min(1.0)
            }
            Err(e) => {
                warn!(
                    viewer_id = %viewer_id,
                    author_id = %author_id,
                    error = %e,
                    "Relationship score unavailable, using fallback"
                );
                RELATIONSHIP_FALLBACK
            }
        }
    }
}

/// Fractional hours between creation and `now`, zero for future posts
pub fn hours_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds();
    (millis as f64 / 3_600_000.0).max(0.0)
}

pub fn content_score(post: &Post) -> f64 {
    let mut score = 1.0;

    if post.image_url.as_deref().is_some_and(|url| !url.is_empty()) {
        score *= 1.2;
    }
    if post.content.split_whitespace().count() > LONG_POST_WORDS {
        score *= 1.1;
    }
    if post.content.contains('#') {
        score *= 1.1;
    }
    if post.content.contains('@') {
        score *= 1.1;
    }

    f64::min(score, CONTENT_SCORE_CAP)
}

/// Score descending, then newest first, then post id ascending
pub fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.post.created_at.cmp(&a.post.created_at))
        .then_with(|| a.post.id.cmp(&b.post.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const EPSILON: f64 = 1e-12;

    fn engine() -> ScoreEngine {
        ScoreEngine::new(CacheClient::in_memory())
    }

    fn post_aged(now: DateTime<Utc>, hours: i64) -> Post {
        let mut post = Post::new(Uuid::new_v4(), "plain text", None);
        post.created_at = now - ChronoDuration::hours(hours);
        post
    }

    #[test]
    fn test_recency_one_hour() {
        let now = Utc::now();
        let score = engine().recency_score(now - ChronoDuration::hours(1), now);
        assert!((score - 0.9048374180359595).abs() < EPSILON);
    }

    #[test]
    fn test_future_post_clamped() {
        let now = Utc::now();
        assert_eq!(hours_since(now + ChronoDuration::hours(2), now), 0.0);
        assert_eq!(engine().recency_score(now + ChronoDuration::hours(2), now), 1.0);
    }

    #[test]
    fn test_fractional_hours() {
        let now = Utc::now();
        let half = hours_since(now - ChronoDuration::minutes(30), now);
        assert!((half - 0.5).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_engagement_regression_value() {
        let now = Utc::now();
        let mut post = post_aged(now, 1);
        post.likes_count = Some(5);
        post.comments_count = Some(2);
        post.shares_count = Some(1);
        let engine = engine();
        let viewer = Uuid::new_v4();

        let decayed = engine.decayed_engagement(&post, now);
        assert!((decayed - 7.278367916551601).abs() < EPSILON);

        let fresh = engine.engagement_score(&post, viewer, now).await;
        let cached = engine.engagement_score(&post, viewer, now).await;
        assert!((fresh - 0.9179447238982101).abs() < EPSILON);
        // The cached path applies the same log transform
        assert!((cached - fresh).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_total_score_regression_value() {
        let now = Utc::now();
        let mut post = post_aged(now, 1);
        post.likes_count = Some(5);
        post.comments_count = Some(2);
        post.shares_count = Some(1);

        let score = engine().compute_score(&post, Uuid::new_v4(), now).await;
        assert!((score - 0.7573183843838468).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_null_counters_are_zero() {
        let now = Utc::now();
        let mut post = post_aged(now, 0);
        post.likes_count = None;
        post.comments_count = None;
        post.shares_count = None;

        let score = engine().compute_score(&post, Uuid::new_v4(), now).await;
        // 0.4 * 1 + 0.3 * 0 + 0.2 * 0.1 + 0.1 * 1
        assert!((score - 0.52).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_relationship_uses_interaction_counter() {
        let cache = CacheClient::in_memory();
        let engine = ScoreEngine::new(cache.clone());
        let (viewer, author) = (Uuid::new_v4(), Uuid::new_v4());

        assert!((engine.relationship_score(author, viewer).await - 0.1).abs() < EPSILON);

        let key = CacheKey::interaction(viewer, author);
        for _ in 0..4 {
            cache
                .increment(&key, Duration::from_secs(ttl::INTERACTION))
                .await;
        }
        assert!((engine.relationship_score(author, viewer).await - 0.4).abs() < EPSILON);

        cache.set(&key, &25).await;
        assert_eq!(engine.relationship_score(author, viewer).await, 1.0);
    }

    #[tokio::test]
    async fn test_relationship_fallback_on_unreadable_counter() {
        let cache = CacheClient::in_memory();
        let engine = ScoreEngine::new(cache.clone());
        let (viewer, author) = (Uuid::new_v4(), Uuid::new_v4());

        cache
            .set(&CacheKey::interaction(viewer, author), "garbage")
            .await;
        assert_eq!(
            engine.relationship_score(author, viewer).await,
            RELATIONSHIP_FALLBACK
        );
    }

    #[test]
    fn test_content_boosts() {
        let mut post = Post::new(Uuid::new_v4(), "hello #rust @ferris", None);
        assert!((content_score(&post) - 1.21).abs() < 1e-9);

        post.image_url = Some("https://img.example/1.png".into());
        post.content = format!("{} #tag @who", vec!["word"; 60].join(" "));
        let expected = 1.2 * 1.1 * 1.1 * 1.1;
        assert!((content_score(&post) - expected).abs() < 1e-9);
        assert!(content_score(&post) <= CONTENT_SCORE_CAP);
    }

    #[tokio::test]
    async fn test_score_non_increasing_over_time() {
        let engine = engine();
        let viewer = Uuid::new_v4();
        let start = Utc::now();
        let mut post = post_aged(start, 0);
        post.likes_count = Some(10);
        post.comments_count = Some(3);

        let mut previous = f64::INFINITY;
        for hour in 0..48 {
            let now = start + ChronoDuration::hours(hour);
            let score = engine.compute_score(&post, viewer, now).await;
            assert!(score <= previous);
            previous = score;
        }
    }

    #[tokio::test]
    async fn test_rank_orders_by_score_then_recency() {
        let now = Utc::now();
        let posts = vec![post_aged(now, 3), post_aged(now, 1), post_aged(now, 2)];
        let expected: Vec<Uuid> = vec![posts[1].id, posts[2].id, posts[0].id];

        let ranked = engine().rank(posts, Uuid::new_v4(), now).await;
        let ids: Vec<Uuid> = ranked.iter().map(|c| c.post.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_tie_break_by_created_at_then_id() {
        let now = Utc::now();
        let older = ScoredCandidate {
            post: post_aged(now, 2),
            score: 0.5,
        };
        let newer = ScoredCandidate {
            post: post_aged(now, 1),
            score: 0.5,
        };
        assert_eq!(compare_ranked(&newer, &older), Ordering::Less);

        let mut twin = newer.clone();
        twin.post.id = Uuid::nil();
        assert_eq!(compare_ranked(&twin, &newer), Ordering::Less);
    }
}
