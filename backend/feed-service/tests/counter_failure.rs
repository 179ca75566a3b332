use async_trait::async_trait;
use feed_cache::{CacheClient, CacheKey};
use feed_service::config::FeedConfig;
use feed_service::error::StoreResult;
use feed_service::models::{
    Comment, FollowEdge, Post, PostCounter, Reaction, ReactionKind, UpsertOutcome,
};
use feed_service::storage::{
    CommentStore, DocumentStore, FollowStore, PostStore, ReactionStore, StorageBackend,
};
use feed_service::{AppState, StoreError};
use std::sync::Arc;
use uuid::Uuid;

/// Document store whose maintained-counter writes always fail
struct CounterlessStore {
    inner: DocumentStore,
}

#[async_trait]
impl PostStore for CounterlessStore {
    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        self.inner.get_post(post_id).await
    }
    async fn create_post(&self, post: &Post) -> StoreResult<Post> {
        self.inner.create_post(post).await
    }
    async fn update_post(
        &self,
        post_id: Uuid,
        content: &str,
        image_url: Option<&str>,
    ) -> StoreResult<Option<Post>> {
        self.inner.update_post(post_id, content, image_url).await
    }
    async fn delete_post(&self, post_id: Uuid) -> StoreResult<bool> {
        self.inner.delete_post(post_id).await
    }
    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Post>> {
        self.inner.posts_by_authors(author_ids, page, page_size).await
    }
    async fn recent_posts(&self, page: u32, page_size: u32) -> StoreResult<Vec<Post>> {
        self.inner.recent_posts(page, page_size).await
    }
    async fn increment_counter(
        &self,
        _post_id: Uuid,
        _counter: PostCounter,
        _delta: i32,
    ) -> StoreResult<()> {
        Err(StoreError::Conflict("counter row locked".into()))
    }
    async fn set_counters(
        &self,
        post_id: Uuid,
        likes: i32,
        comments: i32,
    ) -> StoreResult<Option<Post>> {
        self.inner.set_counters(post_id, likes, comments).await
    }
}

#[async_trait]
impl CommentStore for CounterlessStore {
    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        self.inner.get_comment(comment_id).await
    }
    async fn create_comment(&self, comment: &Comment) -> StoreResult<Comment> {
        self.inner.create_comment(comment).await
    }
    async fn update_comment(&self, comment_id: Uuid, content: &str) -> StoreResult<Option<Comment>> {
        self.inner.update_comment(comment_id, content).await
    }
    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<bool> {
        self.inner.delete_comment(comment_id).await
    }
    async fn comments_by_post(
        &self,
        post_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Comment>> {
        self.inner.comments_by_post(post_id, page, page_size).await
    }
    async fn comment_ids_for_post(&self, post_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.inner.comment_ids_for_post(post_id).await
    }
    async fn count_comments(&self, post_id: Uuid) -> StoreResult<i64> {
        self.inner.count_comments(post_id).await
    }
}

#[async_trait]
impl FollowStore for CounterlessStore {
    async fn followee_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.inner.followee_ids(follower_id).await
    }
    async fn get_edge(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        self.inner.get_edge(follower_id, followee_id).await
    }
    async fn save_edge(&self, edge: &FollowEdge) -> StoreResult<FollowEdge> {
        self.inner.save_edge(edge).await
    }
    async fn follower_ids(&self, followee_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.inner.follower_ids(followee_id).await
    }
    async fn follower_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        self.inner.follower_edges(user_id, page, page_size).await
    }
    async fn followee_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        self.inner.followee_edges(user_id, page, page_size).await
    }
    async fn blocked_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        self.inner.blocked_edges(user_id, page, page_size).await
    }
    async fn count_followers(&self, user_id: Uuid) -> StoreResult<i64> {
        self.inner.count_followers(user_id).await
    }
    async fn count_followees(&self, user_id: Uuid) -> StoreResult<i64> {
        self.inner.count_followees(user_id).await
    }
}

#[async_trait]
impl ReactionStore for CounterlessStore {
    async fn find_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>> {
        self.inner.find_reaction(user_id, post_id, comment_id).await
    }
    async fn upsert_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
        kind: ReactionKind,
    ) -> StoreResult<UpsertOutcome> {
        self.inner
            .upsert_reaction(user_id, post_id, comment_id, kind)
            .await
    }
    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>> {
        self.inner.delete_reaction(user_id, post_id, comment_id).await
    }
    async fn count_reactions(&self, post_id: Uuid, comment_id: Option<Uuid>) -> StoreResult<i64> {
        self.inner.count_reactions(post_id, comment_id).await
    }
    async fn reaction_breakdown(
        &self,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Vec<(ReactionKind, i64)>> {
        self.inner.reaction_breakdown(post_id, comment_id).await
    }
}

async fn setup() -> (AppState, CacheClient, Post) {
    let store = Arc::new(CounterlessStore {
        inner: DocumentStore::new(),
    });
    let post = store
        .create_post(&Post::new(Uuid::new_v4(), "counted", None))
        .await
        .unwrap();
    let cache = CacheClient::in_memory();
    let backend: Arc<dyn StorageBackend> = store;
    let state = AppState::from_parts(backend, cache.clone(), FeedConfig::default());
    (state, cache, post)
}

#[tokio::test]
async fn test_reaction_caches_cleared_when_counter_write_fails() {
    let (state, cache, post) = setup().await;
    let user = Uuid::new_v4();
    let reactions = &state.reactions;

    assert!(!reactions.has_reacted(user, post.id, None).await.unwrap());
    assert_eq!(reactions.count_for(post.id, None).await.unwrap(), 0);
    assert!(cache
        .memory()
        .unwrap()
        .contains(&CacheKey::user_like_status(user, post.id)));

    reactions
        .upsert(user, post.id, None, ReactionKind::Love)
        .await
        .unwrap();
    assert!(reactions.has_reacted(user, post.id, None).await.unwrap());
    assert_eq!(reactions.count_for(post.id, None).await.unwrap(), 1);
    let status = reactions.reaction_status(post.id, user, None).await.unwrap();
    assert_eq!(status.user_reaction, Some(ReactionKind::Love));

    assert!(reactions.remove(user, post.id, None).await.unwrap());
    assert!(!reactions.has_reacted(user, post.id, None).await.unwrap());
    assert_eq!(reactions.count_for(post.id, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reconcile_repairs_counter_left_behind() {
    let (state, _cache, post) = setup().await;

    state
        .reactions
        .upsert(Uuid::new_v4(), post.id, None, ReactionKind::Like)
        .await
        .unwrap();
    state
        .comments
        .create_comment(Uuid::new_v4(), post.id, "still saved")
        .await
        .unwrap();

    let drifted = state.posts.get_post(post.id).await.unwrap();
    assert_eq!(drifted.likes(), 0);
    assert_eq!(drifted.comments(), 0);

    let repaired = state.reactions.reconcile_counters(post.id).await.unwrap();
    assert_eq!(repaired.likes(), 1);
    assert_eq!(repaired.comments(), 1);
}

#[tokio::test]
async fn test_comment_delete_succeeds_when_counter_write_fails() {
    let (state, cache, post) = setup().await;
    let user = Uuid::new_v4();
    let comment = state
        .comments
        .create_comment(user, post.id, "short lived")
        .await
        .unwrap();

    state
        .reactions
        .upsert(user, post.id, Some(comment.id), ReactionKind::Haha)
        .await
        .unwrap();
    assert_eq!(
        state.reactions.count_for(post.id, Some(comment.id)).await.unwrap(),
        1
    );
    assert!(state
        .reactions
        .has_reacted(user, post.id, Some(comment.id))
        .await
        .unwrap());

    state.comments.delete_comment(user, comment.id).await.unwrap();

    let memory = cache.memory().unwrap();
    assert!(!memory.contains(&CacheKey::comment_likes_count(comment.id)));
    assert!(!memory.contains(&CacheKey::user_comment_like_status(user, comment.id)));
    assert!(!state
        .reactions
        .has_reacted(user, post.id, Some(comment.id))
        .await
        .unwrap());
}
