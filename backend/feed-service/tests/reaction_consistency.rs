use feed_cache::{CacheClient, CacheKey};
use feed_service::config::FeedConfig;
use feed_service::models::{Comment, Post, ReactionKind};
use feed_service::storage::{CommentStore, DocumentStore, PostStore, StorageBackend};
use feed_service::{AppState, InvalidationHub};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    state: AppState,
    cache: CacheClient,
    post: Post,
    comment: Comment,
}

async fn fixture() -> Fixture {
    let store = Arc::new(DocumentStore::new());
    let cache = CacheClient::in_memory();
    let backend: Arc<dyn StorageBackend> = store.clone();
    let state = AppState::from_parts(backend, cache.clone(), FeedConfig::default());

    let post = store
        .create_post(&Post::new(Uuid::new_v4(), "hello", None))
        .await
        .unwrap();
    let comment = store
        .create_comment(&Comment::new(post.id, Uuid::new_v4(), "first"))
        .await
        .unwrap();

    Fixture {
        state,
        cache,
        post,
        comment,
    }
}

/// Read every derived value so each one is cached
async fn warm(f: &Fixture, user: Uuid, comment_id: Option<Uuid>) {
    let reactions = &f.state.reactions;
    reactions.has_reacted(user, f.post.id, comment_id).await.unwrap();
    reactions.count_for(f.post.id, comment_id).await.unwrap();
    reactions
        .reaction_status(f.post.id, user, comment_id)
        .await
        .unwrap();
    if comment_id.is_some() {
        // Post-level entries are cleared by comment reactions too
        warm_post_level(f, user).await;
    }
}

async fn warm_post_level(f: &Fixture, user: Uuid) {
    let reactions = &f.state.reactions;
    reactions.has_reacted(user, f.post.id, None).await.unwrap();
    reactions.count_for(f.post.id, None).await.unwrap();
    reactions.reaction_status(f.post.id, user, None).await.unwrap();
}

fn cached_reaction_keys(f: &Fixture, user: Uuid, comment_id: Option<Uuid>) -> Vec<String> {
    let memory = f.cache.memory().unwrap();
    InvalidationHub::reaction_keys(user, f.post.id, comment_id)
        .into_iter()
        .filter(|key| memory.contains(key))
        .collect()
}

#[tokio::test]
async fn test_upsert_then_remove_restores_count() {
    let f = fixture().await;
    let user = Uuid::new_v4();
    let reactions = &f.state.reactions;

    let before = reactions.count_for(f.post.id, None).await.unwrap();
    reactions
        .upsert(user, f.post.id, None, ReactionKind::Haha)
        .await
        .unwrap();
    assert_eq!(reactions.count_for(f.post.id, None).await.unwrap(), before + 1);

    assert!(reactions.remove(user, f.post.id, None).await.unwrap());
    assert_eq!(reactions.count_for(f.post.id, None).await.unwrap(), before);
    assert_eq!(f.state.posts.get_post(f.post.id).await.unwrap().likes(), 0);
}

#[tokio::test]
async fn test_upsert_and_remove_clear_the_same_entries() {
    let f = fixture().await;
    let user = Uuid::new_v4();
    let reactions = &f.state.reactions;

    for comment_id in [None, Some(f.comment.id)] {
        warm(&f, user, comment_id).await;
        let warmed = cached_reaction_keys(&f, user, comment_id);
        assert!(!warmed.is_empty());

        reactions
            .upsert(user, f.post.id, comment_id, ReactionKind::Like)
            .await
            .unwrap();
        assert!(cached_reaction_keys(&f, user, comment_id).is_empty());

        warm(&f, user, comment_id).await;
        assert_eq!(cached_reaction_keys(&f, user, comment_id), warmed);

        reactions.remove(user, f.post.id, comment_id).await.unwrap();
        assert!(cached_reaction_keys(&f, user, comment_id).is_empty());
    }
}

#[tokio::test]
async fn test_has_reacted_follows_writes() {
    let f = fixture().await;
    let user = Uuid::new_v4();
    let reactions = &f.state.reactions;

    assert!(!reactions.has_reacted(user, f.post.id, None).await.unwrap());

    reactions
        .upsert(user, f.post.id, None, ReactionKind::Sad)
        .await
        .unwrap();
    assert!(reactions.has_reacted(user, f.post.id, None).await.unwrap());
    assert!(!reactions
        .has_reacted(user, f.post.id, Some(f.comment.id))
        .await
        .unwrap());

    reactions.remove(user, f.post.id, None).await.unwrap();
    assert!(!reactions.has_reacted(user, f.post.id, None).await.unwrap());
}

#[tokio::test]
async fn test_status_reflects_kind_change() {
    let f = fixture().await;
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    let reactions = &f.state.reactions;

    reactions
        .upsert(user, f.post.id, None, ReactionKind::Like)
        .await
        .unwrap();
    reactions
        .upsert(other, f.post.id, None, ReactionKind::Like)
        .await
        .unwrap();
    let status = reactions.reaction_status(f.post.id, user, None).await.unwrap();
    assert_eq!(status.likes_count, 2);
    assert_eq!(status.reaction_counts.get(&ReactionKind::Like), Some(&2));

    reactions
        .upsert(user, f.post.id, None, ReactionKind::Angry)
        .await
        .unwrap();
    let status = reactions.reaction_status(f.post.id, user, None).await.unwrap();
    assert_eq!(status.likes_count, 2);
    assert_eq!(status.user_reaction, Some(ReactionKind::Angry));
    assert_eq!(status.reaction_counts.get(&ReactionKind::Like), Some(&1));
    assert_eq!(status.reaction_counts.get(&ReactionKind::Angry), Some(&1));

    // Changing kind does not double count the post counter
    assert_eq!(f.state.posts.get_post(f.post.id).await.unwrap().likes(), 2);
}

#[tokio::test]
async fn test_comment_reactions_do_not_touch_post_counter() {
    let f = fixture().await;
    let user = Uuid::new_v4();
    let reactions = &f.state.reactions;

    reactions
        .upsert(user, f.post.id, Some(f.comment.id), ReactionKind::Wow)
        .await
        .unwrap();

    assert_eq!(reactions.count_for(f.post.id, Some(f.comment.id)).await.unwrap(), 1);
    assert_eq!(reactions.count_for(f.post.id, None).await.unwrap(), 0);
    assert_eq!(f.state.posts.get_post(f.post.id).await.unwrap().likes(), 0);
    assert!(f
        .cache
        .memory()
        .unwrap()
        .contains(&CacheKey::comment_likes_count(f.comment.id)));
}

#[tokio::test]
async fn test_deleted_post_leaves_no_reaction_state_behind() {
    let f = fixture().await;
    let reader = Uuid::new_v4();
    let reactor = Uuid::new_v4();
    let reactions = &f.state.reactions;

    reactions
        .upsert(reactor, f.post.id, None, ReactionKind::Like)
        .await
        .unwrap();
    reactions
        .upsert(reactor, f.post.id, Some(f.comment.id), ReactionKind::Love)
        .await
        .unwrap();
    warm(&f, reactor, Some(f.comment.id)).await;
    warm_post_level(&f, reader).await;
    assert_eq!(reactions.count_for(f.post.id, None).await.unwrap(), 1);
    assert!(reactions.has_reacted(reactor, f.post.id, None).await.unwrap());

    f.state.posts.delete_post(f.post.user_id, f.post.id).await.unwrap();

    let memory = f.cache.memory().unwrap();
    for key in [
        CacheKey::post_likes_count(f.post.id),
        CacheKey::post_reaction_counts(f.post.id),
        CacheKey::user_like_status(reactor, f.post.id),
        CacheKey::user_like_status(reader, f.post.id),
        CacheKey::user_reaction_type(reactor, f.post.id),
        CacheKey::comment_likes_count(f.comment.id),
        CacheKey::user_comment_like_status(reactor, f.comment.id),
    ] {
        assert!(!memory.contains(&key), "{key} survived post deletion");
    }
    assert_eq!(reactions.count_for(f.post.id, None).await.unwrap(), 0);
    assert!(!reactions.has_reacted(reactor, f.post.id, None).await.unwrap());
    assert!(!reactions
        .has_reacted(reactor, f.post.id, Some(f.comment.id))
        .await
        .unwrap());
}
