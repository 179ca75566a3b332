//! Storage adapter
//!
//! The services only see these traits. Two backends implement them:
//! PostgreSQL through sqlx and an embedded document store. The backend is
//! chosen once at startup.

pub mod document;
pub mod postgres;

pub use document::DocumentStore;
pub use postgres::PgStore;

use crate::error::StoreResult;
use crate::models::{
    Comment, FollowEdge, Post, PostCounter, Reaction, ReactionKind, UpsertOutcome,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Row offset of a 1-based page
pub fn page_offset(page: u32, page_size: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(page_size)
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<Post>>;

    async fn create_post(&self, post: &Post) -> StoreResult<Post>;

    async fn update_post(
        &self,
        post_id: Uuid,
        content: &str,
        image_url: Option<&str>,
    ) -> StoreResult<Option<Post>>;

    /// Deletes the post with its comments and reactions
    async fn delete_post(&self, post_id: Uuid) -> StoreResult<bool>;

    /// Page of posts by any of `author_ids`, newest first
    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Post>>;

    /// Page of posts system-wide, newest first
    async fn recent_posts(&self, page: u32, page_size: u32) -> StoreResult<Vec<Post>>;

    /// Add `delta` to a maintained counter, flooring the result at zero
    async fn increment_counter(
        &self,
        post_id: Uuid,
        counter: PostCounter,
        delta: i32,
    ) -> StoreResult<()>;

    async fn set_counters(
        &self,
        post_id: Uuid,
        likes: i32,
        comments: i32,
    ) -> StoreResult<Option<Post>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>>;

    async fn create_comment(&self, comment: &Comment) -> StoreResult<Comment>;

    async fn update_comment(&self, comment_id: Uuid, content: &str) -> StoreResult<Option<Comment>>;

    /// Deletes the comment with its reactions
    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<bool>;

    /// Page of a post's comments, oldest first
    async fn comments_by_post(
        &self,
        post_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Comment>>;

    async fn comment_ids_for_post(&self, post_id: Uuid) -> StoreResult<Vec<Uuid>>;

    async fn count_comments(&self, post_id: Uuid) -> StoreResult<i64>;
}

#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Accounts `follower_id` actively follows, blocked edges excluded
    async fn followee_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>>;

    async fn get_edge(&self, follower_id: Uuid, followee_id: Uuid)
        -> StoreResult<Option<FollowEdge>>;

    /// Insert or replace the edge for (follower, followee)
    async fn save_edge(&self, edge: &FollowEdge) -> StoreResult<FollowEdge>;

    /// Accounts actively following `followee_id`
    async fn follower_ids(&self, followee_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Active edges into `user_id`, most recently followed first
    async fn follower_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>>;

    /// Active edges out of `user_id`, most recently followed first
    async fn followee_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>>;

    /// Edges on which `user_id` blocked the other account, most recent first
    async fn blocked_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>>;

    async fn count_followers(&self, user_id: Uuid) -> StoreResult<i64>;

    async fn count_followees(&self, user_id: Uuid) -> StoreResult<i64>;
}

#[async_trait]
pub trait ReactionStore: Send + Sync {
    async fn find_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>>;

    /// Atomic upsert on (user, post, comment-or-null)
    async fn upsert_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
        kind: ReactionKind,
    ) -> StoreResult<UpsertOutcome>;

    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>>;

    /// Reactions on the target; `None` counts post-scoped reactions only
    async fn count_reactions(&self, post_id: Uuid, comment_id: Option<Uuid>) -> StoreResult<i64>;

    /// Per-kind counts on the target, kinds with no reactions omitted
    async fn reaction_breakdown(
        &self,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Vec<(ReactionKind, i64)>>;
}

/// Every store the services need, behind one handle
pub trait StorageBackend: PostStore + CommentStore + FollowStore + ReactionStore {}

impl<T> StorageBackend for T where T: PostStore + CommentStore + FollowStore + ReactionStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 25), 50);
        assert_eq!(page_offset(0, 10), 0);
    }
}
