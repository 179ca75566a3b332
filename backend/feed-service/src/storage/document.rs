//! Embedded document storage backend
//!
//! Each collection is a concurrent map keyed by its natural identity.
//! Reaction upserts go through the map's per-key entry API, so concurrent
//! upserts on the same (user, post, comment) tuple leave exactly one document.

use super::{page_offset, CommentStore, FollowStore, PostStore, ReactionStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Comment, FollowEdge, Post, PostCounter, Reaction, ReactionKind, UpsertChange, UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// (user, post, comment-or-null)
type ReactionKey = (Uuid, Uuid, Option<Uuid>);

#[derive(Debug, Default)]
pub struct DocumentStore {
    posts: DashMap<Uuid, Post>,
    comments: DashMap<Uuid, Comment>,
    follows: DashMap<(Uuid, Uuid), FollowEdge>,
    reactions: DashMap<ReactionKey, Reaction>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first, ties by id descending
    fn page_of(mut posts: Vec<Post>, page: u32, page_size: u32) -> Vec<Post> {
        posts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        skip_to_page(posts, page, page_size)
    }

    fn targets(reaction: &Reaction, post_id: Uuid, comment_id: Option<Uuid>) -> bool {
        reaction.post_id == post_id && reaction.comment_id == comment_id
    }

    /// Edges matching `keep`, latest `at` first with undated edges last, ties by id
    fn page_of_edges(
        &self,
        keep: impl Fn(&FollowEdge) -> bool,
        at: fn(&FollowEdge) -> Option<DateTime<Utc>>,
        page: u32,
        page_size: u32,
    ) -> Vec<FollowEdge> {
        let mut edges: Vec<FollowEdge> = self
            .follows
            .iter()
            .filter(|edge| keep(edge))
            .map(|edge| edge.clone())
            .collect();
        edges.sort_by(|a, b| at(b).cmp(&at(a)).then_with(|| a.id.cmp(&b.id)));
        skip_to_page(edges, page, page_size)
    }
}

fn skip_to_page<T>(items: Vec<T>, page: u32, page_size: u32) -> Vec<T> {
    let offset = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
    items
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect()
}

fn clamp_counter(value: i64) -> i32 {
    i32::try_from(value.max(0)).unwrap_or(i32::MAX)
}

#[async_trait]
impl PostStore for DocumentStore {
    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        Ok(self.posts.get(&post_id).map(|post| post.clone()))
    }

    async fn create_post(&self, post: &Post) -> StoreResult<Post> {
        match self.posts.entry(post.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict("post already exists".to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(post.clone());
                Ok(post.clone())
            }
        }
    }

    async fn update_post(
        &self,
        post_id: Uuid,
        content: &str,
        image_url: Option<&str>,
    ) -> StoreResult<Option<Post>> {
        Ok(self.posts.get_mut(&post_id).map(|mut post| {
            post.content = content.to_string();
            post.image_url = image_url.map(str::to_string);
            post.updated_at = Some(Utc::now());
            post.clone()
        }))
    }

    async fn delete_post(&self, post_id: Uuid) -> StoreResult<bool> {
        let removed = self.posts.remove(&post_id).is_some();
        if removed {
            self.comments.retain(|_, comment| comment.post_id != post_id);
            self.reactions.retain(|_, reaction| reaction.post_id != post_id);
        }
        Ok(removed)
    }

    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Post>> {
        let authors: HashSet<&Uuid> = author_ids.iter().collect();
        let posts = self
            .posts
            .iter()
            .filter(|post| authors.contains(&post.user_id))
            .map(|post| post.clone())
            .collect();
        Ok(Self::page_of(posts, page, page_size))
    }

    async fn recent_posts(&self, page: u32, page_size: u32) -> StoreResult<Vec<Post>> {
        let posts = self.posts.iter().map(|post| post.clone()).collect();
        Ok(Self::page_of(posts, page, page_size))
    }

    async fn increment_counter(
        &self,
        post_id: Uuid,
        counter: PostCounter,
        delta: i32,
    ) -> StoreResult<()> {
        if let Some(mut post) = self.posts.get_mut(&post_id) {
            let slot = match counter {
                PostCounter::Likes => &mut post.likes_count,
                PostCounter::Comments => &mut post.comments_count,
                PostCounter::Shares => &mut post.shares_count,
            };
            let current = i64::from(slot.unwrap_or(0));
            *slot = Some(clamp_counter(current + i64::from(delta)));
        }
        Ok(())
    }

    async fn set_counters(
        &self,
        post_id: Uuid,
        likes: i32,
        comments: i32,
    ) -> StoreResult<Option<Post>> {
        Ok(self.posts.get_mut(&post_id).map(|mut post| {
            post.likes_count = Some(likes);
            post.comments_count = Some(comments);
            post.clone()
        }))
    }
}

#[async_trait]
impl CommentStore for DocumentStore {
    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        Ok(self.comments.get(&comment_id).map(|comment| comment.clone()))
    }

    async fn create_comment(&self, comment: &Comment) -> StoreResult<Comment> {
        match self.comments.entry(comment.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict("comment already exists".to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(comment.clone());
                Ok(comment.clone())
            }
        }
    }

    async fn update_comment(&self, comment_id: Uuid, content: &str) -> StoreResult<Option<Comment>> {
        Ok(self.comments.get_mut(&comment_id).map(|mut comment| {
            comment.content = content.to_string();
            comment.updated_at = Some(Utc::now());
            comment.clone()
        }))
    }

    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<bool> {
        let removed = self.comments.remove(&comment_id).is_some();
        if removed {
            self.reactions
                .retain(|_, reaction| reaction.comment_id != Some(comment_id));
        }
        Ok(removed)
    }

    async fn comments_by_post(
        &self,
        post_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| comment.clone())
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(skip_to_page(comments, page, page_size))
    }

    async fn comment_ids_for_post(&self, post_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| comment.id)
            .collect())
    }

    async fn count_comments(&self, post_id: Uuid) -> StoreResult<i64> {
        let count = self
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl FollowStore for DocumentStore {
    async fn followee_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .follows
            .iter()
            .filter(|edge| edge.follower_id == follower_id && edge.is_active())
            .map(|edge| edge.followee_id)
            .collect())
    }

    async fn get_edge(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        Ok(self
            .follows
            .get(&(follower_id, followee_id))
            .map(|edge| edge.clone()))
    }

    async fn save_edge(&self, edge: &FollowEdge) -> StoreResult<FollowEdge> {
        let saved = match self.follows.entry((edge.follower_id, edge.followee_id)) {
            Entry::Occupied(mut occupied) => {
                // Keep the stored document id on replace
                let id = occupied.get().id;
                let replacement = FollowEdge { id, ..edge.clone() };
                occupied.insert(replacement.clone());
                replacement
            }
            Entry::Vacant(vacant) => {
                vacant.insert(edge.clone());
                edge.clone()
            }
        };
        Ok(saved)
    }

    async fn follower_ids(&self, followee_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .follows
            .iter()
            .filter(|edge| edge.followee_id == followee_id && edge.is_active())
            .map(|edge| edge.follower_id)
            .collect())
    }

    async fn follower_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        Ok(self.page_of_edges(
            |edge| edge.followee_id == user_id && edge.is_active(),
            |edge| edge.followed_at,
            page,
            page_size,
        ))
    }

    async fn followee_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        Ok(self.page_of_edges(
            |edge| edge.follower_id == user_id && edge.is_active(),
            |edge| edge.followed_at,
            page,
            page_size,
        ))
    }

    async fn blocked_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        Ok(self.page_of_edges(
            |edge| edge.follower_id == user_id && edge.is_blocked,
            |edge| edge.blocked_at,
            page,
            page_size,
        ))
    }

    async fn count_followers(&self, user_id: Uuid) -> StoreResult<i64> {
        let count = self
            .follows
            .iter()
            .filter(|edge| edge.followee_id == user_id && edge.is_active())
            .count();
        Ok(count as i64)
    }

    async fn count_followees(&self, user_id: Uuid) -> StoreResult<i64> {
        let count = self
            .follows
            .iter()
            .filter(|edge| edge.follower_id == user_id && edge.is_active())
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl ReactionStore for DocumentStore {
    async fn find_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>> {
        Ok(self
            .reactions
            .get(&(user_id, post_id, comment_id))
            .map(|reaction| reaction.clone()))
    }

    async fn upsert_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
        kind: ReactionKind,
    ) -> StoreResult<UpsertOutcome> {
        let outcome = match self.reactions.entry((user_id, post_id, comment_id)) {
            Entry::Occupied(mut occupied) => {
                let reaction = occupied.get_mut();
                let change = if reaction.kind == kind {
                    UpsertChange::Unchanged
                } else {
                    reaction.kind = kind;
                    UpsertChange::Updated
                };
                UpsertOutcome {
                    reaction: reaction.clone(),
                    change,
                }
            }
            Entry::Vacant(vacant) => {
                let reaction = Reaction::new(user_id, post_id, comment_id, kind);
                vacant.insert(reaction.clone());
                UpsertOutcome {
                    reaction,
                    change: UpsertChange::Inserted,
                }
            }
        };
        Ok(outcome)
    }

    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>> {
        Ok(self
            .reactions
            .remove(&(user_id, post_id, comment_id))
            .map(|(_, reaction)| reaction))
    }

    async fn count_reactions(&self, post_id: Uuid, comment_id: Option<Uuid>) -> StoreResult<i64> {
        let count = self
            .reactions
            .iter()
            .filter(|reaction| Self::targets(reaction, post_id, comment_id))
            .count();
        Ok(count as i64)
    }

    async fn reaction_breakdown(
        &self,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Vec<(ReactionKind, i64)>> {
        let mut counts: BTreeMap<ReactionKind, i64> = BTreeMap::new();
        for reaction in self.reactions.iter() {
            if Self::targets(&reaction, post_id, comment_id) {
                *counts.entry(reaction.kind).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}
