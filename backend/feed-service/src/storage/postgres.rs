//! PostgreSQL storage backend

use super::{page_offset, CommentStore, FollowStore, PostStore, ReactionStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Comment, FollowEdge, Post, PostCounter, Reaction, ReactionKind, ReactionScope, UpsertChange,
    UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const POST_COLUMNS: &str = "id, user_id, content, image_url, created_at, updated_at, \
     likes_count, comments_count, shares_count";

const REACTION_COLUMNS: &str = "id, user_id, post_id, comment_id, kind, scope, created_at";

const COMMENT_COLUMNS: &str = "id, post_id, user_id, content, created_at, updated_at";

const FOLLOW_COLUMNS: &str = "id, follower_id, followee_id, is_following, is_follower, \
     is_blocked, followed_at, unfollowed_at, blocked_at, unblocked_at, updated_at";

/// Upsert row carrying whether the statement inserted it
#[derive(sqlx::FromRow)]
struct ReactionWithFlag {
    id: Uuid,
    user_id: Uuid,
    post_id: Uuid,
    comment_id: Option<Uuid>,
    kind: ReactionKind,
    scope: ReactionScope,
    created_at: DateTime<Utc>,
    inserted: bool,
}

/// Unique violations surface as `Conflict`, everything else as a database error
fn insert_error(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        _ => StoreError::Database(err),
    }
}

/// Outcome of an upsert that changed no row. The row was just seen by the
/// conflicting insert, so its absence means a concurrent delete won.
fn unchanged_outcome(existing: Option<Reaction>) -> StoreResult<UpsertOutcome> {
    match existing {
        Some(reaction) => Ok(UpsertOutcome {
            reaction,
            change: UpsertChange::Unchanged,
        }),
        None => Err(StoreError::Conflict(
            "reaction was removed concurrently".to_string(),
        )),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, verify the pool and apply pending migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> StoreResult<Self> {
        debug!(
            max = max_connections,
            min = min_connections,
            "Creating database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        MIGRATOR.run(&pool).await?;

        info!("Database pool created and migrations applied");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts WHERE id = $1",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn create_post(&self, post: &Post) -> StoreResult<Post> {
        let created = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {cols}
            "#,
            cols = POST_COLUMNS
        ))
        .bind(post.id)
        .bind(post.user_id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(post.likes_count)
        .bind(post.comments_count)
        .bind(post.shares_count)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, "post"))?;
        Ok(created)
    }

    async fn update_post(
        &self,
        post_id: Uuid,
        content: &str,
        image_url: Option<&str>,
    ) -> StoreResult<Option<Post>> {
        let updated = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET content = $2, image_url = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            POST_COLUMNS
        ))
        .bind(post_id)
        .bind(content)
        .bind(image_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_post(&self, post_id: Uuid) -> StoreResult<bool> {
        // Comments and reactions go with the post through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Post>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }

        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {}
            FROM posts
            WHERE user_id = ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            POST_COLUMNS
        ))
        .bind(author_ids)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn recent_posts(&self, page: u32, page_size: u32) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {}
            FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
            POST_COLUMNS
        ))
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn increment_counter(
        &self,
        post_id: Uuid,
        counter: PostCounter,
        delta: i32,
    ) -> StoreResult<()> {
        let column = counter.column();
        sqlx::query(&format!(
            "UPDATE posts SET {col} = GREATEST(COALESCE({col}, 0) + $2, 0) WHERE id = $1",
            col = column
        ))
        .bind(post_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_counters(
        &self,
        post_id: Uuid,
        likes: i32,
        comments: i32,
    ) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET likes_count = $2, comments_count = $3
            WHERE id = $1
            RETURNING {}
            "#,
            POST_COLUMNS
        ))
        .bind(post_id)
        .bind(likes)
        .bind(comments)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {} FROM comments WHERE id = $1",
            COMMENT_COLUMNS
        ))
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn create_comment(&self, comment: &Comment) -> StoreResult<Comment> {
        let created = sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments ({cols})
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {cols}
            "#,
            cols = COMMENT_COLUMNS
        ))
        .bind(comment.id)
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, "comment"))?;
        Ok(created)
    }

    async fn update_comment(&self, comment_id: Uuid, content: &str) -> StoreResult<Option<Comment>> {
        let updated = sqlx::query_as::<_, Comment>(&format!(
            r#"
            UPDATE comments
            SET content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            COMMENT_COLUMNS
        ))
        .bind(comment_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<bool> {
        // The comment's reactions go through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn comments_by_post(
        &self,
        post_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            r#"
            SELECT {}
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn comment_ids_for_post(&self, post_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn count_comments(&self, post_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl FollowStore for PgStore {
    async fn followee_ids(&self, follower_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT followee_id
            FROM follows
            WHERE follower_id = $1 AND is_following AND NOT is_blocked
            "#,
        )
        .bind(follower_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_edge(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> StoreResult<Option<FollowEdge>> {
        let edge = sqlx::query_as::<_, FollowEdge>(&format!(
            "SELECT {} FROM follows WHERE follower_id = $1 AND followee_id = $2",
            FOLLOW_COLUMNS
        ))
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(edge)
    }

    async fn save_edge(&self, edge: &FollowEdge) -> StoreResult<FollowEdge> {
        let saved = sqlx::query_as::<_, FollowEdge>(&format!(
            r#"
            INSERT INTO follows ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (follower_id, followee_id) DO UPDATE
            SET is_following = EXCLUDED.is_following,
                is_follower = EXCLUDED.is_follower,
                is_blocked = EXCLUDED.is_blocked,
                followed_at = EXCLUDED.followed_at,
                unfollowed_at = EXCLUDED.unfollowed_at,
                blocked_at = EXCLUDED.blocked_at,
                unblocked_at = EXCLUDED.unblocked_at,
                updated_at = EXCLUDED.updated_at
            RETURNING {cols}
            "#,
            cols = FOLLOW_COLUMNS
        ))
        .bind(edge.id)
        .bind(edge.follower_id)
        .bind(edge.followee_id)
        .bind(edge.is_following)
        .bind(edge.is_follower)
        .bind(edge.is_blocked)
        .bind(edge.followed_at)
        .bind(edge.unfollowed_at)
        .bind(edge.blocked_at)
        .bind(edge.unblocked_at)
        .bind(edge.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn follower_ids(&self, followee_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT follower_id
            FROM follows
            WHERE followee_id = $1 AND is_following AND NOT is_blocked
            "#,
        )
        .bind(followee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn follower_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        let edges = sqlx::query_as::<_, FollowEdge>(&format!(
            r#"
            SELECT {}
            FROM follows
            WHERE followee_id = $1 AND is_following AND NOT is_blocked
            ORDER BY followed_at DESC NULLS LAST, id ASC
            LIMIT $2 OFFSET $3
            "#,
            FOLLOW_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    async fn followee_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        let edges = sqlx::query_as::<_, FollowEdge>(&format!(
            r#"
            SELECT {}
            FROM follows
            WHERE follower_id = $1 AND is_following AND NOT is_blocked
            ORDER BY followed_at DESC NULLS LAST, id ASC
            LIMIT $2 OFFSET $3
            "#,
            FOLLOW_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    async fn blocked_edges(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<FollowEdge>> {
        let edges = sqlx::query_as::<_, FollowEdge>(&format!(
            r#"
            SELECT {}
            FROM follows
            WHERE follower_id = $1 AND is_blocked
            ORDER BY blocked_at DESC NULLS LAST, id ASC
            LIMIT $2 OFFSET $3
            "#,
            FOLLOW_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    async fn count_followers(&self, user_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows WHERE followee_id = $1 AND is_following AND NOT is_blocked",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_followees(&self, user_id: Uuid) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows WHERE follower_id = $1 AND is_following AND NOT is_blocked",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl ReactionStore for PgStore {
    async fn find_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>> {
        let reaction = sqlx::query_as::<_, Reaction>(&format!(
            r#"
            SELECT {}
            FROM reactions
            WHERE user_id = $1 AND post_id = $2 AND comment_id IS NOT DISTINCT FROM $3
            "#,
            REACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(post_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reaction)
    }

    async fn upsert_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
        kind: ReactionKind,
    ) -> StoreResult<UpsertOutcome> {
        let candidate = Reaction::new(user_id, post_id, comment_id, kind);

        // xmax = 0 marks a freshly inserted row. The WHERE clause suppresses
        // no-op updates, in which case nothing is returned.
        let row = sqlx::query_as::<_, ReactionWithFlag>(&format!(
            r#"
            INSERT INTO reactions ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, post_id, (COALESCE(comment_id, '00000000-0000-0000-0000-000000000000'::uuid)))
            DO UPDATE SET kind = EXCLUDED.kind
            WHERE reactions.kind IS DISTINCT FROM EXCLUDED.kind
            RETURNING {cols}, (xmax = 0) AS inserted
            "#,
            cols = REACTION_COLUMNS
        ))
        .bind(candidate.id)
        .bind(candidate.user_id)
        .bind(candidate.post_id)
        .bind(candidate.comment_id)
        .bind(candidate.kind)
        .bind(candidate.scope)
        .bind(candidate.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let change = if row.inserted {
                UpsertChange::Inserted
            } else {
                UpsertChange::Updated
            };
            return Ok(UpsertOutcome {
                reaction: Reaction {
                    id: row.id,
                    user_id: row.user_id,
                    post_id: row.post_id,
                    comment_id: row.comment_id,
                    kind: row.kind,
                    scope: row.scope,
                    created_at: row.created_at,
                },
                change,
            });
        }

        let existing = self.find_reaction(user_id, post_id, comment_id).await?;
        unchanged_outcome(existing)
    }

    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Option<Reaction>> {
        let deleted = sqlx::query_as::<_, Reaction>(&format!(
            r#"
            DELETE FROM reactions
            WHERE user_id = $1 AND post_id = $2 AND comment_id IS NOT DISTINCT FROM $3
            RETURNING {}
            "#,
            REACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(post_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deleted)
    }

    async fn count_reactions(&self, post_id: Uuid, comment_id: Option<Uuid>) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM reactions
            WHERE post_id = $1 AND comment_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(post_id)
        .bind(comment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn reaction_breakdown(
        &self,
        post_id: Uuid,
        comment_id: Option<Uuid>,
    ) -> StoreResult<Vec<(ReactionKind, i64)>> {
        let rows = sqlx::query_as::<_, (ReactionKind, i64)>(
            r#"
            SELECT kind, COUNT(*)
            FROM reactions
            WHERE post_id = $1 AND comment_id IS NOT DISTINCT FROM $2
            GROUP BY kind
            ORDER BY kind
            "#,
        )
        .bind(post_id)
        .bind(comment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
