use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    /// Author
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub likes_count: Option<i32>,
    pub comments_count: Option<i32>,
    pub shares_count: Option<i32>,
}

impl Post {
    pub fn new(user_id: Uuid, content: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content: content.into(),
            image_url,
            created_at: Utc::now(),
            updated_at: None,
            likes_count: Some(0),
            comments_count: Some(0),
            shares_count: Some(0),
        }
    }

    pub fn likes(&self) -> i64 {
        self.likes_count.unwrap_or(0).into()
    }

    pub fn comments(&self) -> i64 {
        self.comments_count.unwrap_or(0).into()
    }

    pub fn shares(&self) -> i64 {
        self.shares_count.unwrap_or(0).into()
    }
}

/// Maintained counter on a post row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCounter {
    Likes,
    Comments,
    Shares,
}

impl PostCounter {
    pub fn column(&self) -> &'static str {
        match self {
            PostCounter::Likes => "likes_count",
            PostCounter::Comments => "comments_count",
            PostCounter::Shares => "shares_count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn new(post_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            content: content.into(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i16)]
pub enum ReactionKind {
    Like = 1,
    Love = 2,
    Haha = 3,
    Wow = 4,
    Sad = 5,
    Angry = 6,
    Dislike = 7,
    Care = 8,
}

/// Whether a reaction targets the post itself or one of its comments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum ReactionScope {
    Post = 1,
    Comment = 2,
}

impl ReactionScope {
    pub fn for_target(comment_id: Option<Uuid>) -> Self {
        match comment_id {
            Some(_) => ReactionScope::Comment,
            None => ReactionScope::Post,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub comment_id: Option<Uuid>,
    pub kind: ReactionKind,
    pub scope: ReactionScope,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(user_id: Uuid, post_id: Uuid, comment_id: Option<Uuid>, kind: ReactionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            post_id,
            comment_id,
            kind,
            scope: ReactionScope::for_target(comment_id),
            created_at: Utc::now(),
        }
    }
}

/// What a reaction upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertChange {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub reaction: Reaction,
    pub change: UpsertChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub is_following: bool,
    /// The followee follows back
    pub is_follower: bool,
    pub is_blocked: bool,
    pub followed_at: Option<DateTime<Utc>>,
    pub unfollowed_at: Option<DateTime<Utc>>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub unblocked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FollowEdge {
    /// Fresh edge with no relationship flags set
    pub fn new(follower_id: Uuid, followee_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            follower_id,
            followee_id,
            is_following: false,
            is_follower: false,
            is_blocked: false,
            followed_at: None,
            unfollowed_at: None,
            blocked_at: None,
            unblocked_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Counts toward the follower's candidate set
    pub fn is_active(&self) -> bool {
        self.is_following && !self.is_blocked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub user_id: Uuid,
    pub followers: i64,
    pub following: i64,
}

/// How the viewer and another account relate, read from both edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub user_id: Uuid,
    pub is_following: bool,
    pub is_followed_by: bool,
    pub is_blocked: bool,
    pub is_blocked_by: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub post: Post,
    pub score: f64,
}

/// Post as returned in an assembled feed page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub shares_count: i64,
    pub ranking_score: f64,
}

impl From<ScoredCandidate> for FeedPost {
    fn from(candidate: ScoredCandidate) -> Self {
        let ScoredCandidate { post, score } = candidate;
        FeedPost {
            likes_count: post.likes(),
            comments_count: post.comments(),
            shares_count: post.shares(),
            id: post.id,
            user_id: post.user_id,
            content: post.content,
            image_url: post.image_url,
            created_at: post.created_at,
            updated_at: post.updated_at,
            ranking_score: score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionStatus {
    pub post_id: Uuid,
    pub comment_id: Option<Uuid>,
    /// Total over every reaction kind
    pub likes_count: i64,
    pub has_reacted: bool,
    pub user_reaction: Option<ReactionKind>,
    pub reaction_counts: BTreeMap<ReactionKind, i64>,
}
