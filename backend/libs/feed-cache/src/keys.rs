//! Cache key schema
//!
//! Every key written to or removed from the cache is produced here. Callers
//! must never format keys by hand: the builder used to `set` an entry is the
//! same one used to remove it.

use uuid::Uuid;

/// Prefix of the per-(post, viewer) engagement score entries
const ENGAGEMENT_PREFIX: &str = "feed_score_";

/// Prefix of the per-(viewer, author) interaction counters
const INTERACTION_PREFIX: &str = "interaction_";

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Profile Keys =============
    //
    // Reserved: profile entries are written by the account service that
    // shares this cache. The templates live here so both sides agree.

    /// Format: Profile:Id:{id}
    pub fn profile_by_id(id: Uuid) -> String {
        format!("Profile:Id:{}", id)
    }

    /// Format: Profile:UserName:{userName}
    pub fn profile_by_user_name(user_name: &str) -> String {
        format!("Profile:UserName:{}", user_name)
    }

    // ============= Reaction Keys =============

    /// Reactor list of a post
    /// Format: Likes:Post:{postId}
    pub fn likes_by_post(post_id: Uuid) -> String {
        format!("Likes:Post:{}", post_id)
    }

    /// Reactor list of a comment
    /// Format: Likes:Comment:{commentId}
    pub fn likes_by_comment(comment_id: Uuid) -> String {
        format!("Likes:Comment:{}", comment_id)
    }

    /// Whether a user reacted to a post
    /// Format: Like:User:{userId}:Post:{postId}
    pub fn user_like_status(user_id: Uuid, post_id: Uuid) -> String {
        format!("Like:User:{}:Post:{}", user_id, post_id)
    }

    /// Whether a user reacted to a comment
    /// Format: Like:User:{userId}:Comment:{commentId}
    pub fn user_comment_like_status(user_id: Uuid, comment_id: Uuid) -> String {
        format!("Like:User:{}:Comment:{}", user_id, comment_id)
    }

    /// Format: LikesCount:Post:{postId}
    pub fn post_likes_count(post_id: Uuid) -> String {
        format!("LikesCount:Post:{}", post_id)
    }

    /// Format: LikesCount:Comment:{commentId}
    pub fn comment_likes_count(comment_id: Uuid) -> String {
        format!("LikesCount:Comment:{}", comment_id)
    }

    /// Per-kind reaction breakdown of a post
    /// Format: Reactions:Post:{postId}:Counts
    pub fn post_reaction_counts(post_id: Uuid) -> String {
        format!("Reactions:Post:{}:Counts", post_id)
    }

    /// Per-kind reaction breakdown of a comment
    /// Format: Reactions:Comment:{commentId}:Counts
    pub fn comment_reaction_counts(comment_id: Uuid) -> String {
        format!("Reactions:Comment:{}:Counts", comment_id)
    }

    /// Format: Reaction:User:{userId}:Post:{postId}:Type
    pub fn user_reaction_type(user_id: Uuid, post_id: Uuid) -> String {
        format!("Reaction:User:{}:Post:{}:Type", user_id, post_id)
    }

    /// Format: Reaction:User:{userId}:Comment:{commentId}:Type
    pub fn user_comment_reaction_type(user_id: Uuid, comment_id: Uuid) -> String {
        format!("Reaction:User:{}:Comment:{}:Type", user_id, comment_id)
    }

    /// Pattern matching every user's reaction status on a post
    pub fn user_like_status_pattern(post_id: Uuid) -> String {
        format!("Like:User:*:Post:{}", post_id)
    }

    /// Pattern matching every user's reaction status on a comment
    pub fn user_comment_like_status_pattern(comment_id: Uuid) -> String {
        format!("Like:User:*:Comment:{}", comment_id)
    }

    /// Pattern matching every user's reaction kind on a post
    pub fn user_reaction_type_pattern(post_id: Uuid) -> String {
        format!("Reaction:User:*:Post:{}:Type", post_id)
    }

    /// Pattern matching every user's reaction kind on a comment
    pub fn user_comment_reaction_type_pattern(comment_id: Uuid) -> String {
        format!("Reaction:User:*:Comment:{}:Type", comment_id)
    }

    // ============= Feed Keys =============

    /// Assembled feed page
    /// Format: feed:{userId}:page:{pageNumber}:size:{pageSize}
    pub fn feed_page(user_id: Uuid, page: u32, page_size: u32) -> String {
        format!("feed:{}:page:{}:size:{}", user_id, page, page_size)
    }

    /// Pattern matching every cached feed page of a user
    pub fn feed_pattern(user_id: Uuid) -> String {
        format!("feed:{}:page:*", user_id)
    }

    // ============= Scoring Keys =============

    /// Decayed weighted engagement count of a post as seen by a viewer
    /// Format: feed_score_{postId}_{viewerId}
    pub fn engagement_score(post_id: Uuid, viewer_id: Uuid) -> String {
        format!("{}{}_{}", ENGAGEMENT_PREFIX, post_id, viewer_id)
    }

    /// Pattern matching the engagement entries of a post for every viewer
    pub fn engagement_pattern(post_id: Uuid) -> String {
        format!("{}{}_*", ENGAGEMENT_PREFIX, post_id)
    }

    /// Interaction counter between a viewer and an author
    /// Format: interaction_{viewerId}_{authorId}
    pub fn interaction(viewer_id: Uuid, author_id: Uuid) -> String {
        format!("{}{}_{}", INTERACTION_PREFIX, viewer_id, author_id)
    }

    // ============= Utility =============

    /// Namespace of a key, used as a low-cardinality metrics label
    pub fn namespace(key: &str) -> &str {
        if let Some((head, _)) = key.split_once(':') {
            return head;
        }
        if key.starts_with(ENGAGEMENT_PREFIX) {
            "feed_score"
        } else if key.starts_with(INTERACTION_PREFIX) {
            "interaction"
        } else {
            "unknown"
        }
    }
}
