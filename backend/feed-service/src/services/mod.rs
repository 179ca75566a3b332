//! Service layer for feed-service
//!
//! - feed: page assembly over candidates, scoring and the feed cache
//! - scoring: per-post relevance score
//! - candidates: followee posts with a global fallback
//! - reactions: reaction writes and derived counts
//! - invalidation: mutation -> stale cache entries
//! - comments, follow, posts: the remaining mutation paths and their reads

pub mod candidates;
pub mod comments;
pub mod feed;
pub mod follow;
pub mod invalidation;
pub mod posts;
pub mod reactions;
pub mod scoring;

pub use candidates::{CandidateSet, CandidateSource, CandidateSourceProvider};
pub use comments::CommentService;
pub use feed::FeedAssembler;
pub use follow::FollowService;
pub use invalidation::InvalidationHub;
pub use posts::PostService;
pub use reactions::ReactionAggregator;
pub use scoring::{ScoreEngine, ScoreWeights};

use crate::error::{AppError, Result};

/// Largest page served by the comment and follow-graph listings
pub const MAX_LIST_PAGE_SIZE: u32 = 100;

/// Paging check for list reads outside the feed
pub fn validate_list_paging(page: u32, page_size: u32) -> Result<()> {
    if page < 1 {
        return Err(AppError::Validation("page must be at least 1".to_string()));
    }
    if page_size < 1 || page_size > MAX_LIST_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "page_size must be between 1 and {}",
            MAX_LIST_PAGE_SIZE
        )));
    }
    Ok(())
}
