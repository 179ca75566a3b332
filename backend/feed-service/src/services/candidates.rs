//! Candidate selection
//!
//! A feed page draws from posts by the viewer's active followees. When that
//! page is empty the same page of the global timeline is used instead.

use crate::error::Result;
use crate::models::Post;
use crate::storage::StorageBackend;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Where a page of candidates came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Followees,
    /// Most recent posts system-wide, used when the followee page is empty
    Global,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Followees => "followees",
            CandidateSource::Global => "global",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub posts: Vec<Post>,
    pub source: CandidateSource,
}

#[derive(Clone)]
pub struct CandidateSourceProvider {
    store: Arc<dyn StorageBackend>,
}

impl CandidateSourceProvider {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    /// The viewer's page of followee posts, or the global page when that is empty
    pub async fn candidates(&self, viewer_id: Uuid, page: u32, page_size: u32) -> Result<CandidateSet> {
        let followees = self.store.followee_ids(viewer_id).await?;
        let posts = self
            .store
            .posts_by_authors(&followees, page, page_size)
            .await?;

        if !posts.is_empty() {
            debug!(
                viewer_id = %viewer_id,
                followees = followees.len(),
                posts = posts.len(),
                "Followee candidates"
            );
            return Ok(CandidateSet {
                posts,
                source: CandidateSource::Followees,
            });
        }

        let posts = self.store.recent_posts(page, page_size).await?;
        debug!(
            viewer_id = %viewer_id,
            followees = followees.len(),
            posts = posts.len(),
            "No followee posts, using global candidates"
        );
        Ok(CandidateSet {
            posts,
            source: CandidateSource::Global,
        })
    }
}
