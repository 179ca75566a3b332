//! Follow graph mutations and reads
//!
//! Each edge is directed (follower -> followee). `is_follower` on an edge
//! records that the followee follows back. Every change that alters the
//! follower's candidate set goes through the invalidation hub.

use crate::error::{AppError, Result};
use crate::models::{FollowCounts, FollowEdge, Relationship};
use crate::services::invalidation::InvalidationHub;
use crate::services::validate_list_paging;
use crate::storage::{page_offset, StorageBackend};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct FollowService {
    store: Arc<dyn StorageBackend>,
    invalidation: InvalidationHub,
}

impl FollowService {
    pub fn new(store: Arc<dyn StorageBackend>, invalidation: InvalidationHub) -> Self {
        Self {
            store,
            invalidation,
        }
    }

    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<FollowEdge> {
        ensure_distinct(follower_id, followee_id, "follow")?;

        if let Some(reverse) = self.store.get_edge(followee_id, follower_id).await? {
            if reverse.is_blocked {
                return Err(AppError::Forbidden(
                    "This account is not available to follow".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let mut edge = self
            .store
            .get_edge(follower_id, followee_id)
            .await?
            .unwrap_or_else(|| FollowEdge::new(follower_id, followee_id));
        if edge.is_blocked {
            return Err(AppError::Forbidden(
                "Unblock this account before following it".to_string(),
            ));
        }
        if edge.is_following {
            return Ok(edge);
        }

        let reverse_following = self.set_follows_back(followee_id, follower_id, true).await?;
        edge.is_following = true;
        edge.is_follower = reverse_following;
        edge.followed_at = Some(now);
        edge.updated_at = now;
        let saved = self.store.save_edge(&edge).await?;

        self.invalidation.on_follow_changed(follower_id).await;
        info!(follower_id = %follower_id, followee_id = %followee_id, "Followed");
        Ok(saved)
    }

    /// Returns the updated edge, or `None` when there was nothing to unfollow
    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<Option<FollowEdge>> {
        ensure_distinct(follower_id, followee_id, "unfollow")?;

        let Some(mut edge) = self.store.get_edge(follower_id, followee_id).await? else {
            return Ok(None);
        };
        if !edge.is_following {
            return Ok(None);
        }

        let now = Utc::now();
        edge.is_following = false;
        edge.unfollowed_at = Some(now);
        edge.updated_at = now;
        let saved = self.store.save_edge(&edge).await?;
        self.set_follows_back(followee_id, follower_id, false).await?;

        self.invalidation.on_follow_changed(follower_id).await;
        info!(follower_id = %follower_id, followee_id = %followee_id, "Unfollowed");
        Ok(Some(saved))
    }

    /// Block `blocked_id`, severing follows in both directions
    pub async fn block(&self, user_id: Uuid, blocked_id: Uuid) -> Result<FollowEdge> {
        ensure_distinct(user_id, blocked_id, "block")?;

        let now = Utc::now();
        let mut edge = self
            .store
            .get_edge(user_id, blocked_id)
            .await?
            .unwrap_or_else(|| FollowEdge::new(user_id, blocked_id));
        if edge.is_blocked {
            return Ok(edge);
        }

        if edge.is_following {
            edge.unfollowed_at = Some(now);
        }
        edge.is_blocked = true;
        edge.is_following = false;
        edge.is_follower = false;
        edge.blocked_at = Some(now);
        edge.updated_at = now;
        let saved = self.store.save_edge(&edge).await?;

        if let Some(mut reverse) = self.store.get_edge(blocked_id, user_id).await? {
            if reverse.is_following || reverse.is_follower {
                if reverse.is_following {
                    reverse.unfollowed_at = Some(now);
                }
                reverse.is_following = false;
                reverse.is_follower = false;
                reverse.updated_at = now;
                self.store.save_edge(&reverse).await?;
                self.invalidation.on_follow_changed(blocked_id).await;
            }
        }

        self.invalidation.on_follow_changed(user_id).await;
        info!(user_id = %user_id, blocked_id = %blocked_id, "Blocked");
        Ok(saved)
    }

    /// Returns the updated edge, or `None` when the account was not blocked
    pub async fn unblock(&self, user_id: Uuid, blocked_id: Uuid) -> Result<Option<FollowEdge>> {
        ensure_distinct(user_id, blocked_id, "unblock")?;

        let Some(mut edge) = self.store.get_edge(user_id, blocked_id).await? else {
            return Ok(None);
        };
        if !edge.is_blocked {
            return Ok(None);
        }

        let now = Utc::now();
        edge.is_blocked = false;
        edge.unblocked_at = Some(now);
        edge.updated_at = now;
        let saved = self.store.save_edge(&edge).await?;

        self.invalidation.on_follow_changed(user_id).await;
        info!(user_id = %user_id, blocked_id = %blocked_id, "Unblocked");
        Ok(Some(saved))
    }

    pub async fn followee_ids(&self, follower_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.store.followee_ids(follower_id).await?)
    }

    pub async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_edge(follower_id, followee_id)
            .await?
            .map(|edge| edge.is_active())
            .unwrap_or(false))
    }

    /// Whether `user_id` has blocked `other_id`
    pub async fn is_blocked(&self, user_id: Uuid, other_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_edge(user_id, other_id)
            .await?
            .map(|edge| edge.is_blocked)
            .unwrap_or(false))
    }

    pub async fn relationship(&self, viewer_id: Uuid, other_id: Uuid) -> Result<Relationship> {
        let (outgoing, incoming) = futures::try_join!(
            self.store.get_edge(viewer_id, other_id),
            self.store.get_edge(other_id, viewer_id),
        )?;
        Ok(Relationship {
            user_id: other_id,
            is_following: outgoing.as_ref().map(FollowEdge::is_active).unwrap_or(false),
            is_followed_by: incoming.as_ref().map(FollowEdge::is_active).unwrap_or(false),
            is_blocked: outgoing.map(|edge| edge.is_blocked).unwrap_or(false),
            is_blocked_by: incoming.map(|edge| edge.is_blocked).unwrap_or(false),
        })
    }

    pub async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts> {
        let (followers, following) = futures::try_join!(
            self.store.count_followers(user_id),
            self.store.count_followees(user_id),
        )?;
        Ok(FollowCounts {
            user_id,
            followers,
            following,
        })
    }

    pub async fn followers(&self, user_id: Uuid, page: u32, page_size: u32) -> Result<Vec<FollowEdge>> {
        validate_list_paging(page, page_size)?;
        Ok(self.store.follower_edges(user_id, page, page_size).await?)
    }

    pub async fn following(&self, user_id: Uuid, page: u32, page_size: u32) -> Result<Vec<FollowEdge>> {
        validate_list_paging(page, page_size)?;
        Ok(self.store.followee_edges(user_id, page, page_size).await?)
    }

    /// Accounts `user_id` has blocked, most recent first
    pub async fn blocked_users(&self, user_id: Uuid, page: u32, page_size: u32) -> Result<Vec<FollowEdge>> {
        validate_list_paging(page, page_size)?;
        Ok(self.store.blocked_edges(user_id, page, page_size).await?)
    }

    /// Accounts following both users, ordered by id
    pub async fn mutual_followers(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Uuid>> {
        validate_list_paging(page, page_size)?;
        let (mine, theirs) = futures::try_join!(
            self.store.follower_ids(user_id),
            self.store.follower_ids(other_id),
        )?;

        let theirs: HashSet<Uuid> = theirs.into_iter().collect();
        let mut mutual: Vec<Uuid> = mine.into_iter().filter(|id| theirs.contains(id)).collect();
        mutual.sort();
        let offset = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
        Ok(mutual.into_iter().skip(offset).take(page_size as usize).collect())
    }

    /// Update the mutual flag on the reverse edge; returns whether it is an active follow
    async fn set_follows_back(&self, from: Uuid, to: Uuid, follows_back: bool) -> Result<bool> {
        let Some(mut reverse) = self.store.get_edge(from, to).await? else {
            return Ok(false);
        };
        if !reverse.is_following {
            return Ok(false);
        }
        if reverse.is_follower != follows_back {
            reverse.is_follower = follows_back;
            reverse.updated_at = Utc::now();
            self.store.save_edge(&reverse).await?;
        }
        Ok(true)
    }
}

fn ensure_distinct(user_id: Uuid, other_id: Uuid, action: &str) -> Result<()> {
    if user_id == other_id {
        return Err(AppError::Validation(format!("Cannot {} yourself", action)));
    }
    Ok(())
}
