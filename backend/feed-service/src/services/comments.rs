use crate::error::{AppError, Result};
use crate::models::{Comment, PostCounter};
use crate::services::invalidation::InvalidationHub;
use crate::services::validate_list_paging;
use crate::storage::StorageBackend;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn StorageBackend>,
    invalidation: InvalidationHub,
}

impl CommentService {
    pub fn new(store: Arc<dyn StorageBackend>, invalidation: InvalidationHub) -> Self {
        Self {
            store,
            invalidation,
        }
    }

    /// Add a comment, bump the post's comment counter and drop its cached engagement
    pub async fn create_comment(&self, user_id: Uuid, post_id: Uuid, content: &str) -> Result<Comment> {
        let content = validate_content(content)?;

        if self.store.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        let comment = self
            .store
            .create_comment(&Comment::new(post_id, user_id, content))
            .await?;
        self.adjust_comment_counter(post_id, 1).await;
        let cleared = self.invalidation.on_post_engagement_changed(post_id).await;

        info!(
            comment_id = %comment.id,
            post_id = %post_id,
            user_id = %user_id,
            cleared,
            "Comment created"
        );
        Ok(comment)
    }

    pub async fn get_comment(&self, comment_id: Uuid) -> Result<Comment> {
        self.store
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))
    }

    /// Page of the post's comments, oldest first
    pub async fn list_comments(&self, post_id: Uuid, page: u32, page_size: u32) -> Result<Vec<Comment>> {
        validate_list_paging(page, page_size)?;
        if self.store.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }
        Ok(self.store.comments_by_post(post_id, page, page_size).await?)
    }

    /// Only the comment's author may edit it
    pub async fn update_comment(&self, user_id: Uuid, comment_id: Uuid, content: &str) -> Result<Comment> {
        let content = validate_content(content)?;
        let comment = self.get_comment(comment_id).await?;
        if comment.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can edit this comment".to_string(),
            ));
        }

        let updated = self
            .store
            .update_comment(comment_id, content)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))?;

        info!(comment_id = %comment_id, post_id = %updated.post_id, "Comment updated");
        Ok(updated)
    }

    /// The comment's author or the post's author may delete it
    pub async fn delete_comment(&self, user_id: Uuid, comment_id: Uuid) -> Result<()> {
        let comment = self.get_comment(comment_id).await?;
        let post_author = self
            .store
            .get_post(comment.post_id)
            .await?
            .map(|post| post.user_id);
        if comment.user_id != user_id && post_author != Some(user_id) {
            return Err(AppError::Forbidden(
                "Only the comment or post author can delete this comment".to_string(),
            ));
        }

        if !self.store.delete_comment(comment_id).await? {
            return Err(AppError::NotFound(format!("Comment {} not found", comment_id)));
        }
        self.adjust_comment_counter(comment.post_id, -1).await;
        self.invalidation
            .on_comment_removed(comment.post_id, comment_id)
            .await;

        info!(comment_id = %comment_id, post_id = %comment.post_id, user_id = %user_id, "Comment deleted");
        Ok(())
    }

    /// Best effort, like the like counter: drift is repaired by reconciliation
    async fn adjust_comment_counter(&self, post_id: Uuid, delta: i32) {
        if let Err(e) = self
            .store
            .increment_counter(post_id, PostCounter::Comments, delta)
            .await
        {
            warn!(post_id = %post_id, delta, error = %e, "Comment counter not updated");
        }
    }
}

/// Trimmed content, rejected when empty or too long
fn validate_content(content: &str) -> Result<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("comment must not be empty".to_string()));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "comment must be at most {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(content)
}
