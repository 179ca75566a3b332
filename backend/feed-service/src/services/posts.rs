use crate::error::{AppError, Result};
use crate::models::Post;
use crate::services::invalidation::InvalidationHub;
use crate::storage::StorageBackend;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_POST_CHARS: usize = 5000;

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn StorageBackend>,
    invalidation: InvalidationHub,
}

impl PostService {
    pub fn new(store: Arc<dyn StorageBackend>, invalidation: InvalidationHub) -> Self {
        Self {
            store,
            invalidation,
        }
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        content: &str,
        image_url: Option<String>,
    ) -> Result<Post> {
        validate_content(content)?;
        let post = self
            .store
            .create_post(&Post::new(author_id, content, image_url))
            .await?;

        info!(post_id = %post.id, author_id = %author_id, "Post created");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Post> {
        self.store
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))
    }

    /// Only the author may edit a post
    pub async fn update_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Post> {
        validate_content(content)?;
        self.require_author(user_id, post_id).await?;

        let post = self
            .store
            .update_post(post_id, content, image_url)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;
        // Content signals feed the cached scores
        self.invalidation.on_post_engagement_changed(post_id).await;

        info!(post_id = %post_id, "Post updated");
        Ok(post)
    }

    /// Only the author may delete a post
    pub async fn delete_post(&self, user_id: Uuid, post_id: Uuid) -> Result<()> {
        self.require_author(user_id, post_id).await?;

        // Read before the cascade removes them
        let comment_ids = self.store.comment_ids_for_post(post_id).await?;
        if !self.store.delete_post(post_id).await? {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }
        self.invalidation.on_post_removed(post_id, &comment_ids).await;

        info!(post_id = %post_id, comments = comment_ids.len(), "Post deleted");
        Ok(())
    }

    async fn require_author(&self, user_id: Uuid, post_id: Uuid) -> Result<Post> {
        let post = self.get_post(post_id).await?;
        if post.user_id != user_id {
            return Err(AppError::Forbidden(
                "Only the author can modify this post".to_string(),
            ));
        }
        Ok(post)
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("post content must not be empty".to_string()));
    }
    if content.chars().count() > MAX_POST_CHARS {
        return Err(AppError::Validation(format!(
            "post content must be at most {} characters",
            MAX_POST_CHARS
        )));
    }
    Ok(())
}
