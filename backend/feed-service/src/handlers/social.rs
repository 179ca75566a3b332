//! Post, comment and follow-graph endpoints

use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ViewerId;
use crate::error::Result;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct UnfollowResponse {
    pub unfollowed: bool,
}

#[derive(Debug, Serialize)]
pub struct UnblockResponse {
    pub unblocked: bool,
}

/// POST /api/v1/posts
#[post("/posts")]
pub async fn create_post(
    viewer: ViewerId,
    body: web::Json<PostRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let PostRequest { content, image_url } = body.into_inner();
    let post = state.posts.create_post(viewer.0, &content, image_url).await?;

    metrics::record_mutation("post_create");
    Ok(HttpResponse::Created().json(post))
}

/// GET /api/v1/posts/{post_id}
#[get("/posts/{post_id}")]
pub async fn get_post(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let post = state.posts.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// PUT /api/v1/posts/{post_id}
#[put("/posts/{post_id}")]
pub async fn update_post(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    body: web::Json<PostRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let post = state
        .posts
        .update_post(
            viewer.0,
            path.into_inner(),
            &body.content,
            body.image_url.as_deref(),
        )
        .await?;

    metrics::record_mutation("post_update");
    Ok(HttpResponse::Ok().json(post))
}

/// DELETE /api/v1/posts/{post_id}
#[delete("/posts/{post_id}")]
pub async fn delete_post(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state.posts.delete_post(viewer.0, path.into_inner()).await?;

    metrics::record_mutation("post_delete");
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/posts/{post_id}/counters/reconcile
#[post("/posts/{post_id}/counters/reconcile")]
pub async fn reconcile_post_counters(
    _viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let post = state.reactions.reconcile_counters(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// POST /api/v1/posts/{post_id}/comments
#[post("/posts/{post_id}/comments")]
pub async fn create_comment(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    body: web::Json<CreateCommentRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let comment = state
        .comments
        .create_comment(viewer.0, path.into_inner(), &body.content)
        .await?;

    metrics::record_mutation("comment_create");
    Ok(HttpResponse::Created().json(comment))
}

/// GET /api/v1/posts/{post_id}/comments
#[get("/posts/{post_id}/comments")]
pub async fn list_comments(
    path: web::Path<Uuid>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let comments = state
        .comments
        .list_comments(path.into_inner(), query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// PUT /api/v1/comments/{comment_id}
#[put("/comments/{comment_id}")]
pub async fn update_comment(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    body: web::Json<CreateCommentRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let comment = state
        .comments
        .update_comment(viewer.0, path.into_inner(), &body.content)
        .await?;

    metrics::record_mutation("comment_update");
    Ok(HttpResponse::Ok().json(comment))
}

/// DELETE /api/v1/comments/{comment_id}
#[delete("/comments/{comment_id}")]
pub async fn delete_comment(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state
        .comments
        .delete_comment(viewer.0, path.into_inner())
        .await?;

    metrics::record_mutation("comment_delete");
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/users/{user_id}/follow
#[post("/users/{user_id}/follow")]
pub async fn follow_user(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edge = state.follows.follow(viewer.0, path.into_inner()).await?;

    metrics::record_mutation("follow");
    Ok(HttpResponse::Ok().json(edge))
}

/// DELETE /api/v1/users/{user_id}/follow
#[delete("/users/{user_id}/follow")]
pub async fn unfollow_user(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edge = state.follows.unfollow(viewer.0, path.into_inner()).await?;

    metrics::record_mutation("unfollow");
    Ok(HttpResponse::Ok().json(UnfollowResponse {
        unfollowed: edge.is_some(),
    }))
}

/// POST /api/v1/users/{user_id}/block
#[post("/users/{user_id}/block")]
pub async fn block_user(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edge = state.follows.block(viewer.0, path.into_inner()).await?;

    metrics::record_mutation("block");
    Ok(HttpResponse::Ok().json(edge))
}

/// DELETE /api/v1/users/{user_id}/block
#[delete("/users/{user_id}/block")]
pub async fn unblock_user(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edge = state.follows.unblock(viewer.0, path.into_inner()).await?;

    metrics::record_mutation("unblock");
    Ok(HttpResponse::Ok().json(UnblockResponse {
        unblocked: edge.is_some(),
    }))
}

/// GET /api/v1/users/{user_id}/followers
#[get("/users/{user_id}/followers")]
pub async fn list_followers(
    path: web::Path<Uuid>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edges = state
        .follows
        .followers(path.into_inner(), query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(edges))
}

/// GET /api/v1/users/{user_id}/following
#[get("/users/{user_id}/following")]
pub async fn list_following(
    path: web::Path<Uuid>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edges = state
        .follows
        .following(path.into_inner(), query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(edges))
}

/// GET /api/v1/users/{user_id}/follow-counts
#[get("/users/{user_id}/follow-counts")]
pub async fn follow_counts(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let counts = state.follows.follow_counts(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(counts))
}

/// GET /api/v1/users/{user_id}/relationship
#[get("/users/{user_id}/relationship")]
pub async fn relationship(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let relationship = state
        .follows
        .relationship(viewer.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(relationship))
}

/// GET /api/v1/users/{user_id}/mutual-followers
#[get("/users/{user_id}/mutual-followers")]
pub async fn mutual_followers(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let ids = state
        .follows
        .mutual_followers(viewer.0, path.into_inner(), query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(ids))
}

/// GET /api/v1/blocks
#[get("/blocks")]
pub async fn list_blocked(
    viewer: ViewerId,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let edges = state
        .follows
        .blocked_users(viewer.0, query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(edges))
}
