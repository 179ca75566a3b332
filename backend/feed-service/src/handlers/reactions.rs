use actix_web::{delete, get, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ViewerId;
use crate::error::Result;
use crate::metrics;
use crate::models::ReactionKind;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertReactionRequest {
    pub kind: ReactionKind,
    pub comment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionTargetQuery {
    pub comment_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RemoveReactionResponse {
    pub removed: bool,
}

/// PUT /api/v1/posts/{post_id}/reactions
#[put("/posts/{post_id}/reactions")]
pub async fn upsert_reaction(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    body: web::Json<UpsertReactionRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let reaction = state
        .reactions
        .upsert(viewer.0, post_id, body.comment_id, body.kind)
        .await?;

    metrics::record_mutation("reaction_upsert");
    Ok(HttpResponse::Ok().json(reaction))
}

/// DELETE /api/v1/posts/{post_id}/reactions
#[delete("/posts/{post_id}/reactions")]
pub async fn remove_reaction(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    query: web::Query<ReactionTargetQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let removed = state
        .reactions
        .remove(viewer.0, post_id, query.comment_id)
        .await?;

    metrics::record_mutation("reaction_remove");
    Ok(HttpResponse::Ok().json(RemoveReactionResponse { removed }))
}

/// GET /api/v1/posts/{post_id}/reactions
#[get("/posts/{post_id}/reactions")]
pub async fn get_reaction_status(
    viewer: ViewerId,
    path: web::Path<Uuid>,
    query: web::Query<ReactionTargetQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    let status = state
        .reactions
        .reaction_status(post_id, viewer.0, query.comment_id)
        .await?;
    Ok(HttpResponse::Ok().json(status))
}
