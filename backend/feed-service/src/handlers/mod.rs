pub mod feed;
pub mod reactions;
pub mod social;

use actix_web::{dev::Payload, get, web, FromRequest, HttpRequest, HttpResponse};
use futures::future::{ready, Ready};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub use feed::get_feed;
pub use reactions::{get_reaction_status, remove_reaction, upsert_reaction};
pub use social::{
    block_user, create_comment, create_post, delete_comment, delete_post, follow_counts,
    follow_user, get_post, list_blocked, list_comments, list_followers, list_following,
    mutual_followers, reconcile_post_counters, relationship, unblock_user, unfollow_user,
    update_comment, update_post,
};

/// Header carrying the authenticated viewer, set by the identity layer
pub const VIEWER_HEADER: &str = "X-User-Id";

/// Authenticated viewer of the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerId(pub Uuid);

impl FromRequest for ViewerId {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let viewer = req
            .headers()
            .get(VIEWER_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", VIEWER_HEADER)))
            .and_then(|value| {
                Uuid::parse_str(value.trim())
                    .map(ViewerId)
                    .map_err(|_| AppError::Unauthorized("Invalid user ID".to_string()))
            });
        ready(viewer)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cache: &'static str,
}

/// Liveness plus cache reachability; a down cache only degrades the service
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let cache = match state.cache.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Cache ping failed");
            "degraded"
        }
    };
    HttpResponse::Ok().json(HealthResponse { status: "ok", cache })
}

#[get("/metrics")]
pub async fn metrics() -> HttpResponse {
    match crate::metrics::render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Metrics encoding failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Register every route on the app
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(metrics).service(
        web::scope("/api/v1")
            .service(get_feed)
            .service(create_post)
            .service(get_post)
            .service(update_post)
            .service(delete_post)
            .service(reconcile_post_counters)
            .service(upsert_reaction)
            .service(remove_reaction)
            .service(get_reaction_status)
            .service(create_comment)
            .service(list_comments)
            .service(update_comment)
            .service(delete_comment)
            .service(follow_user)
            .service(unfollow_user)
            .service(block_user)
            .service(unblock_user)
            .service(list_followers)
            .service(list_following)
            .service(follow_counts)
            .service(relationship)
            .service(mutual_followers)
            .service(list_blocked),
    );
}
