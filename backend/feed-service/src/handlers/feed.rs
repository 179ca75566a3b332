use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

use super::ViewerId;
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
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

/// GET /api/v1/feed
#[get("/feed")]
pub async fn get_feed(
    viewer: ViewerId,
    query: web::Query<FeedQueryParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    debug!(
        user_id = %viewer.0,
        page = query.page,
        page_size = query.page_size,
        "Getting feed"
    );

    let posts = state
        .feed
        .get_feed(viewer.0, query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}
