//! Recommendation routes

use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireUser;
use crate::domain::recommendation::RecommendRequest;
use crate::error::ApiResult;

/// POST /recommendations
///
/// One vendor per requested category, validated but not persisted.
pub async fn recommend(
    user: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecommendRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(user_id = %user.user_id, categories = ?req.categories, "Recommending vendors");

    let view = state
        .services
        .recommendations
        .recommend(user.user_id, &req.constraints, req.categories.as_deref())
        .await?;

    Ok(DataResponse::new(view))
}
