//! Vendor routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireUser;
use crate::domain::vendors::SimilarVendorsQuery;
use crate::error::ApiResult;

/// GET /vendors/:vendor_id/similar
pub async fn similar_vendors(
    _user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(vendor_id): Path<Uuid>,
    Query(query): Query<SimilarVendorsQuery>,
) -> ApiResult<impl IntoResponse> {
    let vendors = state
        .services
        .recommendations
        .similar_vendors(vendor_id, query)
        .await?;

    Ok(DataResponse::new(vendors))
}
