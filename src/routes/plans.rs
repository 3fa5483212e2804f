//! Plan routes
//!
//! AI generation, manual vendor selection, regeneration and reservations.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireUser;
use crate::domain::plans::{CreateReservationRequest, GeneratePlanRequest, SelectVendorRequest};
use crate::error::ApiResult;

/// POST /plans/ai-generate
///
/// `data` is null when no plan could be produced.
pub async fn generate_plan(
    user: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GeneratePlanRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(
        user_id = %user.user_id,
        users_info_id = %req.users_info_id,
        "Generating AI plan"
    );

    let plan = state
        .services
        .recommendations
        .generate_plan(user.user_id, req.users_info_id)
        .await?;

    Ok(DataResponse::new(plan))
}

/// GET /plans/:plan_id
pub async fn get_plan(
    user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let plan = state.services.plans.get_plan(plan_id, user.user_id).await?;
    Ok(DataResponse::new(plan))
}

/// POST /plans/:plan_id/items
pub async fn select_vendor(
    user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<SelectVendorRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(
        user_id = %user.user_id,
        plan_id = %plan_id,
        vendor_id = %req.vendor_id,
        "Selecting vendor"
    );

    let plan = state
        .services
        .plans
        .select_vendor(plan_id, user.user_id, req.vendor_id, req.service_item_id)
        .await?;

    Ok(DataResponse::new(plan))
}

/// POST /plans/:plan_id/vendors/:vendor_id/regenerate
pub async fn regenerate_vendor(
    user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((plan_id, vendor_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(
        user_id = %user.user_id,
        plan_id = %plan_id,
        vendor_id = %vendor_id,
        "Regenerating vendor"
    );

    let result = state
        .services
        .regeneration
        .regenerate(plan_id, vendor_id, user.user_id)
        .await?;

    Ok(DataResponse::new(result))
}

/// POST /plans/:plan_id/reservations
pub async fn create_reservation(
    user: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<impl IntoResponse> {
    let reservation = state
        .services
        .plans
        .create_reservation(plan_id, user.user_id, req.vendor_id, req.reserved_date)
        .await?;

    Ok(Created(reservation))
}
