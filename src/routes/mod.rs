pub mod health;
pub mod plans;
pub mod recommendations;
pub mod vendors;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Recommendations
        .route("/recommendations", post(recommendations::recommend))
        // Plans
        .route("/plans/ai-generate", post(plans::generate_plan))
        .route("/plans/:plan_id", get(plans::get_plan))
        .route("/plans/:plan_id/items", post(plans::select_vendor))
        .route(
            "/plans/:plan_id/vendors/:vendor_id/regenerate",
            post(plans::regenerate_vendor),
        )
        .route(
            "/plans/:plan_id/reservations",
            post(plans::create_reservation),
        )
        // Vendors
        .route("/vendors/:vendor_id/similar", get(vendors::similar_vendors))
}
