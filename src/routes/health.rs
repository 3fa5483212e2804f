use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub plan_lock: String,
    pub recommendations: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let services = &state.services;
    let (db_ok, lock_result) = tokio::join!(
        db::health_check(&state.db),
        services.plan_lock.health_check(),
    );
    let provider_ok = services.recommendations.client().is_configured();

    let status = if db_ok && lock_result.is_ok() && provider_ok {
        "healthy"
    } else if db_ok {
        // The database is critical; a missing provider only disables AI features
        "degraded"
    } else {
        "unhealthy"
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: if db_ok { "ok" } else { "error" }.to_string(),
                plan_lock: match lock_result {
                    Ok(()) => services.plan_lock.backend().to_string(),
                    Err(_) => "error".to_string(),
                },
                recommendations: if provider_ok { "ok" } else { "unconfigured" }.to_string(),
            },
        }),
    )
}
