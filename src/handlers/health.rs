use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: String,
    version: &'static str,
}

/// GET /health
pub async fn health_check(State(pool): State<PgPool>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code, database) = match db::check_health(&pool).await {
        Ok(()) => ("healthy", StatusCode::OK, "connected".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE, "unreachable".to_string())
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
