//! ParkSpot backend library
//!
//! Parking spot marketplace API: spot listings, bookings with conflict-free
//! reservation, a payment ledger and admin reporting.

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod routes;
pub mod spots;
pub mod state;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use middleware::RateLimiter;
use state::AppState;

/// Assemble every route and layer onto the shared state
pub fn build_router(app_state: AppState, config: &Config, rate_limiter: RateLimiter) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health::health_check))
        .merge(routes::auth_routes())
        .merge(routes::spot_routes())
        .merge(routes::booking_routes())
        .merge(routes::payment_routes())
        .merge(routes::admin_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit,
        ))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(config.cors_allowed_origins.as_deref()))
}

async fn root() -> &'static str {
    "ParkSpot API Server"
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.trim().is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
