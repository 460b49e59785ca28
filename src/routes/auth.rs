//! Authentication routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::auth;
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me).put(auth::update_profile))
        .route("/api/auth/change-password", put(auth::change_password))
}
