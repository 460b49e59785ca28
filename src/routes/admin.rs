//! Admin routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::admin;
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/analytics", get(admin::analytics))
        .route("/api/admin/reports", get(admin::reports))
        .route("/api/admin/users", get(admin::list_users))
        .route(
            "/api/admin/users/:id",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/api/admin/spots/:id/approve", post(admin::approve_spot))
        .route("/api/admin/spots/:id/reject", post(admin::reject_spot))
}
