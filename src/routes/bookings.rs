//! Booking routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::bookings;
use crate::state::AppState;

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/bookings",
            get(bookings::list_my_bookings).post(bookings::create_booking),
        )
        .route("/api/bookings/availability", get(bookings::check_availability))
        .route("/api/bookings/admin/all", get(bookings::list_all_bookings))
        .route("/api/bookings/admin/analytics", get(bookings::booking_analytics))
        .route("/api/bookings/spot/:id", get(bookings::list_spot_bookings))
        .route(
            "/api/bookings/:id",
            get(bookings::get_booking)
                .put(bookings::update_booking)
                .delete(bookings::cancel_booking),
        )
        .route("/api/bookings/:id/check-in", post(bookings::check_in))
        .route("/api/bookings/:id/check-out", post(bookings::check_out))
        .route("/api/bookings/:id/extend", post(bookings::extend_booking))
        .route("/api/bookings/:id/rating", post(bookings::rate_booking))
        .route("/api/bookings/:id/status", put(bookings::update_booking_status))
}
