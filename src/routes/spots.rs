//! Parking spot routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::spots;
use crate::state::AppState;

pub fn spot_routes() -> Router<AppState> {
    Router::new()
        .route("/api/spots", get(spots::list_spots).post(spots::create_spot))
        .route("/api/spots/search", get(spots::search_spots))
        .route("/api/spots/nearby", get(spots::nearby_spots))
        .route("/api/spots/owner/my-spots", get(spots::my_spots))
        .route("/api/spots/user/favorites", get(spots::list_favorites))
        .route(
            "/api/spots/:id",
            get(spots::get_spot)
                .put(spots::update_spot)
                .delete(spots::delete_spot),
        )
        .route("/api/spots/:id/availability", put(spots::update_availability))
        .route("/api/spots/:id/rating", post(spots::rate_spot))
        .route(
            "/api/spots/:id/favorite",
            post(spots::add_favorite).delete(spots::remove_favorite),
        )
}
