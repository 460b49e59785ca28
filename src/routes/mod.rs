//! Route definitions for the ParkSpot API

mod admin;
mod auth;
mod bookings;
mod payments;
mod spots;

pub use admin::admin_routes;
pub use auth::auth_routes;
pub use bookings::booking_routes;
pub use payments::payment_routes;
pub use spots::spot_routes;
