//! HTTP handlers for the ParkSpot API

pub mod admin;
pub mod auth;
pub mod bookings;
mod extract;
pub mod health;
pub mod payments;
pub mod spots;

// Re-export the extractors handlers take
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, OptionalUser, SpotOwnerUser};
pub use extract::{ApiJson, ApiPath, ApiQuery};
