//! Middleware for the ParkSpot API
//!
//! Request tracing, rate limiting and authentication extractors.

pub mod auth;
mod rate_limiter;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser, OptionalUser, SpotOwnerUser};
pub use rate_limiter::{rate_limit, RateLimiter};
pub use self::tracing::{request_tracing, REQUEST_ID_HEADER};
