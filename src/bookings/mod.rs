//! Booking engine

pub mod model;
pub mod pass;
pub mod rules;
pub mod service;

pub use model::*;
pub use pass::BookingPass;
pub use service::BookingService;
