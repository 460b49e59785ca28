//! Spot registry: listings, proximity search and rating aggregation

pub mod geo;
pub mod model;
pub mod service;

pub use model::*;
pub use service::SpotService;
