//! Admin reporting facade

pub mod model;
pub mod service;

pub use model::*;
pub use service::AdminService;
