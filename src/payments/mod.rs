pub mod gateway;
pub mod model;
pub mod service;

pub use gateway::PaymentGateway;
pub use model::*;
pub use service::PaymentService;
