//! Authentication: password accounts and JWT access tokens

pub mod jwt;
pub mod service;

pub use jwt::{generate_token, verify_token, Claims, JwtError};
pub use service::AuthService;
