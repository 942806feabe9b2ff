pub mod auth;
pub mod rate_limit;
pub mod security;

pub use auth::{auth_middleware, AuthContext};
pub use rate_limit::rate_limit_middleware;
pub use security::header_sanitization_middleware;
