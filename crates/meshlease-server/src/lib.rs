//! HTTP server library for the virtual IP lease allocator: configuration,
//! shared state, middleware, and routes. `main.rs` wires these into a
//! running Axum server.

pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;
