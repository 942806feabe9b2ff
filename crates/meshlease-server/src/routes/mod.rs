pub mod auth;
pub mod leases;
pub mod sys;
