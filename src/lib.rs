//! JWT authentication and role-gated user management over HTTP.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod state;
pub mod store;
pub mod users;

pub use error::AppError;
