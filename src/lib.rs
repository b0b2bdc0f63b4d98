//! Plant care platform backend library.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod http;
pub mod integrations;
pub mod jobs;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod users;

pub use config::AppConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
