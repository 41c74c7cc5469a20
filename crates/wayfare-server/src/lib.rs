//! HTTP server for Wayfare.
//!
//! Exposes booking, wallet and reconciliation endpoints over axum. Each
//! request's bearer token is resolved to a [`wayfare_types::Principal`]
//! once, and that principal is handed to the booking manager.

pub mod auth;
pub mod config;
pub mod demo;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{AuthProvider, Authenticated, Credentials, TokenAuthenticator};
pub use config::{ServerConfig, TokenGrant, WayfareConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::WayfareServer;
