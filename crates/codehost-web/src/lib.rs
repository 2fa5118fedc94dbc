//! HTTP API for code host integrations.
//!
//! This crate exposes the code host registry and the authorization
//! handshake over HTTP:
//!
//! - CRUD routes for code host records, with secrets masked on read.
//! - `POST /api/codehosts/{id}/auth` to start a handshake (302 to the
//!   provider's consent page).
//! - `GET /api/codehosts/callback` for the provider redirect (always 302
//!   back to the originating UI).
//! - `GET /api/health` for liveness checks.

pub mod api;
pub mod error;
pub mod oauth;
pub mod server;
pub mod state;

use serde::{Deserialize, Serialize};

pub use error::ApiError;
pub use server::{WebServer, router};
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 8080,
        }
    }
}
