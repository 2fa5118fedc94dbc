//! Authorization handshake for code host integrations.
//!
//! This crate drives the two-phase OAuth authorization code handshake that
//! turns a user's consent at a code host (GitHub, GitLab, Gitee) into an
//! access token stored on the matching code host record:
//!
//! - **Initiate**: sign a state token binding the code host id and the
//!   caller's redirect URI, and build the provider's consent URL.
//! - **Complete**: verify and consume the state token from the callback,
//!   exchange the authorization code, and write only the token fields.
//!
//! State tokens are HMAC-signed and self-describing, so no handshake state
//! is stored between the two phases; a consume-once [`ReplayGuard`] keeps
//! each token single-use.
//!
//! # Architecture
//!
//! ```text
//! AuthorizationOrchestrator
//! ├── StateTokenCodec   (HMAC-SHA256 state tokens, key rotation)
//! ├── ProviderRegistry  (ProviderAdapter per kind, OAuthProvider built in)
//! ├── ReplayGuard       (StateLedger or MemoryReplayGuard)
//! └── CredentialStore   (CodeHostStore: get + update_tokens)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use codehost_auth::{
//!     AuthConfig, AuthorizationOrchestrator, ProviderRegistry, SigningKeys, StateTokenCodec,
//! };
//! use codehost_store::{CodeHostStore, Database, StateLedger};
//! use codehost_vault::Sealer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open_and_migrate("data/codehost.db").await?;
//! let config = AuthConfig::default();
//!
//! let orchestrator = AuthorizationOrchestrator::new(
//!     Arc::new(CodeHostStore::new(db.clone(), Sealer::ephemeral()?)),
//!     ProviderRegistry::with_defaults(config.exchange_timeout())?,
//!     StateTokenCodec::new(SigningKeys::ephemeral()?, config.state_ttl(), config.clock_skew()),
//!     Arc::new(StateLedger::new(db)),
//!     config,
//! );
//!
//! let consent_url = orchestrator.initiate(1, "https://ci.example.com/settings").await?;
//! println!("send the user to {consent_url}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod orchestrator;
pub mod provider;
pub mod replay;
pub mod state;

// Re-export key types at the crate root for convenience.
pub use config::AuthConfig;
pub use credentials::CredentialStore;
pub use error::{AuthError, Result};
pub use oauth::OAuthProvider;
pub use orchestrator::{
    AuthorizationOrchestrator, CallbackParams, CompletedHandshake, HandshakeFailure,
};
pub use provider::{ExchangeRequest, ProviderAdapter, ProviderRegistry};
pub use replay::{MemoryReplayGuard, ReplayGuard};
pub use state::{SigningKeys, StateClaims, StateTokenCodec, VerifiedState};
