//! Key material and at-rest protection for code host secrets.
//!
//! Client secrets and OAuth tokens are sealed with AES-256-GCM before they
//! reach the database, and every key the service consumes (the master
//! sealing key, the state-token signing keys) is parsed and generated here.
//!
//! # Modules
//!
//! - [`crypto`] - AES-256-GCM encryption/decryption and secure randomness.
//! - [`keys`] - base64 key parsing and generation.
//! - [`sealer`] - string-in, string-out sealing for database columns.
//! - [`error`] - Unified error types.
//!
//! # Quick Start
//!
//! ```rust
//! use codehost_vault::{Sealer, keys};
//!
//! # fn example() -> codehost_vault::Result<()> {
//! let master_key = keys::decode_key(&keys::generate_key()?)?;
//! let sealer = Sealer::new(&master_key)?;
//!
//! let sealed = sealer.seal("gho_secret_token")?;
//! assert_eq!(sealer.open(&sealed)?, "gho_secret_token");
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod keys;
pub mod sealer;

pub use error::{Result, VaultError};
pub use sealer::Sealer;
