//! # codehost-store
//!
//! Storage engine for code host integrations.
//!
//! Provides SQLite-backed persistence with WAL mode for the registered code
//! host records and for the ledger of consumed authorization state tokens.
//! Secret columns (client secret, access and refresh tokens) are sealed with
//! [`codehost_vault::Sealer`] before they are written.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  CodeHostStore  (records, sealed secrets)│
//! │  StateLedger    (consume-once set)       │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL, spawn_blocking) │
//! │  Migrations (versioned, transactional)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use codehost_store::{CodeHostStore, Database, StateLedger};
//!
//! let db = Database::open_and_migrate("data/codehost.db").await?;
//! let hosts = CodeHostStore::new(db.clone(), sealer);
//! let ledger = StateLedger::new(db);
//! ```

pub mod codehost;
pub mod db;
pub mod error;
pub mod ledger;
pub mod migration;

// ── re-exports ───────────────────────────────────────────────────────

pub use codehost::{
    CodeHost, CodeHostFilter, CodeHostStore, CodeHostUpdate, NewCodeHost, ProviderKind,
    TokenGrant,
};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use ledger::StateLedger;
