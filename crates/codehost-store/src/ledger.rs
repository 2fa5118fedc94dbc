//! Ledger of consumed authorization state tokens.
//!
//! A state token may complete at most one handshake. The ledger records a
//! fingerprint of every token that has been accepted, together with the
//! moment the token would have expired anyway; rows past that moment carry
//! no information and are pruned.

use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// Persistent consume-once set keyed by token fingerprint.
#[derive(Clone)]
pub struct StateLedger {
    db: Database,
}

impl StateLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Atomically mark `fingerprint` as consumed.
    ///
    /// Returns `true` if this call was the first to consume it and `false`
    /// if it had already been consumed. `expires_at` (unix seconds) bounds
    /// how long the entry must be retained.
    #[instrument(skip(self, fingerprint))]
    pub async fn consume(&self, fingerprint: &str, expires_at: i64) -> StoreResult<bool> {
        let fingerprint = fingerprint.to_string();
        let now = chrono::Utc::now().timestamp();

        let first = self
            .db
            .execute(move |conn| {
                delete_expired(conn, now)?;
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO consumed_states (fingerprint, expires_at) VALUES (?1, ?2)",
                    rusqlite::params![fingerprint, expires_at],
                )?;
                Ok(inserted == 1)
            })
            .await?;

        debug!(first, "state fingerprint consumed");
        Ok(first)
    }

    /// Remove entries whose expiry is before `now`. Returns the number removed.
    #[instrument(skip(self))]
    pub async fn prune(&self, now: i64) -> StoreResult<usize> {
        let removed = self
            .db
            .execute(move |conn| delete_expired(conn, now))
            .await?;

        if removed > 0 {
            debug!(removed, "pruned expired state fingerprints");
        }
        Ok(removed)
    }
}

fn delete_expired(conn: &rusqlite::Connection, now: i64) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM consumed_states WHERE expires_at < ?1",
        rusqlite::params![now],
    )?)
}
