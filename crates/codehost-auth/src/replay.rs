//! Consume-once tracking for state tokens.
//!
//! Two implementations of [`ReplayGuard`]:
//!
//! - [`StateLedger`] (SQLite) is shared by every process pointing at the
//!   same database, so a callback replayed against another instance is
//!   still caught.
//! - [`MemoryReplayGuard`] keeps fingerprints in a `moka` cache; it only
//!   protects a single process.

use std::time::Duration;

use async_trait::async_trait;
use codehost_store::StateLedger;
use moka::future::Cache;

use crate::error::Result;

/// Upper bound on fingerprints held by [`MemoryReplayGuard`].
const MEMORY_GUARD_CAPACITY: u64 = 100_000;

/// Atomic consume-once set keyed by state token fingerprint.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Mark `fingerprint` consumed. `true` only for the first caller.
    ///
    /// `expires_at` (unix seconds) is when the token would expire anyway;
    /// the entry need not outlive it.
    async fn consume(&self, fingerprint: &str, expires_at: i64) -> Result<bool>;
}

#[async_trait]
impl ReplayGuard for StateLedger {
    async fn consume(&self, fingerprint: &str, expires_at: i64) -> Result<bool> {
        Ok(StateLedger::consume(self, fingerprint, expires_at).await?)
    }
}

/// In-process replay guard.
#[derive(Clone)]
pub struct MemoryReplayGuard {
    seen: Cache<String, ()>,
}

impl MemoryReplayGuard {
    /// `retention` must cover the state validity window plus clock skew.
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(MEMORY_GUARD_CAPACITY)
                .time_to_live(retention)
                .build(),
        }
    }
}

#[async_trait]
impl ReplayGuard for MemoryReplayGuard {
    async fn consume(&self, fingerprint: &str, _expires_at: i64) -> Result<bool> {
        let entry = self.seen.entry(fingerprint.to_string()).or_insert(()).await;
        Ok(entry.is_fresh())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use codehost_store::Database;

    use super::*;

    async fn exactly_one_winner(guard: Arc<dyn ReplayGuard>) {
        let expires = chrono::Utc::now().timestamp() + 600;
        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move {
                guard.consume("same", expires).await.unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn memory_guard_consumes_once() {
        let guard = MemoryReplayGuard::new(Duration::from_secs(60));
        assert!(guard.consume("fp", 0).await.unwrap());
        assert!(!guard.consume("fp", 0).await.unwrap());
        assert!(guard.consume("other", 0).await.unwrap());
    }

    #[tokio::test]
    async fn memory_guard_concurrent() {
        exactly_one_winner(Arc::new(MemoryReplayGuard::new(Duration::from_secs(60)))).await;
    }

    #[tokio::test]
    async fn ledger_guard_concurrent() {
        let db = Database::in_memory_migrated().await.unwrap();
        exactly_one_winner(Arc::new(StateLedger::new(db))).await;
    }
}
