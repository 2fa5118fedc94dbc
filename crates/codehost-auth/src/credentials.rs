//! The slice of the code host store the handshake depends on.

use async_trait::async_trait;
use codehost_store::{CodeHost, CodeHostStore, StoreError, TokenGrant};

use crate::error::{AuthError, Result};

/// Read a record and replace its token fields; nothing else.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load a code host. Missing records are [`AuthError::NotFound`].
    async fn get(&self, id: i64) -> Result<CodeHost>;

    /// Replace the token fields of an existing record.
    ///
    /// Must never create a record: a deleted id is [`AuthError::NotFound`].
    async fn update_tokens(&self, id: i64, grant: &TokenGrant) -> Result<()>;
}

fn map_store_error(id: i64, err: StoreError) -> AuthError {
    if err.is_not_found() {
        AuthError::NotFound { id }
    } else {
        AuthError::Store(err)
    }
}

#[async_trait]
impl CredentialStore for CodeHostStore {
    async fn get(&self, id: i64) -> Result<CodeHost> {
        CodeHostStore::get(self, id)
            .await
            .map_err(|e| map_store_error(id, e))
    }

    async fn update_tokens(&self, id: i64, grant: &TokenGrant) -> Result<()> {
        CodeHostStore::update_tokens(self, id, grant)
            .await
            .map_err(|e| map_store_error(id, e))
    }
}
