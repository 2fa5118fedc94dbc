//! Code host registry persistence.
//!
//! Each row describes one external source-control instance the platform
//! integrates with: its provider kind, base address, owning namespace, the
//! OAuth application credentials registered with it, and (once a handshake
//! completed) the access/refresh tokens it granted.
//!
//! Secret columns are sealed with [`Sealer`]; plaintext only exists in the
//! [`CodeHost`] values handed back to callers. Provider fields and token
//! fields are written by separate statements so an administrative edit and
//! a completing handshake never overwrite each other's columns.

use chrono::{DateTime, Utc};
use codehost_vault::Sealer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// The kind of source-control provider behind a code host entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// github.com or GitHub Enterprise.
    GitHub,
    /// gitlab.com or a self-managed GitLab instance.
    GitLab,
    /// gitee.com.
    Gitee,
    /// Gerrit (HTTP credentials, no OAuth application support).
    Gerrit,
}

impl ProviderKind {
    /// All kinds, in declaration order.
    pub const ALL: [ProviderKind; 4] = [Self::GitHub, Self::GitLab, Self::Gitee, Self::Gerrit];

    /// Convert to the string stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Gitee => "gitee",
            Self::Gerrit => "gerrit",
        }
    }

    /// Parse from the string stored in SQLite.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(Self::GitHub),
            "gitlab" => Some(Self::GitLab),
            "gitee" => Some(Self::Gitee),
            "gerrit" => Some(Self::Gerrit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered code host with its secrets opened.
#[derive(Clone, Serialize, Deserialize)]
pub struct CodeHost {
    /// Stable identifier assigned at creation.
    pub id: i64,
    /// Provider kind; immutable after creation.
    pub kind: ProviderKind,
    /// Base URL of the provider instance, without a trailing slash.
    pub address: String,
    /// Organisational namespace used for filtering.
    pub owner: String,
    /// Optional display name.
    pub alias: Option<String>,
    /// OAuth application client id (empty until configured).
    pub client_id: String,
    /// OAuth application client secret.
    pub client_secret: Option<String>,
    /// Access token granted by the last successful handshake.
    pub access_token: Option<String>,
    /// Refresh token, when the provider issues one.
    pub refresh_token: Option<String>,
    /// When `access_token` stops being valid, if the provider said so.
    pub token_expiry: Option<DateTime<Utc>>,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Unix timestamp of the last write to any column.
    pub updated_at: i64,
}

impl CodeHost {
    /// A code host is ready once a handshake stored an access token.
    pub fn is_ready(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for CodeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeHost")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("alias", &self.alias)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

/// Fields accepted when registering a code host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCodeHost {
    pub kind: ProviderKind,
    pub address: String,
    pub owner: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Partial update of provider fields. `None` keeps the stored value.
///
/// Token fields are deliberately absent; see [`CodeHostStore::update_tokens`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeHostUpdate {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl CodeHostUpdate {
    /// Returns `true` when no field would change.
    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.owner.is_none()
            && self.alias.is_none()
            && self.client_id.is_none()
            && self.client_secret.is_none()
    }
}

/// Exact-match filters for [`CodeHostStore::list`], combined with AND.
#[derive(Debug, Clone, Default)]
pub struct CodeHostFilter {
    pub address: Option<String>,
    pub owner: Option<String>,
    pub kind: Option<ProviderKind>,
}

/// Token material produced by a completed authorization handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Validation
// ═══════════════════════════════════════════════════════════════════════

/// Validate and normalise a provider base address.
///
/// The address must be an absolute `http(s)` URL with a host; a trailing
/// slash is stripped so endpoint paths can be appended verbatim.
pub fn normalize_address(address: &str) -> StoreResult<String> {
    let trimmed = address.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|e| StoreError::InvalidArgument(format!("invalid address {trimmed:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(StoreError::InvalidArgument(format!(
            "address must be an http(s) URL with a host: {trimmed}"
        )));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

fn require_owner(owner: &str) -> StoreResult<String> {
    let owner = owner.trim();
    if owner.is_empty() {
        return Err(StoreError::InvalidArgument("owner must not be empty".into()));
    }
    Ok(owner.to_string())
}

// ═══════════════════════════════════════════════════════════════════════
//  CodeHostStore
// ═══════════════════════════════════════════════════════════════════════

const SELECT_COLUMNS: &str = "SELECT id, kind, address, owner, alias, client_id, client_secret, \
     access_token, refresh_token, token_expiry, created_at, updated_at FROM codehosts";

/// CRUD operations on code host records plus the token-only update used by
/// the authorization handshake.
#[derive(Clone)]
pub struct CodeHostStore {
    db: Database,
    sealer: Sealer,
}

impl CodeHostStore {
    /// Create a store backed by `db`, sealing secrets with `sealer`.
    pub fn new(db: Database, sealer: Sealer) -> Self {
        Self { db, sealer }
    }

    /// Register a new code host. Token fields start empty.
    #[instrument(skip(self, new), fields(kind = %new.kind))]
    pub async fn create(&self, new: NewCodeHost) -> StoreResult<CodeHost> {
        let address = normalize_address(&new.address)?;
        let owner = require_owner(&new.owner)?;
        let client_secret = self.sealer.seal_opt(new.client_secret.as_deref())?;
        let kind = new.kind.as_str();
        let alias = new.alias;
        let client_id = new.client_id.trim().to_string();
        let now = Utc::now().timestamp();

        let id = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO codehosts (kind, address, owner, alias, client_id, client_secret, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    rusqlite::params![kind, address, owner, alias, client_id, client_secret, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        info!(code_host_id = id, "code host created");
        self.get(id).await
    }

    /// Fetch a code host by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has this id.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> StoreResult<CodeHost> {
        let row = self
            .db
            .execute(move |conn| {
                let result = conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    rusqlite::params![id],
                    CodeHostRow::from_row,
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await?;

        let row = row.ok_or_else(|| StoreError::NotFound {
            entity: "codehost",
            id: id.to_string(),
        })?;
        row.open(&self.sealer)
    }

    /// List code hosts matching every set filter, ordered by id.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: CodeHostFilter) -> StoreResult<Vec<CodeHost>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1 = 1");
        let mut args: Vec<String> = Vec::new();

        if let Some(address) = filter.address.filter(|a| !a.is_empty()) {
            args.push(address.trim_end_matches('/').to_string());
            sql.push_str(&format!(" AND address = ?{}", args.len()));
        }
        if let Some(owner) = filter.owner.filter(|o| !o.is_empty()) {
            args.push(owner);
            sql.push_str(&format!(" AND owner = ?{}", args.len()));
        }
        if let Some(kind) = filter.kind {
            args.push(kind.as_str().to_string());
            sql.push_str(&format!(" AND kind = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY id ASC");

        let rows = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), CodeHostRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        debug!(count = rows.len(), "listed code hosts");
        rows.into_iter().map(|r| r.open(&self.sealer)).collect()
    }

    /// Update provider fields. Token columns are never touched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist and
    /// [`StoreError::InvalidArgument`] for a malformed address or blank owner.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: i64, update: CodeHostUpdate) -> StoreResult<CodeHost> {
        let address = update.address.as_deref().map(normalize_address).transpose()?;
        let owner = update.owner.as_deref().map(require_owner).transpose()?;
        let client_secret = self.sealer.seal_opt(update.client_secret.as_deref())?;
        let client_id = update.client_id.map(|c| c.trim().to_string());
        let alias = update.alias;
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE codehosts SET \
                       address = COALESCE(?2, address), \
                       owner = COALESCE(?3, owner), \
                       alias = COALESCE(?4, alias), \
                       client_id = COALESCE(?5, client_id), \
                       client_secret = COALESCE(?6, client_secret), \
                       updated_at = ?7 \
                     WHERE id = ?1",
                    rusqlite::params![id, address, owner, alias, client_id, client_secret, now],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "codehost",
                        id: id.to_string(),
                    });
                }
                Ok(())
            })
            .await?;

        info!(code_host_id = id, "code host updated");
        self.get(id).await
    }

    /// Replace the token fields of an existing record.
    ///
    /// This is a single `UPDATE ... WHERE id = ?`; it never inserts, so a
    /// record deleted concurrently stays deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record no longer exists.
    #[instrument(skip(self, grant))]
    pub async fn update_tokens(&self, id: i64, grant: &TokenGrant) -> StoreResult<()> {
        let access_token = self.sealer.seal(&grant.access_token)?;
        let refresh_token = self.sealer.seal_opt(grant.refresh_token.as_deref())?;
        let expiry = grant.expires_at.map(|e| e.timestamp());
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE codehosts SET access_token = ?2, refresh_token = ?3, token_expiry = ?4, updated_at = ?5 \
                     WHERE id = ?1",
                    rusqlite::params![id, access_token, refresh_token, expiry, now],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "codehost",
                        id: id.to_string(),
                    });
                }
                Ok(())
            })
            .await?;

        info!(code_host_id = id, "code host tokens stored");
        Ok(())
    }

    /// Delete a code host.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        self.db
            .execute(move |conn| {
                let deleted = conn.execute("DELETE FROM codehosts WHERE id = ?1", rusqlite::params![id])?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "codehost",
                        id: id.to_string(),
                    });
                }
                Ok(())
            })
            .await?;

        info!(code_host_id = id, "code host deleted");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row type
// ═══════════════════════════════════════════════════════════════════════

struct CodeHostRow {
    id: i64,
    kind: String,
    address: String,
    owner: String,
    alias: Option<String>,
    client_id: String,
    client_secret: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl CodeHostRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            address: row.get(2)?,
            owner: row.get(3)?,
            alias: row.get(4)?,
            client_id: row.get(5)?,
            client_secret: row.get(6)?,
            access_token: row.get(7)?,
            refresh_token: row.get(8)?,
            token_expiry: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn open(self, sealer: &Sealer) -> StoreResult<CodeHost> {
        let kind = ProviderKind::parse(&self.kind).ok_or_else(|| {
            StoreError::InvalidArgument(format!("unknown provider kind in row {}: {}", self.id, self.kind))
        })?;

        Ok(CodeHost {
            id: self.id,
            kind,
            address: self.address,
            owner: self.owner,
            alias: self.alias,
            client_id: self.client_id,
            client_secret: sealer.open_opt(self.client_secret.as_deref())?,
            access_token: sealer.open_opt(self.access_token.as_deref())?,
            refresh_token: sealer.open_opt(self.refresh_token.as_deref())?,
            token_expiry: self.token_expiry.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
