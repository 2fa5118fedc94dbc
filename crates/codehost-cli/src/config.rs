//! Service configuration for `codehostd`.
//!
//! Settings come from a TOML file (`config/default.toml` unless `--config`
//! says otherwise) with `[server]`, `[store]`, `[auth]` and `[log]`
//! sections. A missing file yields defaults. A handful of `CODEHOST_*`
//! environment variables override the file, and `.env` is loaded first so
//! they can live there during development.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use codehost_auth::{AuthConfig, SigningKeys};
use codehost_vault::{Sealer, keys};
use codehost_web::WebConfig;

pub const ENV_MASTER_KEY: &str = "CODEHOST_MASTER_KEY";
pub const ENV_SIGNING_KEYS: &str = "CODEHOST_SIGNING_KEYS";
pub const ENV_CALLBACK_URL: &str = "CODEHOST_CALLBACK_URL";
pub const ENV_DB_PATH: &str = "CODEHOST_DB_PATH";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: WebConfig,
    pub store: StoreSection,
    pub auth: AuthSection,
    pub log: LogSection,
}

/// `[store]`: where records live and how their secrets are sealed.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub db_path: PathBuf,
    /// Base64 AES-256 key sealing client secrets and tokens at rest.
    pub master_key: Option<String>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/codehost.db"),
            master_key: None,
        }
    }
}

impl fmt::Debug for StoreSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSection")
            .field("db_path", &self.db_path)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which consume-once set backs replay protection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayBackend {
    /// The `consumed_states` table; shared by every process on the database.
    #[default]
    Ledger,
    /// An in-process cache; single instance only.
    Memory,
}

/// `[auth]`: handshake tunables plus the state-token signing keys.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    #[serde(flatten)]
    pub handshake: AuthConfig,
    /// Comma-separated base64 keys, newest first.
    pub signing_keys: Option<String>,
    pub replay: ReplayBackend,
}

impl fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSection")
            .field("handshake", &self.handshake)
            .field(
                "signing_keys",
                &self.signing_keys.as_ref().map(|_| "<redacted>"),
            )
            .field("replay", &self.replay)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// `[log]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse `path` without looking at the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)
                .with_context(|| format!("failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `CODEHOST_*` variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_MASTER_KEY) {
            self.store.master_key = Some(key);
        }
        if let Some(keys) = get(ENV_SIGNING_KEYS) {
            self.auth.signing_keys = Some(keys);
        }
        if let Some(url) = get(ENV_CALLBACK_URL) {
            self.auth.handshake.callback_url = url;
        }
        if let Some(path) = get(ENV_DB_PATH) {
            self.store.db_path = PathBuf::from(path);
        }
    }

    // -----------------------------------------------------------------------
    // Derived values
    // -----------------------------------------------------------------------

    /// Build the column sealer from the master key.
    pub fn sealer(&self) -> Result<Sealer> {
        let Some(encoded) = self.store.master_key.as_deref() else {
            bail!(
                "no master key configured: set [store].master_key or {ENV_MASTER_KEY} \
                 (generate one with `codehostd keygen`)"
            );
        };
        let key = keys::decode_key(encoded).context("invalid master key")?;
        Sealer::new(&key).context("invalid master key")
    }

    /// Decode the state-token signing keys.
    pub fn signing_keys(&self) -> Result<SigningKeys> {
        let Some(encoded) = self.auth.signing_keys.as_deref() else {
            bail!(
                "no signing keys configured: set [auth].signing_keys or {ENV_SIGNING_KEYS} \
                 (generate one with `codehostd keygen`)"
            );
        };
        SigningKeys::from_base64_list(encoded).context("invalid signing keys")
    }

    /// Check everything `serve` needs before it touches the database.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_addr.trim().is_empty() {
            bail!("[server].bind_addr must not be empty");
        }
        if self.store.db_path.as_os_str().is_empty() {
            bail!("[store].db_path must not be empty");
        }
        self.auth
            .handshake
            .validate()
            .context("invalid [auth] section")?;
        self.sealer()?;
        self.signing_keys()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn key() -> String {
        keys::generate_key().unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server, WebConfig::default());
        assert_eq!(config.store.db_path, PathBuf::from("data/codehost.db"));
        assert_eq!(config.auth.handshake, AuthConfig::default());
        assert_eq!(config.auth.replay, ReplayBackend::Ledger);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Compact);
    }

    #[test]
    fn sections_parse() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            bind_addr = "0.0.0.0"
            port = 9090

            [store]
            db_path = "/var/lib/codehost/db.sqlite"

            [auth]
            callback_url = "https://ci.example.com/api/codehosts/callback"
            state_ttl_secs = 300
            replay = "memory"

            [log]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(
            config.store.db_path,
            PathBuf::from("/var/lib/codehost/db.sqlite")
        );
        assert_eq!(
            config.auth.handshake.callback_url,
            "https://ci.example.com/api/codehosts/callback"
        );
        assert_eq!(config.auth.handshake.state_ttl_secs, 300);
        // Untouched auth fields keep their defaults.
        assert_eq!(config.auth.handshake.exchange_retries, 2);
        assert_eq!(config.auth.replay, ReplayBackend::Memory);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(AppConfig::from_toml("[server\nport = 1").is_err());
        assert!(AppConfig::from_toml("[server]\nport = \"eighty\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn file_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codehost.toml");
        std::fs::write(&path, "[server]\nport = 7070\n").unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 7070);
    }

    #[test]
    fn env_overrides_file() {
        let mut config = AppConfig::from_toml(
            "[store]\ndb_path = \"file.db\"\n[auth]\ncallback_url = \"https://file/cb\"\n",
        )
        .unwrap();
        config.apply_env(env(&[
            (ENV_DB_PATH, "env.db"),
            (ENV_CALLBACK_URL, "https://env/cb"),
            (ENV_MASTER_KEY, "master"),
            (ENV_SIGNING_KEYS, "a,b"),
        ]));

        assert_eq!(config.store.db_path, PathBuf::from("env.db"));
        assert_eq!(config.auth.handshake.callback_url, "https://env/cb");
        assert_eq!(config.store.master_key.as_deref(), Some("master"));
        assert_eq!(config.auth.signing_keys.as_deref(), Some("a,b"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[(ENV_DB_PATH, "  "), (ENV_MASTER_KEY, "")]));
        assert_eq!(config.store.db_path, PathBuf::from("data/codehost.db"));
        assert!(config.store.master_key.is_none());
    }

    #[test]
    fn validate_requires_keys() {
        let mut config = AppConfig::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("master key"), "{err}");

        config.store.master_key = Some(key());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("signing keys"), "{err}");

        config.auth.signing_keys = Some(format!("{},{}", key(), key()));
        config.validate().unwrap();
        assert_eq!(config.signing_keys().unwrap().len(), 2);
    }

    #[test]
    fn validate_rejects_bad_keys() {
        let mut config = AppConfig::default();
        config.store.master_key = Some("c2hvcnQ=".into());
        config.auth.signing_keys = Some(key());
        assert!(config.validate().is_err());

        config.store.master_key = Some(key());
        config.auth.signing_keys = Some("not base64 !!".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_callback() {
        let mut config = AppConfig::default();
        config.store.master_key = Some(key());
        config.auth.signing_keys = Some(key());
        config.auth.handshake.callback_url = "/api/codehosts/callback".into();
        let err = format!("{:#}", config.validate().unwrap_err());
        assert!(err.contains("callback_url"), "{err}");
    }

    #[test]
    fn debug_redacts_keys() {
        let mut config = AppConfig::default();
        config.store.master_key = Some("master-key-material".into());
        config.auth.signing_keys = Some("signing-key-material".into());
        let out = format!("{config:?}");
        assert!(!out.contains("master-key-material"));
        assert!(!out.contains("signing-key-material"));
        assert!(out.contains("<redacted>"));
    }
}
