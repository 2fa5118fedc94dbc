//! CLI entry point for codehostd.
//!
//! `serve` wires the store, the handshake orchestrator and the HTTP server
//! together; `keygen` and `check-config` are operator helpers.

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use codehost_auth::{
    AuthorizationOrchestrator, MemoryReplayGuard, ProviderRegistry, ReplayGuard, StateTokenCodec,
};
use codehost_store::{CodeHostStore, Database, StateLedger};
use codehost_web::{AppState, WebServer};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, LogFormat, ReplayBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the file only feeds CODEHOST_* overrides.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port, json } => cmd_serve(&cli.config, bind, port, json).await,
        Commands::Keygen => cmd_keygen(),
        Commands::CheckConfig => cmd_check_config(&cli.config),
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
fn init_tracing(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init(),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(
    config_path: &Path,
    bind: Option<String>,
    port: Option<u16>,
    json: bool,
) -> Result<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if json {
        config.log.format = LogFormat::Json;
    }

    init_tracing(&config.log.level, config.log.format);
    config.validate()?;

    let sealer = config.sealer()?;
    let codec = StateTokenCodec::new(
        config.signing_keys()?,
        config.auth.handshake.state_ttl(),
        config.auth.handshake.clock_skew(),
    );

    let db_path = config.store.db_path.clone();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::open_and_migrate(db_path.clone())
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    info!(path = %db_path.display(), "database ready");

    let hosts = CodeHostStore::new(db.clone(), sealer);
    let providers = ProviderRegistry::with_defaults(config.auth.handshake.exchange_timeout())
        .context("failed to build provider registry")?;

    let replay: Arc<dyn ReplayGuard> = match config.auth.replay {
        ReplayBackend::Ledger => {
            let ledger = StateLedger::new(db.clone());
            spawn_ledger_sweeper(ledger.clone(), config.auth.handshake.state_ttl());
            Arc::new(ledger)
        }
        ReplayBackend::Memory => Arc::new(MemoryReplayGuard::new(
            config.auth.handshake.state_ttl() + config.auth.handshake.clock_skew(),
        )),
    };

    info!(
        providers = ?providers.kinds(),
        replay = ?config.auth.replay,
        callback_url = %config.auth.handshake.callback_url,
        "authorization handshake configured"
    );

    let auth = AuthorizationOrchestrator::new(
        Arc::new(hosts.clone()),
        providers,
        codec,
        replay,
        config.auth.handshake.clone(),
    );

    let state = AppState {
        config: config.server.clone(),
        db,
        hosts,
        auth,
    };

    WebServer::new(state)
        .start(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("web server failed")?;

    info!("codehostd stopped");
    Ok(())
}

/// Drop expired fingerprints on a timer, so an idle service does not keep
/// them until the next callback.
fn spawn_ledger_sweeper(ledger: StateLedger, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = ledger.prune(chrono::Utc::now().timestamp()).await {
                warn!(error = %e, "failed to prune state ledger");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown signal received");
}

// ---------------------------------------------------------------------------
// Subcommand: keygen
// ---------------------------------------------------------------------------

fn cmd_keygen() -> Result<()> {
    let key = codehost_vault::keys::generate_key().context("failed to generate key")?;
    println!("{key}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check-config
// ---------------------------------------------------------------------------

fn cmd_check_config(config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    init_tracing("warn", config.log.format);
    config.validate()?;

    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };
    println!("configuration OK ({source})");
    println!("  listen:        {}:{}", config.server.bind_addr, config.server.port);
    println!("  database:      {}", config.store.db_path.display());
    println!("  callback url:  {}", config.auth.handshake.callback_url);
    println!("  signing keys:  {}", config.signing_keys()?.len());
    println!("  replay guard:  {:?}", config.auth.replay);
    Ok(())
}
