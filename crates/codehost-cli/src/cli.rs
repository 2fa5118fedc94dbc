//! CLI argument definitions for codehostd.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// codehostd -- code host registry and OAuth handshake service.
#[derive(Parser)]
#[command(
    name = "codehostd",
    version,
    about = "codehostd -- code host registry and OAuth handshake service",
    long_about = "Stores code host integrations (GitHub, GitLab, Gitee, Gerrit) and runs the \
                  OAuth authorization code handshake that attaches access tokens to them."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Address to bind the HTTP server to (overrides `[server].bind_addr`).
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides `[server].port`).
        #[arg(long, short)]
        port: Option<u16>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Print a fresh random base64 key (master key or signing key).
    Keygen,

    /// Load and validate the configuration, then exit.
    CheckConfig,
}
