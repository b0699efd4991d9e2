//! Hub - command-line client for the Hub API.
//!
//! Main entry point for the `hub` CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use hub_client::{HubClient, config};

mod commands;

use commands::{
    call, check_username, exchange, login, logout, notices, proof, register, whoami,
};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Hub - command-line client for the Hub API
#[derive(Parser)]
#[command(name = "hub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (overrides the config file)
    #[arg(long, global = true, env = "HUB_SERVER_URL")]
    pub server: Option<String>,

    /// Path to the config file
    #[arg(long, global = true, env = "HUB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with username and password
    Login(login::LoginArgs),

    /// Exchange the social-login cookie for an access token
    Exchange(exchange::ExchangeArgs),

    /// Create a new account
    Register(register::RegisterArgs),

    /// Check whether a username is still available
    CheckUsername(check_username::CheckUsernameArgs),

    /// Show the signed-in user
    Whoami(whoami::WhoamiArgs),

    /// Print a DPoP proof for a method and URL
    Proof(proof::ProofArgs),

    /// Call any endpoint through the authenticated pipeline
    Call(call::CallArgs),

    /// Sign out and destroy the device key
    Logout(logout::LogoutArgs),

    /// Show notification history
    Notices(notices::NoticesArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(config::default_config_path);
    let mut client_config = match &config_path {
        Some(path) => config::load_config_or_default(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => hub_client::ClientConfig::default(),
    };
    if let Some(server) = cli.server {
        client_config.base_url = Some(server);
    }
    // The CLI always persists keys and session, so pin the data directory.
    if client_config.data_dir.is_none() {
        client_config.data_dir = client_config.effective_data_dir();
    }
    let data_dir = client_config
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "hub=debug,hub_client=debug,hub_dpop=debug,info"
    } else {
        "hub=info,hub_client=warn,hub_dpop=warn,warn"
    };

    let log_dir = data_dir.join("logs");
    let file_appender = tracing_appender::rolling::daily(&log_dir, "hub.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "hub=trace,hub_client=trace,hub_dpop=trace,info",
                )),
        )
        .init();

    let client = HubClient::builder()
        .config(client_config)
        .build()
        .context("Failed to create client (is the server URL set?)")?;

    let notices_path = data_dir.join(commands::NOTICES_FILE);
    client.restore_session().await?;
    client.notices().load_history(&notices_path).await?;

    let ctx = commands::Context {
        client: client.clone(),
        json_output: cli.json,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Exchange(args) => exchange::run(args, &ctx).await,
        Commands::Register(args) => register::run(args, &ctx).await,
        Commands::CheckUsername(args) => check_username::run(args, &ctx).await,
        Commands::Whoami(args) => whoami::run(args, &ctx).await,
        Commands::Proof(args) => proof::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Logout(args) => logout::run(args, &ctx).await,
        Commands::Notices(args) => notices::run(args, &ctx).await,
    };

    // Surface anything raised during the command, let a pending rotation
    // confirm reach the server, then persist state even when the command
    // failed: a failed rotation still changes the session.
    commands::print_toasts(&ctx);
    client.shutdown().await;
    client.save_session().await?;
    client.notices().save_history(&notices_path).await?;

    result
}
