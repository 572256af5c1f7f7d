use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use passforge::channels::{Channel, DiscordChannel};
use passforge::config::Config;
use passforge::gateway;
use passforge::store::CredentialStore;

/// Discord bot that issues short-lived login credentials, with an HTTP
/// validation API for third-party login checks.
#[derive(Parser)]
#[command(name = "passforge", version, about)]
struct Cli {
    /// Path to config.toml (default: ~/.passforge/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    config.validate()?;

    // Single shared store: credentials issued by the bot, validated by HTTP.
    let store = Arc::new(CredentialStore::new(config.credentials.salt.clone()));

    let discord = DiscordChannel::new(
        config.discord.token.clone(),
        config.discord.authorized_role_id.clone(),
        store.clone(),
    );

    tracing::info!("Starting passforge");

    tokio::try_join!(
        gateway::run_gateway(&config.gateway.host, config.gateway.port, store),
        discord.listen(),
    )?;

    Ok(())
}
