use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use serialized::{Client, Config};

mod cli;

use cli::Cli;

/// Loads the config file (if any), then applies environment and flag
/// overrides on top.
fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(Config::default_path);
    let mut config = match &path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from '{}'", path.display()))?,
        None => {
            tracing::debug!("HOME not set, using default configuration");
            Config::default()
        }
    }
    .apply_env();

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli)?;
    if config.access_key.is_none() || config.secret_access_key.is_none() {
        tracing::warn!(
            "No API credentials configured; set {} and {} or add them to the config file",
            serialized::config::ACCESS_KEY_ENV,
            serialized::config::SECRET_ACCESS_KEY_ENV
        );
    }
    let client = Client::from_config(&config).context("Failed to create API client")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let mut stdout = std::io::stdout().lock();
    cli::commands::run(cli.command, &client, &cancel, &mut stdout).await
}
