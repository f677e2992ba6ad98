use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gator::cli::Cli;
use gator::commands::{self, State};
use gator::config::Config;
use gator::db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    debug!("Loaded configuration from {}", config_path.display());

    // Initialize database
    let db = Database::new(&config.database_url())
        .await
        .context("failed to open database")?;
    db.initialize().await?;

    let mut state = State {
        config,
        config_path,
        db: Arc::new(db),
    };

    commands::run(&mut state, cli.command).await
}
