#![allow(missing_docs)]

//! Guardpost — guardrailed conversational front desk for a STEAM education
//! business.
//!
//! Single binary that serves the web chat API and the SMS carrier webhook,
//! running every inbound message through deterministic guardrail chains
//! around a hosted language model.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use guardpost::config::load_config;
use guardpost::guardrails::flood::{spawn_sweeper, FloodMonitor};
use guardpost::logging;
use guardpost::pipeline::Pipeline;
use guardpost::providers::anthropic::AnthropicProvider;
use guardpost::providers::ModelProvider;
use guardpost::server;
use guardpost::store::Store;

#[derive(Debug, Parser)]
#[command(name = "guardpost", version, about = "Guardrailed chat front desk")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "guardpost.toml")]
    config: PathBuf,

    /// Log human-readable output to the console instead of JSON files.
    #[arg(long)]
    console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli.config).context("failed to load configuration")?;

    let _guard = if cli.console {
        logging::init_console();
        None
    } else {
        Some(
            logging::init_production(config.server.logs_dir.as_ref())
                .context("failed to initialize logging")?,
        )
    };

    info!(version = env!("CARGO_PKG_VERSION"), "guardpost starting");

    let store = Store::open(&config.server.database_url)
        .await
        .context("failed to open database")?;
    info!(url = %config.server.database_url, "database opened");

    let api_key = std::env::var(&config.model.api_key_env).with_context(|| {
        format!(
            "model API key not found in environment variable {}",
            config.model.api_key_env
        )
    })?;
    let provider: Arc<dyn ModelProvider> = Arc::new(
        AnthropicProvider::new(
            config.model.model.clone(),
            api_key,
            Duration::from_secs(config.model.timeout_secs),
        )
        .context("failed to build model provider")?,
    );
    info!(model = %config.model.model, "model provider ready");

    let flood = Arc::new(FloodMonitor::new());
    let _sweeper = spawn_sweeper(Arc::clone(&flood));

    let bind = config.server.bind.clone();
    let pipeline = Arc::new(Pipeline::new(store, provider, flood, config));
    let app = server::router(pipeline);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "listening");

    axum::serve(listener, app)
        .await
        .context("server error")?;
    Ok(())
}
