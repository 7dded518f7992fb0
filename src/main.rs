//! fx-forecast: hybrid FX price forecast service.
//!
//! Loads the trained sequence model, gradient-boosted regressor, scalers,
//! and last known window once at startup, then serves multi-day forecasts
//! over HTTP. Also exposes the token encryption helper for operators.

mod api;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use common::ServiceConfig;
use fernet_vault::EncryptionManager;
use forecast_engine::ModelContext;

use crate::api::{create_router, AppState};

/// Hybrid FX forecast service
#[derive(Parser)]
#[command(name = "fx-forecast", about = "Hybrid FX price forecast service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,

    /// Run one forecast, print it as JSON, and exit.
    Forecast {
        /// Override the configured horizon.
        #[arg(long)]
        days: Option<usize>,
    },

    /// Print a fresh encryption key.
    Keygen,

    /// Encrypt TEXT with the key in APP_ENCRYPTION_KEY.
    Encrypt { text: String },

    /// Decrypt TOKEN with the key in APP_ENCRYPTION_KEY.
    Decrypt { token: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fx_forecast=info,forecast_engine=info,tower_http=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Forecast { days } => forecast_once(days).await,
        Command::Keygen => {
            let key = EncryptionManager::generate_key();
            println!("{}", String::from_utf8_lossy(&key));
            Ok(())
        }
        Command::Encrypt { text } => {
            let manager = EncryptionManager::from_env().context("Loading encryption key")?;
            let token = manager.encrypt(&text).context("Encrypting")?;
            println!("{}", String::from_utf8_lossy(&token));
            Ok(())
        }
        Command::Decrypt { token } => {
            let manager = EncryptionManager::from_env().context("Loading encryption key")?;
            let plaintext = manager
                .decrypt(token.trim().as_bytes())
                .context("Decrypting")?;
            println!("{plaintext}");
            Ok(())
        }
    }
}

fn load_context(cfg: &ServiceConfig) -> Result<Arc<ModelContext>> {
    let context = ModelContext::load(&cfg.artifacts, &cfg.forecast)
        .with_context(|| format!("Loading model artifacts from {}", cfg.artifacts.dir))?;
    Ok(Arc::new(context))
}

async fn serve() -> Result<()> {
    info!("FX forecast service starting up...");

    let cfg = config::load_config().context("Loading configuration")?;
    info!(
        "Forecast: horizon={}d, look_back={}, features={}, noise_scale={}, seeded={}",
        cfg.forecast.horizon_days,
        cfg.forecast.look_back,
        cfg.forecast.features,
        cfg.forecast.noise_scale,
        cfg.forecast.seed.is_some(),
    );

    let context = load_context(&cfg)?;
    let state = Arc::new(AppState::new(context, &cfg.forecast));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Binding {}", cfg.bind_addr))?;
    info!("Listening on {}", cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("FX forecast service stopped");
    Ok(())
}

async fn forecast_once(days: Option<usize>) -> Result<()> {
    let mut cfg = config::load_config().context("Loading configuration")?;
    if let Some(days) = days {
        anyhow::ensure!(days > 0, "--days must be > 0");
        cfg.forecast.horizon_days = days;
    }

    let context = load_context(&cfg)?;
    let state = AppState::new(context, &cfg.forecast);
    let today = chrono::Local::now().date_naive();
    let forecast = tokio::task::spawn_blocking(move || state.run_forecast(today))
        .await
        .context("Forecast task panicked")??;

    println!("{}", serde_json::to_string_pretty(&forecast)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
