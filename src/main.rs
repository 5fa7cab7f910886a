//! Reaction Race - terminal client for the racing game service
//!
//! Commands:
//! - `race`: host a multi-player reaction race on one keyboard
//! - `guess`: single-player number guessing with a persisted best score

mod app;
mod config;
mod guess;
mod input;
mod race;
mod service;
mod store;
mod util;

use std::env;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    let command = env::args().nth(1);
    match command.as_deref() {
        None | Some("race") => {
            info!("Starting reaction race");
            info!("Game service: {}", config.service_url);
            let state = AppState::new(config)?;
            app::race::run(&state, shutdown_signal()).await?;
        }
        Some("guess") => {
            let mut state = AppState::new(config)?;
            app::guess::run(&mut state).await?;
        }
        Some("-h") | Some("--help") => print_help(),
        Some(other) => anyhow::bail!("Unknown command '{}'. Run with --help.", other),
    }

    Ok(())
}

fn print_help() {
    println!("Usage: reaction-race [race|guess]");
    println!();
    println!("  race   Reaction race against the game service (default)");
    println!("  guess  Number guessing game");
    println!();
    println!("Environment: GAME_SERVICE_URL, PLAYER_COUNT, ROUND_COUNT, PLAYER_NAMES,");
    println!("             RACE_SEED, REQUEST_TIMEOUT_MS, STORAGE_PATH, LOG_LEVEL");
}

/// Initialize tracing/logging.
///
/// Logs go to stderr so they do not interleave with the race display.
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
