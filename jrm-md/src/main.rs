//! Media Delivery (jrm-md) - Main entry point
//!
//! Serves library audio, album covers, and remotely-sourced video out of
//! the derived-artifact cache over HTTP.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jrm_md::config::{Config, TranscodeSettings};
use jrm_md::{build_router, AppState};

/// Command-line arguments for jrm-md
#[derive(Parser, Debug)]
#[command(name = "jrm-md")]
#[command(about = "Media Delivery microservice for Jamroom")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5760", env = "JRM_MD_PORT")]
    port: u16,

    /// Root folder containing the database and media cache
    #[arg(short, long, env = "JRM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jrm_md=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting Jamroom Media Delivery (jrm-md) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder =
        jrm_common::config::resolve_root_folder(args.root_folder.as_deref(), "JRM_ROOT_FOLDER");
    let config = Config::from_root(&root_folder, args.port);
    info!("Root folder: {}", config.root_folder.display());

    let db = jrm_common::db::init::init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let tuning = TranscodeSettings::load(&db)
        .await
        .context("Failed to load transcode settings")?;
    info!(
        "Transcode settings: audio {} kbit/s, covers {}px q{}",
        tuning.audio_bitrate_kbps, tuning.cover_max_width, tuning.cover_quality
    );

    std::fs::create_dir_all(&config.cache_dir).context("Failed to create cache directory")?;
    info!("Cache directory: {}", config.cache_dir.display());

    // Fired on shutdown so in-flight derivations clean up partial files
    let shutdown = CancellationToken::new();

    let state = AppState::new(db, config.cache_dir.clone(), tuning, shutdown.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .context("Failed to bind to address")?;
    info!("jrm-md listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
