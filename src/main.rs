use anyhow::Context;
use api_monitor::config::MonitorConfig;
use api_monitor::error::ConfigError;
use api_monitor::{ErrorPipeline, MonitorLayer};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use log::{error, info, warn};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

/// Command-line arguments for the API monitor demo server
#[derive(Parser)]
#[command(
    name = "api-monitor",
    about = "HTTP API error monitor with AI summaries and multi-channel alerts",
    long_about = "Serves a small demo API wrapped in the monitoring layer. Responses with a \
                  monitored status code are turned into error records, optionally summarized \
                  by an AI model, and delivered to every enabled notification channel."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Address to listen on
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

impl Cli {
    /// Reject config paths that exist but are not files
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
        }
        Ok(())
    }
}

/// Load configuration, falling back to defaults only when no file exists
///
/// Unreadable or invalid files are errors: bad bounds must not be silently
/// replaced by defaults.
fn load_config(config_path: Option<&FsPath>) -> Result<MonitorConfig, ConfigError> {
    match config_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from: {}", path.display());
            MonitorConfig::load(path)
        }
        Some(path) => {
            warn!(
                "Configuration file '{}' not found, using defaults",
                path.display()
            );
            Ok(MonitorConfig::default())
        }
        None => {
            info!("Using default configuration");
            Ok(MonitorConfig::default())
        }
    }
}

async fn get_user(Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    if id == 0 {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "user store unavailable"})),
        );
    }
    (StatusCode::OK, Json(json!({"id": id, "name": format!("user-{}", id)})))
}

async fn create_order(Json(order): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "payment gateway timeout", "order": order})),
    )
}

/// Demo routes wrapped in the monitoring layer
fn demo_router(layer: MonitorLayer) -> Router {
    Router::new()
        .route("/users/:id", get(get_user))
        .route("/orders", post(create_order))
        .route("/crash", get(|| async { StatusCode::BAD_GATEWAY }))
        .route_layer(layer)
        .route("/health", get(|| async { "ok" }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Received interrupt signal, shutting down gracefully...");
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let pipeline = Arc::new(
        ErrorPipeline::from_config(&config).context("failed to initialize error pipeline")?,
    );

    let channels = pipeline.channels();
    if channels.is_empty() {
        warn!("No notification channels enabled; errors will only be logged");
    } else {
        info!("Notification channels: {}", channels.join(", "));
    }
    if config.ai_enabled() {
        info!("AI summarization enabled");
    }

    let app = demo_router(MonitorLayer::new(&config.error_monitoring, pipeline));
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    info!("API monitor demo listening on http://{}", cli.bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("API monitor shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting API monitor");

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
