// Space Usage Service - Scheduled space usage analysis
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Space Usage Service
//!
//! Runs the space usage pipeline on a quarter-hour schedule against the
//! space usage and recording APIs, and exposes Prometheus metrics.
//!
//! ## Usage
//!
//! ```bash
//! # Local services on ports 3000 and 3001
//! space-usage-service --environment development
//!
//! # Analyse the last closed window once and exit
//! SPACE_USAGE_API_BASE_URL=https://usage.example.com \
//! RECORDING_API_BASE_URL=https://recordings.example.com \
//! space-usage-service --environment production --once
//! ```

mod analysis;
mod config;
mod metrics;
mod schedule;
mod upstream;

use analysis::{AnalysisStatus, Analyzer, LastRun, MeteredReporter};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use clap::Parser;
use config::{ConfigError, ServiceConfig};
use metrics::encode_metrics;
use serde::Serialize;
use space_usage::{
    CollectorConfig, LogExceptionLogger, RecordingsByTimeframeCollector, SpaceUsageCalculator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use upstream::{build_client, HttpSetupError, RecordingApi, SpaceUsageApi};

/// Space usage analysis service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Environment (development, test, qa, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// JSON configuration file replacing the environment defaults
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Analyse the last closed window once and exit
    #[arg(long)]
    once: bool,
}

/// Service startup errors.
#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Http(#[from] HttpSetupError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("analysis failed: {0}")]
    Analysis(#[from] space_usage::CalculationError),
}

/// Application state shared across handlers.
struct AppState {
    environment: &'static str,
    status: Arc<AnalysisStatus>,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Space Usage Service v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<ServiceConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::for_environment(&args.environment)?,
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn build_analyzer(config: &ServiceConfig) -> Result<Analyzer, ServiceError> {
    let client = build_client(config.request_timeout())?;
    let space_usage_api = Arc::new(SpaceUsageApi::new(
        client.clone(),
        &config.space_usage_api_base_url,
    )?);
    let recording_api = Arc::new(RecordingApi::new(client, &config.recording_api_base_url)?);

    let collector_config = match config.max_in_flight {
        Some(limit) => CollectorConfig::with_max_in_flight(limit),
        None => CollectorConfig::default(),
    };
    let collector = Arc::new(RecordingsByTimeframeCollector::with_config(
        space_usage_api.clone(),
        recording_api,
        Arc::new(LogExceptionLogger),
        collector_config,
    ));
    let reporter = Arc::new(MeteredReporter::new(space_usage_api));
    let calculator = SpaceUsageCalculator::new(collector, reporter);

    Ok(Analyzer::new(
        calculator,
        config.schedule.clone(),
        config.snapshot_length(),
    ))
}

async fn run(args: Args) -> Result<(), ServiceError> {
    let config = load_config(&args)?;
    info!(
        "Environment {}: space usage API {}, recording API {}",
        config.environment.as_str(),
        config.space_usage_api_base_url,
        config.recording_api_base_url
    );

    let analyzer = Arc::new(build_analyzer(&config)?);
    let _failures = analyzer.watch_reporting_failures();

    if args.once {
        analyzer.run_last_window().await?;
        return Ok(());
    }

    let state = Arc::new(AppState {
        environment: config.environment.as_str(),
        status: analyzer.status(),
        start_time: std::time::Instant::now(),
    });

    // Start analysis loop in background
    let looping = Arc::clone(&analyzer);
    tokio::spawn(async move {
        looping.run().await;
    });

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Space Usage Service</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>Space Usage Service</h1>
    <p>Estimates people per space from WiFi detections every quarter hour.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div><a href="/health">/health</a> - Health check</div>
        <div><a href="/status">/status</a> - Status information (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>space_usage_runs_total</code> - Analysis runs</li>
        <li><code>space_usage_failed_runs_total</code> - Failed runs</li>
        <li><code>space_usage_spaces_analysed_total</code> - Spaces analysed</li>
        <li><code>space_usage_spaces_skipped_total</code> - Spaces without recordings</li>
        <li><code>space_usage_summaries_reported_total</code> - Summaries reported</li>
        <li><code>space_usage_reporting_failures_total</code> - Reporting failures</li>
        <li><code>space_usage_people_recorded</code> - People per space, last window</li>
        <li><code>space_usage_last_run_timestamp_seconds</code> - Last run time</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    environment: &'static str,
    uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<LastRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_reporting_failure: Option<String>,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment,
        uptime_secs: state.start_time.elapsed().as_secs(),
        last_run: state.status.last_run().await,
        last_reporting_failure: state.status.last_reporting_failure().await,
    })
}
