//! Powerman Service - Meter poll loop and HTTP API.
//!
//! Run with: `cargo run -p powerman-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use powerman_core::RegisterSource;
use powerman_service::config::default_config_path;
use powerman_service::{AppState, Collector, Config, MetricsSink, MqttSink, NullSink, api};
use powerman_store::Store;

/// Powerman Service - Three-phase meter poller with MQTT and HTTP API.
#[derive(Parser, Debug)]
#[command(name = "powerman-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable the poll loop (API only mode).
    #[arg(long)]
    no_collector: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("powerman_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(default_config_path()),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.validate()?;

    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let source: Arc<dyn RegisterSource> = Arc::new(config.modbus.source());
    let (sink, mqtt_task) = if config.mqtt.enabled {
        let (sink, handle) = MqttSink::connect(&config.mqtt)?;
        (Arc::new(sink) as Arc<dyn MetricsSink>, Some(handle))
    } else {
        info!("MQTT publishing disabled");
        (Arc::new(NullSink) as Arc<dyn MetricsSink>, None)
    };

    for target in config.targets() {
        info!("Polling {}", target);
    }

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config, source, sink);

    let collector_task = if args.no_collector {
        info!("Poll loop disabled");
        None
    } else {
        Some(Collector::new(Arc::clone(&state)).start())
    };

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.collector.signal_stop();
    if let Some(task) = collector_task
        && let Err(e) = task.await
    {
        error!("Poll loop ended abnormally: {}", e);
    }
    if let Some(task) = mqtt_task {
        task.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
