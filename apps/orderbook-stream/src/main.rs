//! Order Book Stream Server Binary
//!
//! Starts the gRPC market data service and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin orderbook-stream
//! ```
//!
//! # Environment Variables
//!
//! - `ORDERBOOK_GRPC_PORT`: gRPC server port (default: 50051)
//! - `ORDERBOOK_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8082)
//! - `ORDERBOOK_TICK_INTERVAL_MS`: Delay between incremental updates (default: 1000)
//! - `ORDERBOOK_OUTBOUND_CAPACITY`: Per-connection outbound buffer (default: 1024)
//! - `ORDERBOOK_MAX_UPDATES`: Updates per subscription before it ends (default: unbounded)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: orderbook-stream)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use orderbook_stream::infrastructure::{config, telemetry};
use orderbook_stream::{
    HealthServer, HealthServerState, MarketDataServer, ServerConfig, SimulatedBookSource,
    TelemetryConfig, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = config::load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard =
        telemetry::init_with_config(TelemetryConfig::from_env("orderbook-stream"))?;
    config::log_dotenv(&dotenv);

    tracing::info!("Starting Order Book Stream");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = ServerConfig::from_env();
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Initialize gRPC server
    let source = Arc::new(SimulatedBookSource::new(config.producer.max_updates));
    let grpc_server = MarketDataServer::new(source, config.producer.clone());
    let stats = grpc_server.stats();

    // Spawn health server
    if config.server.health_enabled() {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            stats,
            shutdown_token.clone(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Spawn gRPC server
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.server.grpc_port));
    let grpc_shutdown = shutdown_token.clone();
    let grpc_task = tokio::spawn(async move {
        tracing::info!(addr = %grpc_addr, "gRPC server listening");
        if let Err(e) = Server::builder()
            .add_service(grpc_server.into_service())
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled())
            .await
        {
            tracing::error!(error = %e, "gRPC server error");
            // Bring the rest of the process down with it.
            grpc_shutdown.cancel();
        }
        tracing::info!("gRPC server stopped");
    });

    tracing::info!("Order Book Stream ready");

    tokio::select! {
        () = await_shutdown_signal() => shutdown_token.cancel(),
        () = shutdown_token.cancelled() => {}
    }

    tracing::info!("Graceful shutdown started");
    if let Err(e) = grpc_task.await {
        tracing::error!(error = %e, "gRPC server task failed");
    }

    tracing::info!("Order Book Stream stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ServerConfig) {
    tracing::info!(
        grpc_port = config.server.grpc_port,
        health_port = config.server.health_port,
        tick_interval_ms = u64::try_from(config.producer.tick_interval.as_millis()).unwrap_or(u64::MAX),
        outbound_capacity = config.producer.outbound_capacity,
        max_updates = ?config.producer.max_updates,
        "Configuration loaded"
    );
}

/// Wait for SIGTERM or SIGINT.
#[allow(clippy::expect_used)]
async fn await_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
