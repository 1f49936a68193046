//! Order Book Stream Client Binary
//!
//! Connects to the server, subscribes to a list of instruments, prints
//! every book update, unsubscribes one instrument after a delay, then
//! half-closes the stream and prints the final books.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin orderbook-client
//! ```
//!
//! # Environment Variables
//!
//! - `ORDERBOOK_ENDPOINT`: Server URI (default: <http://localhost:50051>)
//! - `ORDERBOOK_INSTRUMENTS`: Comma-separated instruments (default: AAPL,MSFT)
//! - `ORDERBOOK_COMMAND_DELAY_MS`: Delay between SUBSCRIBEs (default: 100)
//! - `ORDERBOOK_UNSUBSCRIBE`: Instrument to unsubscribe, empty disables (default: AAPL)
//! - `ORDERBOOK_UNSUBSCRIBE_AFTER_SECS`: Delay before unsubscribing (default: 10)
//! - `ORDERBOOK_LINGER_SECS`: Time after unsubscribing before closing (default: 10)
//! - `ORDERBOOK_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 10)
//! - `RUST_LOG`: Log level (default: info)

use anyhow::{Context, Result, bail};
use orderbook_stream::infrastructure::display::render_ladder;
use orderbook_stream::infrastructure::{config, telemetry};
use orderbook_stream::{
    ClientConfig, ClientReconciler, CommandSender, ConsoleBookDisplay, MarketDataClient,
    ReadLoopEnd, TelemetryConfig, drive_updates,
};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();

    let _telemetry_guard =
        telemetry::init_with_config(TelemetryConfig::from_env("orderbook-client"))
            .context("failed to initialize telemetry")?;
    config::log_dotenv(&dotenv);

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    tracing::info!(
        endpoint = %config.endpoint,
        instruments = ?config.instruments,
        unsubscribe = ?config.unsubscribe,
        "Client connecting"
    );

    let mut client = MarketDataClient::connect(&config.endpoint, config.connect_timeout)
        .await
        .with_context(|| format!("failed to connect to {}", config.endpoint))?;
    let (sender, updates) = client
        .open_stream(config.command_delay)
        .await
        .context("failed to open subscription stream")?;

    let mut reader = tokio::spawn(async move {
        let mut reconciler = ClientReconciler::new(ConsoleBookDisplay);
        let summary = drive_updates(updates, &mut reconciler).await;
        (reconciler, summary)
    });

    // The server closing the stream early ends the command script too.
    let finished_early = tokio::select! {
        () = run_commands(sender, &config) => None,
        result = &mut reader => Some(result),
    };
    let (reconciler, summary) = match finished_early {
        Some(result) => result,
        None => reader.await,
    }
    .context("update reader task failed")?;

    tracing::info!(
        applied = summary.applied,
        anomalies = summary.anomalies,
        "Client read stream finished"
    );
    for book in reconciler.books() {
        print!("{}", render_ladder(book));
    }

    if summary.end == ReadLoopEnd::TransportError {
        bail!("update stream ended with a transport error");
    }
    tracing::info!("Client finished");
    Ok(())
}

/// Subscribe, optionally unsubscribe one instrument, linger, then drop the
/// sender to half-close the stream.
async fn run_commands(sender: CommandSender, config: &ClientConfig) {
    let subscriber = sender.clone();
    let instruments = config.instruments.clone();
    let subscribing = tokio::spawn(async move { subscriber.subscribe_all(&instruments).await });

    if let Some(instrument_id) = &config.unsubscribe {
        tokio::time::sleep(config.unsubscribe_after).await;
        // Failures are logged by the sender.
        let _ = sender.unsubscribe(instrument_id).await;
    }

    tokio::time::sleep(config.linger).await;

    match subscribing.await {
        Ok(Ok(sent)) => tracing::debug!(sent, "All subscription requests sent"),
        Ok(Err(_)) => {}
        Err(e) => tracing::error!(error = %e, "Subscription task failed"),
    }

    drop(sender);
    tracing::info!("Half-closing command stream");
}
