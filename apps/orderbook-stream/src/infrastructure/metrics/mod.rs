//! Prometheus Metrics Module
//!
//! Exposes server and client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: Snapshots and incrementals written to clients
//! - **Connections**: Active client connections and session durations
//! - **Producers**: Running update producers
//! - **Commands**: Subscription commands received, by action
//! - **Anomalies**: Client-side updates for unknown instruments
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder,
//! so library code and tests may call them freely.
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::SubscriptionAction;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Outbound messages
    describe_counter!(
        "orderbook_stream_messages_sent_total",
        "Total messages written to clients by kind"
    );
    describe_counter!(
        "orderbook_stream_snapshots_sent_total",
        "Total snapshots written to clients by purpose"
    );
    describe_counter!(
        "orderbook_stream_write_failures_total",
        "Total outbound write failures (one per failed connection)"
    );

    // Connections
    describe_gauge!(
        "orderbook_stream_connections",
        "Number of active client connections"
    );
    describe_histogram!(
        "orderbook_stream_session_duration_seconds",
        "Lifetime of client connections"
    );

    // Producers
    describe_gauge!(
        "orderbook_stream_active_producers",
        "Number of running incremental update producers"
    );

    // Commands
    describe_counter!(
        "orderbook_stream_commands_received_total",
        "Total subscription commands received by action"
    );
    describe_counter!(
        "orderbook_stream_invalid_commands_total",
        "Total inbound commands discarded as malformed"
    );

    // Client
    describe_counter!(
        "orderbook_stream_protocol_anomalies_total",
        "Total updates received for instruments without a local book"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Why a snapshot was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Full book on subscribe.
    Initial,
    /// Empty snapshot acknowledging an unsubscribe.
    Acknowledgement,
}

impl SnapshotKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Acknowledgement => "ack",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a message written to a client.
pub fn record_message_sent(kind: &'static str) {
    counter!(
        "orderbook_stream_messages_sent_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a snapshot written to a client.
pub fn record_snapshot_sent(kind: SnapshotKind) {
    counter!(
        "orderbook_stream_snapshots_sent_total",
        "purpose" => kind.as_str()
    )
    .increment(1);
}

/// Record a failed outbound write.
pub fn record_write_failure() {
    counter!("orderbook_stream_write_failures_total").increment(1);
}

/// Update the active connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connections(count: i64) {
    gauge!("orderbook_stream_connections").set(count as f64);
}

/// Record how long a connection lasted.
pub fn record_session_duration(duration: Duration) {
    histogram!("orderbook_stream_session_duration_seconds").record(duration.as_secs_f64());
}

/// Record an update producer starting.
pub fn producer_started() {
    gauge!("orderbook_stream_active_producers").increment(1.0);
}

/// Record an update producer exiting.
pub fn producer_stopped() {
    gauge!("orderbook_stream_active_producers").decrement(1.0);
}

/// Record a subscription command received.
pub fn record_command_received(action: SubscriptionAction) {
    counter!(
        "orderbook_stream_commands_received_total",
        "action" => action.as_str()
    )
    .increment(1);
}

/// Record an inbound command discarded as malformed.
pub fn record_invalid_command(reason: &'static str) {
    counter!(
        "orderbook_stream_invalid_commands_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record an update for an instrument with no local book.
pub fn record_protocol_anomaly(kind: &'static str) {
    counter!(
        "orderbook_stream_protocol_anomalies_total",
        "kind" => kind
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
