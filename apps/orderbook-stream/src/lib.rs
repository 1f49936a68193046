#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Order Book Stream - Live Order Book Distribution
//!
//! A gRPC service that streams per-instrument order book snapshots and
//! incremental updates to consumers over one long-lived bidirectional
//! stream each, plus the client-side machinery that rebuilds those books.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Order book state and message types
//!   - `order_book`: Price levels, book sides, snapshot/incremental apply
//!   - `streaming`: `Snapshot`, `IncrementalUpdate`, `MarketDataMessage`
//!   - `subscription`: Commands and per-instrument lifecycle states
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Book source, update generator, display collaborator
//!   - `services`: Outbound gate, update producer, subscription registry,
//!     connection session, client reconciler, command sender
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `grpc`: Proto codegen, converters, server, client
//!   - `simulator`: Fixture-backed book source
//!   - `display`: Console price ladder
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                     ┌───────────── one connection ─────────────┐
//! SUBSCRIBE/UNSUB ───►│ Session ──► Registry ──► Producer (AAPL) ─┐│
//!                     │                 │        Producer (MSFT) ─┤│
//!                     │                 ▼                         ▼│
//! Snapshots/Incr. ◄───│────────── Outbound Gate (single writer) ◄─┘│
//!                     └───────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order book types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::order_book::{BookSide, OrderBook, PriceLevel, Side};
pub use domain::streaming::{IncrementalUpdate, InstrumentId, MarketDataMessage, Snapshot};
pub use domain::subscription::{SubscriptionAction, SubscriptionCommand, SubscriptionState};

// Ports and services
pub use application::ports::{BookDisplay, BookSource, UpdateGenerator};
pub use application::services::{
    ClientReconciler, CommandError, CommandSender, ConnectionSession, OutboundError, OutboundGate,
    ReadLoopEnd, ReadLoopSummary, SubscriptionRegistry, UpdateProducer, drive_updates,
};

// Infrastructure config
pub use infrastructure::config::{
    ClientConfig, ConfigError, ProducerSettings, ServerConfig, ServerSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// gRPC server and client (for integration tests)
pub use infrastructure::grpc::{
    ClientError, MarketDataClient, MarketDataServer, ServerStats, UpdateStream,
    proto::orderbook::v1 as proto,
};

// Adapters
pub use infrastructure::display::ConsoleBookDisplay;
pub use infrastructure::simulator::SimulatedBookSource;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init_with_config as init_telemetry};
