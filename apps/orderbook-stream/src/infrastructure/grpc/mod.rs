//! gRPC Transport
//!
//! Carries subscription commands and book updates over one bidirectional
//! `MarketDataService.Subscribe` stream per consumer.
//!
//! # Architecture
//!
//! Server side, each call:
//!
//! 1. Converts inbound `SubscriptionRequest`s to domain commands, discarding
//!    malformed ones
//! 2. Opens an outbound gate feeding the response stream
//! 3. Runs a `ConnectionSession` until the consumer half-closes or a write
//!    fails, then joins every producer
//!
//! Client side, `MarketDataClient` opens the same stream and exposes a
//! `CommandSender` plus a stream of domain messages.

pub mod client;
pub mod converters;
pub mod server;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod orderbook {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/orderbook.v1.rs"));
        }
    }
}

pub use client::{ClientError, MarketDataClient, UpdateStream};
pub use server::{MarketDataServer, ServerStats};
