//! Domain Layer - Order book state and wire-agnostic message types.
//!
//! This layer contains the core domain types for order book streaming
//! with no transport dependencies. Prices and quantities are
//! [`rust_decimal::Decimal`] so price keys are exact and totally ordered.

/// Order book state and mutation rules.
pub mod order_book;

/// Snapshot and incremental update messages.
pub mod streaming;

/// Subscription commands and per-instrument lifecycle states.
pub mod subscription;
