//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`BookSource`]: Produces the initial snapshot and an update generator
//!   per subscribed instrument. The production source is a stand-in.
//! - [`BookDisplay`]: Receives the current book after every applied message.

use async_trait::async_trait;

use crate::domain::order_book::OrderBook;
use crate::domain::streaming::{IncrementalUpdate, Snapshot};

/// Source of order book data for subscribed instruments.
pub trait BookSource: Send + Sync {
    /// Current full state of `instrument_id`.
    fn snapshot(&self, instrument_id: &str) -> Snapshot;

    /// A fresh generator of incremental updates for `instrument_id`.
    fn updates(&self, instrument_id: &str) -> Box<dyn UpdateGenerator>;
}

/// Per-subscription generator of incremental updates.
#[async_trait]
pub trait UpdateGenerator: Send {
    /// Next update, or `None` once the sequence is exhausted.
    async fn next_update(&mut self) -> Option<IncrementalUpdate>;
}

/// Display collaborator for reconstructed books.
#[cfg_attr(test, mockall::automock)]
pub trait BookDisplay: Send {
    /// Render the current state of one instrument's book.
    fn render(&self, book: &OrderBook);
}
