//! Client Reconciler
//!
//! Rebuilds one [`OrderBook`] per instrument from the server's message
//! stream. A snapshot creates or replaces the book; an incremental merges
//! into an existing book. Every applied message is handed to the display
//! collaborator before the next one is read.

use std::collections::HashMap;
use std::fmt::Display;

use futures::{Stream, StreamExt};

use crate::application::ports::BookDisplay;
use crate::domain::order_book::OrderBook;
use crate::domain::streaming::{IncrementalUpdate, InstrumentId, MarketDataMessage, Snapshot};
use crate::infrastructure::metrics;

/// Result of applying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The book was updated and rendered.
    Applied,
    /// Incremental for an instrument with no book; discarded.
    UnknownInstrument,
}

/// Per-instrument book reconstruction for one connection.
pub struct ClientReconciler<D> {
    books: HashMap<InstrumentId, OrderBook>,
    display: D,
    anomalies: u64,
}

impl<D: BookDisplay> ClientReconciler<D> {
    /// Create a reconciler with no books.
    #[must_use]
    pub fn new(display: D) -> Self {
        Self {
            books: HashMap::new(),
            display,
            anomalies: 0,
        }
    }

    /// Apply one server message.
    pub fn apply(&mut self, message: &MarketDataMessage) -> ApplyOutcome {
        match message {
            MarketDataMessage::Snapshot(snapshot) => {
                self.apply_snapshot(snapshot);
                ApplyOutcome::Applied
            }
            MarketDataMessage::Incremental(update) => self.apply_incremental(update),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let book = self
            .books
            .entry(snapshot.instrument_id.clone())
            .or_insert_with(|| OrderBook::new(snapshot.instrument_id.clone()));
        book.apply_snapshot(&snapshot.bids, &snapshot.asks);

        tracing::debug!(
            instrument_id = %snapshot.instrument_id,
            bids = book.bids().len(),
            asks = book.asks().len(),
            "Applied snapshot"
        );
        self.display.render(book);
    }

    fn apply_incremental(&mut self, update: &IncrementalUpdate) -> ApplyOutcome {
        let Some(book) = self.books.get_mut(&update.instrument_id) else {
            self.anomalies += 1;
            metrics::record_protocol_anomaly("unknown_instrument");
            tracing::warn!(
                instrument_id = %update.instrument_id,
                "Received incremental update for unknown instrument, ignoring"
            );
            return ApplyOutcome::UnknownInstrument;
        };
        book.apply_incremental(&update.bid_updates, &update.ask_updates);
        self.display.render(book);
        ApplyOutcome::Applied
    }

    /// Book for `instrument_id`, if a snapshot has been received.
    #[must_use]
    pub fn book(&self, instrument_id: &str) -> Option<&OrderBook> {
        self.books.get(instrument_id)
    }

    /// All books, in no particular order.
    pub fn books(&self) -> impl Iterator<Item = &OrderBook> {
        self.books.values()
    }

    /// Incrementals discarded for unknown instruments.
    #[must_use]
    pub const fn anomalies(&self) -> u64 {
        self.anomalies
    }
}

// =============================================================================
// Read Loop
// =============================================================================

/// Why the client read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLoopEnd {
    /// The server closed the stream.
    Closed,
    /// The transport reported an error.
    TransportError,
}

/// What the client read loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLoopSummary {
    /// Why the loop ended.
    pub end: ReadLoopEnd,
    /// Messages applied to a book.
    pub applied: u64,
    /// Messages discarded as anomalies.
    pub anomalies: u64,
}

/// Feed every message from `updates` into `reconciler` until the stream
/// ends. A transport error ends display updates for all instruments.
pub async fn drive_updates<S, E, D>(
    mut updates: S,
    reconciler: &mut ClientReconciler<D>,
) -> ReadLoopSummary
where
    S: Stream<Item = Result<MarketDataMessage, E>> + Unpin,
    E: Display,
    D: BookDisplay,
{
    let mut applied = 0;
    let mut anomalies = 0;

    let end = loop {
        match updates.next().await {
            None => {
                tracing::info!("Server closed the update stream");
                break ReadLoopEnd::Closed;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Update stream failed");
                break ReadLoopEnd::TransportError;
            }
            Some(Ok(message)) => match reconciler.apply(&message) {
                ApplyOutcome::Applied => applied += 1,
                ApplyOutcome::UnknownInstrument => anomalies += 1,
            },
        }
    };

    ReadLoopSummary {
        end,
        applied,
        anomalies,
    }
}

// =============================================================================
// Tests
// =============================================================================
