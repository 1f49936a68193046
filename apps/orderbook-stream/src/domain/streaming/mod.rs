//! Market Data Streaming Types
//!
//! Codec-agnostic messages carried from the server to a consumer: a full
//! [`Snapshot`] or an [`IncrementalUpdate`] carrying only changed levels.

use super::order_book::PriceLevel;

/// Opaque instrument key (stock ticker or any venue symbol).
pub type InstrumentId = String;

/// Full state of one instrument's book.
///
/// An empty snapshot doubles as the unsubscribe acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Instrument the snapshot describes.
    pub instrument_id: InstrumentId,
    /// Bid levels.
    pub bids: Vec<PriceLevel>,
    /// Ask levels.
    pub asks: Vec<PriceLevel>,
}

impl Snapshot {
    /// Snapshot with no levels on either side.
    #[must_use]
    pub fn empty(instrument_id: impl Into<InstrumentId>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Whether both sides are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Changed levels for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalUpdate {
    /// Instrument the update applies to.
    pub instrument_id: InstrumentId,
    /// Changed bid levels, in application order.
    pub bid_updates: Vec<PriceLevel>,
    /// Changed ask levels, in application order.
    pub ask_updates: Vec<PriceLevel>,
}

/// A server-to-consumer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketDataMessage {
    /// Replace the instrument's book.
    Snapshot(Snapshot),
    /// Merge into the instrument's book.
    Incremental(IncrementalUpdate),
}

impl MarketDataMessage {
    /// Instrument this message is scoped to.
    #[must_use]
    pub fn instrument_id(&self) -> &str {
        match self {
            Self::Snapshot(s) => &s.instrument_id,
            Self::Incremental(u) => &u.instrument_id,
        }
    }

    /// Message kind label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Incremental(_) => "incremental",
        }
    }
}

impl From<Snapshot> for MarketDataMessage {
    fn from(snapshot: Snapshot) -> Self {
        Self::Snapshot(snapshot)
    }
}

impl From<IncrementalUpdate> for MarketDataMessage {
    fn from(update: IncrementalUpdate) -> Self {
        Self::Incremental(update)
    }
}
