//! Order Book State
//!
//! Per-instrument bid and ask sides mapping price to quantity.
//!
//! # Mutation Rules
//!
//! - A snapshot replaces both sides wholesale.
//! - An incremental level with quantity > 0 inserts or overwrites that price.
//! - An incremental level with quantity == 0 removes that price if present;
//!   removing an absent price is a no-op.
//! - Levels are applied in the order received, so a later entry for the
//!   same price in one message wins.
//!
//! No stored level ever has a quantity <= 0.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::streaming::InstrumentId;

// =============================================================================
// Price Level
// =============================================================================

/// A single (price, quantity) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting quantity; zero means "remove" inside an incremental update.
    pub quantity: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    /// Whether this level carries a positive, storable quantity.
    #[must_use]
    pub fn is_resting(&self) -> bool {
        self.quantity > Decimal::ZERO
    }
}

// =============================================================================
// Book Side
// =============================================================================

/// Which side of the book a level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Buy interest, presented highest price first.
    Bid,
    /// Sell interest, presented lowest price first.
    Ask,
}

/// One side of an order book.
///
/// Storage is a `BTreeMap` keyed by price; presentation order
/// (descending for bids, ascending for asks) is derived on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl BookSide {
    /// Create an empty side.
    #[must_use]
    pub const fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Replace every level with `levels`.
    ///
    /// Levels without a positive quantity are not stored.
    pub fn replace(&mut self, levels: &[PriceLevel]) {
        self.levels.clear();
        for level in levels.iter().filter(|l| l.is_resting()) {
            self.levels.insert(level.price, level.quantity);
        }
    }

    /// Apply one changed level.
    pub fn apply(&mut self, level: &PriceLevel) {
        if level.is_resting() {
            self.levels.insert(level.price, level.quantity);
        } else {
            self.levels.remove(&level.price);
        }
    }

    /// Quantity resting at `price`, if any.
    #[must_use]
    pub fn quantity_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Best level (highest bid or lowest ask).
    #[must_use]
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        entry.map(|(price, quantity)| PriceLevel::new(*price, *quantity))
    }

    /// Levels in presentation order.
    #[must_use]
    pub fn levels(&self) -> Vec<PriceLevel> {
        let to_level = |(price, quantity): (&Decimal, &Decimal)| PriceLevel::new(*price, *quantity);
        match self.side {
            Side::Bid => self.levels.iter().rev().map(to_level).collect(),
            Side::Ask => self.levels.iter().map(to_level).collect(),
        }
    }

    /// Number of price levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the side has no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// =============================================================================
// Order Book
// =============================================================================

/// Reconstructed order book for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    instrument_id: InstrumentId,
    bids: BookSide,
    asks: BookSide,
}

impl OrderBook {
    /// Create an empty book.
    #[must_use]
    pub fn new(instrument_id: impl Into<InstrumentId>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
        }
    }

    /// Replace both sides wholesale.
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.replace(bids);
        self.asks.replace(asks);
    }

    /// Merge changed levels into both sides, in order.
    pub fn apply_incremental(&mut self, bid_changes: &[PriceLevel], ask_changes: &[PriceLevel]) {
        for level in bid_changes {
            self.bids.apply(level);
        }
        for level in ask_changes {
            self.asks.apply(level);
        }
    }

    /// Instrument this book belongs to.
    #[must_use]
    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    /// Bid side.
    #[must_use]
    pub const fn bids(&self) -> &BookSide {
        &self.bids
    }

    /// Ask side.
    #[must_use]
    pub const fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Lowest ask minus highest bid, when both sides are populated.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.asks.best()?.price - self.bids.best()?.price)
    }

    /// Whether both sides are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
