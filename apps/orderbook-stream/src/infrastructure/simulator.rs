//! Simulated Book Source
//!
//! Stand-in market data for every instrument: a fixed two-level snapshot
//! and incrementals that nudge the inner bid and ask by a tenth in
//! alternating directions while sizes grow each tick.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::ports::{BookSource, UpdateGenerator};
use crate::domain::order_book::PriceLevel;
use crate::domain::streaming::{IncrementalUpdate, InstrumentId, Snapshot};

const NUDGE: Decimal = dec!(0.1);
const BASE_BID: Decimal = dec!(99.0);
const BASE_ASK: Decimal = dec!(100.0);

/// Fixture-backed [`BookSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedBookSource {
    max_updates: Option<u64>,
}

impl SimulatedBookSource {
    /// Source whose generators stop after `max_updates` (None = never).
    #[must_use]
    pub const fn new(max_updates: Option<u64>) -> Self {
        Self { max_updates }
    }
}

impl BookSource for SimulatedBookSource {
    fn snapshot(&self, instrument_id: &str) -> Snapshot {
        Snapshot {
            instrument_id: instrument_id.to_string(),
            bids: vec![
                PriceLevel::new(dec!(99.5), dec!(100)),
                PriceLevel::new(dec!(99.0), dec!(200)),
            ],
            asks: vec![
                PriceLevel::new(dec!(100.0), dec!(150)),
                PriceLevel::new(dec!(100.5), dec!(250)),
            ],
        }
    }

    fn updates(&self, instrument_id: &str) -> Box<dyn UpdateGenerator> {
        Box::new(SimulatedUpdates {
            instrument_id: instrument_id.to_string(),
            sequence: 0,
            max_updates: self.max_updates,
        })
    }
}

/// Deterministic incremental sequence for one subscription.
#[derive(Debug)]
struct SimulatedUpdates {
    instrument_id: InstrumentId,
    sequence: u64,
    max_updates: Option<u64>,
}

impl SimulatedUpdates {
    fn update_at(&self, n: u64) -> IncrementalUpdate {
        let change = if n.is_multiple_of(2) { NUDGE } else { -NUDGE };
        let n = Decimal::from(n);
        IncrementalUpdate {
            instrument_id: self.instrument_id.clone(),
            bid_updates: vec![PriceLevel::new(BASE_BID + change, dec!(200) + dec!(10) * n)],
            ask_updates: vec![PriceLevel::new(BASE_ASK - change, dec!(150) + dec!(5) * n)],
        }
    }
}

#[async_trait]
impl UpdateGenerator for SimulatedUpdates {
    async fn next_update(&mut self) -> Option<IncrementalUpdate> {
        if self.max_updates.is_some_and(|max| self.sequence >= max) {
            return None;
        }
        let update = self.update_at(self.sequence);
        self.sequence += 1;
        Some(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_fixture() {
        let snapshot = SimulatedBookSource::default().snapshot("AAPL");

        assert_eq!(snapshot.instrument_id, "AAPL");
        assert_eq!(
            snapshot.bids,
            vec![
                PriceLevel::new(dec!(99.5), dec!(100)),
                PriceLevel::new(dec!(99.0), dec!(200)),
            ]
        );
        assert_eq!(
            snapshot.asks,
            vec![
                PriceLevel::new(dec!(100.0), dec!(150)),
                PriceLevel::new(dec!(100.5), dec!(250)),
            ]
        );
    }

    #[tokio::test]
    async fn incrementals_alternate_and_grow() {
        let mut updates = SimulatedBookSource::default().updates("MSFT");

        let first = updates.next_update().await.unwrap();
        assert_eq!(first.instrument_id, "MSFT");
        assert_eq!(first.bid_updates, vec![PriceLevel::new(dec!(99.1), dec!(200))]);
        assert_eq!(first.ask_updates, vec![PriceLevel::new(dec!(99.9), dec!(150))]);

        let second = updates.next_update().await.unwrap();
        assert_eq!(second.bid_updates, vec![PriceLevel::new(dec!(98.9), dec!(210))]);
        assert_eq!(second.ask_updates, vec![PriceLevel::new(dec!(100.1), dec!(155))]);

        let third = updates.next_update().await.unwrap();
        assert_eq!(third.bid_updates, vec![PriceLevel::new(dec!(99.1), dec!(220))]);
    }

    #[tokio::test]
    async fn bounded_source_exhausts() {
        let mut updates = SimulatedBookSource::new(Some(2)).updates("AAPL");

        assert!(updates.next_update().await.is_some());
        assert!(updates.next_update().await.is_some());
        assert!(updates.next_update().await.is_none());
        assert!(updates.next_update().await.is_none());
    }

    #[tokio::test]
    async fn each_subscription_starts_a_fresh_sequence() {
        let source = SimulatedBookSource::default();
        let mut a = source.updates("AAPL");
        a.next_update().await;
        let mut b = source.updates("AAPL");

        assert_eq!(b.next_update().await, source.updates("AAPL").next_update().await);
    }
}
