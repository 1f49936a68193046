//! Proto Conversions
//!
//! Maps between generated protobuf types and domain types. Prices and
//! quantities are `double` on the wire and `Decimal` in memory.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::proto::orderbook::v1::{
    self as proto, MarketDataUpdate, OrderBookIncrementalUpdate, OrderBookSnapshot,
    SubscriptionRequest, market_data_update::Update, subscription_request::Action,
};
use crate::domain::order_book::PriceLevel;
use crate::domain::streaming::{IncrementalUpdate, MarketDataMessage, Snapshot};
use crate::domain::subscription::{SubscriptionAction, SubscriptionCommand};

// =============================================================================
// Numbers
// =============================================================================

/// Decimal to wire double.
#[must_use]
pub fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Wire double to decimal; `None` for NaN, infinities, or out-of-range values.
#[must_use]
pub fn f64_to_decimal(v: f64) -> Option<Decimal> {
    if v.is_finite() {
        Decimal::from_f64(v)
    } else {
        None
    }
}

// =============================================================================
// Levels
// =============================================================================

fn level_to_proto(level: &PriceLevel) -> proto::PriceLevel {
    proto::PriceLevel {
        price: decimal_to_f64(level.price),
        quantity: decimal_to_f64(level.quantity),
    }
}

fn levels_to_proto(levels: &[PriceLevel]) -> Vec<proto::PriceLevel> {
    levels.iter().map(level_to_proto).collect()
}

fn levels_from_proto(instrument_id: &str, levels: Vec<proto::PriceLevel>) -> Vec<PriceLevel> {
    levels
        .into_iter()
        .filter_map(|l| match (f64_to_decimal(l.price), f64_to_decimal(l.quantity)) {
            (Some(price), Some(quantity)) => Some(PriceLevel::new(price, quantity)),
            _ => {
                tracing::warn!(
                    instrument_id,
                    price = l.price,
                    quantity = l.quantity,
                    "Dropping price level with non-finite value"
                );
                None
            }
        })
        .collect()
}

// =============================================================================
// Server → Client
// =============================================================================

/// Domain message to wire update.
#[must_use]
pub fn message_to_proto(message: &MarketDataMessage) -> MarketDataUpdate {
    let update = match message {
        MarketDataMessage::Snapshot(s) => Update::Snapshot(OrderBookSnapshot {
            instrument_id: s.instrument_id.clone(),
            bids: levels_to_proto(&s.bids),
            asks: levels_to_proto(&s.asks),
        }),
        MarketDataMessage::Incremental(u) => {
            Update::IncrementalUpdate(OrderBookIncrementalUpdate {
                instrument_id: u.instrument_id.clone(),
                bid_updates: levels_to_proto(&u.bid_updates),
                ask_updates: levels_to_proto(&u.ask_updates),
            })
        }
    };
    MarketDataUpdate {
        update: Some(update),
    }
}

/// Wire update to domain message; `None` when the update carries no payload.
#[must_use]
pub fn message_from_proto(update: MarketDataUpdate) -> Option<MarketDataMessage> {
    match update.update? {
        Update::Snapshot(s) => Some(MarketDataMessage::Snapshot(Snapshot {
            bids: levels_from_proto(&s.instrument_id, s.bids),
            asks: levels_from_proto(&s.instrument_id, s.asks),
            instrument_id: s.instrument_id,
        })),
        Update::IncrementalUpdate(u) => Some(MarketDataMessage::Incremental(IncrementalUpdate {
            bid_updates: levels_from_proto(&u.instrument_id, u.bid_updates),
            ask_updates: levels_from_proto(&u.instrument_id, u.ask_updates),
            instrument_id: u.instrument_id,
        })),
    }
}

// =============================================================================
// Client → Server
// =============================================================================

/// Why an inbound request was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCommand {
    /// Action left at its zero value.
    #[error("subscription action unspecified")]
    UnspecifiedAction,
    /// Action value not in the schema.
    #[error("unknown subscription action {0}")]
    UnknownAction(i32),
    /// Instrument id missing.
    #[error("instrument id is empty")]
    EmptyInstrument,
}

impl InvalidCommand {
    /// Reason label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnspecifiedAction => "unspecified_action",
            Self::UnknownAction(_) => "unknown_action",
            Self::EmptyInstrument => "empty_instrument",
        }
    }
}

/// Domain command to wire request.
#[must_use]
pub fn command_to_proto(command: &SubscriptionCommand) -> SubscriptionRequest {
    let action = match command.action {
        SubscriptionAction::Subscribe => Action::Subscribe,
        SubscriptionAction::Unsubscribe => Action::Unsubscribe,
    };
    SubscriptionRequest {
        action: i32::from(action),
        instrument_id: command.instrument_id.clone(),
    }
}

/// Wire request to domain command.
///
/// # Errors
///
/// Returns [`InvalidCommand`] for an unspecified or unknown action, or an
/// empty instrument id.
pub fn command_from_proto(request: SubscriptionRequest) -> Result<SubscriptionCommand, InvalidCommand> {
    let action = match Action::try_from(request.action) {
        Ok(Action::Subscribe) => SubscriptionAction::Subscribe,
        Ok(Action::Unsubscribe) => SubscriptionAction::Unsubscribe,
        Ok(Action::Unspecified) => return Err(InvalidCommand::UnspecifiedAction),
        Err(_) => return Err(InvalidCommand::UnknownAction(request.action)),
    };
    if request.instrument_id.is_empty() {
        return Err(InvalidCommand::EmptyInstrument);
    }
    Ok(SubscriptionCommand {
        action,
        instrument_id: request.instrument_id,
    })
}

// =============================================================================
// Tests
// =============================================================================
