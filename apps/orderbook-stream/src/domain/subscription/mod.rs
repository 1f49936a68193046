//! Subscription Commands and Lifecycle States
//!
//! Consumer-issued commands and the per-instrument state a connection's
//! subscription registry moves through.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──SUBSCRIBE──► Active ──UNSUBSCRIBE──► Stopping ──producer exits──► Idle
//!                        │  ▲
//!                        └──┘ SUBSCRIBE (no-op)
//! ```

use super::streaming::InstrumentId;

/// What a consumer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionAction {
    /// Start streaming an instrument.
    Subscribe,
    /// Stop streaming an instrument.
    Unsubscribe,
}

impl SubscriptionAction {
    /// Action name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// A consumer-to-server command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCommand {
    /// Requested action.
    pub action: SubscriptionAction,
    /// Target instrument.
    pub instrument_id: InstrumentId,
}

impl SubscriptionCommand {
    /// Build a SUBSCRIBE command.
    #[must_use]
    pub fn subscribe(instrument_id: impl Into<InstrumentId>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            instrument_id: instrument_id.into(),
        }
    }

    /// Build an UNSUBSCRIBE command.
    #[must_use]
    pub fn unsubscribe(instrument_id: impl Into<InstrumentId>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            instrument_id: instrument_id.into(),
        }
    }
}

/// Lifecycle state of one instrument on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// No live producer.
    Idle,
    /// Producer running, stop not requested.
    Active,
    /// Stop requested, producer has not exited yet.
    Stopping,
}

impl SubscriptionState {
    /// State name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Stopping => "stopping",
        }
    }
}
