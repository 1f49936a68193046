//! Subscription Registry
//!
//! Per-connection table of instrument subscriptions. Each entry holds the
//! producer's join handle and its stop token. Entries are mutated only by
//! the connection's read loop; producers only observe their own token.
//!
//! # Design
//!
//! - Stop tokens are children of one per-connection teardown token, so
//!   teardown signals every producer with a single cancel.
//! - UNSUBSCRIBE sets the stop token and keeps the entry. A later SUBSCRIBE
//!   inspects the handle to tell a still-running producer (Stopping) from a
//!   finished one (Idle) and never starts a second live producer.
//! - The initial snapshot is written before the producer is spawned, so it
//!   always precedes that instrument's first incremental.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::outbound::{OutboundError, OutboundGate};
use super::producer::{ProducerExit, UpdateProducer};
use super::session::ConnectionId;
use crate::application::ports::BookSource;
use crate::domain::streaming::{InstrumentId, Snapshot};
use crate::domain::subscription::SubscriptionState;
use crate::infrastructure::metrics::{self, SnapshotKind};

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a SUBSCRIBE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Snapshot sent and a producer started.
    Started,
    /// Instrument was already active; nothing sent.
    AlreadyActive,
}

/// Result of an UNSUBSCRIBE. An acknowledgement is sent in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// A running producer was signalled to stop.
    Stopping,
    /// No active producer for that instrument.
    NotActive,
}

// =============================================================================
// Entries
// =============================================================================

struct SubscriptionEntry {
    stop: CancellationToken,
    handle: JoinHandle<ProducerExit>,
}

impl SubscriptionEntry {
    fn state(&self) -> SubscriptionState {
        if self.handle.is_finished() {
            SubscriptionState::Idle
        } else if self.stop.is_cancelled() {
            SubscriptionState::Stopping
        } else {
            SubscriptionState::Active
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Subscription state machine for one connection.
pub struct SubscriptionRegistry {
    connection_id: ConnectionId,
    gate: Arc<OutboundGate>,
    source: Arc<dyn BookSource>,
    tick_interval: Duration,
    teardown: CancellationToken,
    entries: HashMap<InstrumentId, SubscriptionEntry>,
    producers_started: u64,
}

impl SubscriptionRegistry {
    /// Create an empty registry writing through `gate`.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        gate: Arc<OutboundGate>,
        source: Arc<dyn BookSource>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            connection_id,
            gate,
            source,
            tick_interval,
            teardown: CancellationToken::new(),
            entries: HashMap::new(),
            producers_started: 0,
        }
    }

    /// Current lifecycle state of `instrument_id`.
    #[must_use]
    pub fn state(&self, instrument_id: &str) -> SubscriptionState {
        self.entries
            .get(instrument_id)
            .map_or(SubscriptionState::Idle, SubscriptionEntry::state)
    }

    /// Producers whose task has not finished yet.
    #[must_use]
    pub fn live_producers(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !e.handle.is_finished())
            .count()
    }

    /// Producers started over the registry's lifetime.
    #[must_use]
    pub const fn producers_started(&self) -> u64 {
        self.producers_started
    }

    /// Handle SUBSCRIBE.
    ///
    /// Idle → Active sends one snapshot and starts one producer. Active is a
    /// no-op. Stopping waits for the previous producer to exit first.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Closed`] if the snapshot cannot be written.
    /// The connection should be considered dead.
    pub async fn subscribe(&mut self, instrument_id: &str) -> Result<SubscribeOutcome, OutboundError> {
        let state = self.state(instrument_id);
        tracing::debug!(
            connection_id = self.connection_id,
            instrument_id,
            state = state.as_str(),
            "Handling subscribe"
        );
        match state {
            SubscriptionState::Active => {
                tracing::info!(
                    connection_id = self.connection_id,
                    instrument_id,
                    "Already streaming updates for instrument on this connection"
                );
                return Ok(SubscribeOutcome::AlreadyActive);
            }
            SubscriptionState::Stopping | SubscriptionState::Idle => {
                self.reap(instrument_id).await;
            }
        }

        let snapshot = self.source.snapshot(instrument_id);
        self.gate.send(snapshot.into()).await?;
        metrics::record_snapshot_sent(SnapshotKind::Initial);
        tracing::info!(
            connection_id = self.connection_id,
            instrument_id,
            "Sent snapshot for instrument"
        );

        let stop = self.teardown.child_token();
        let producer = UpdateProducer::new(
            self.connection_id,
            instrument_id.to_string(),
            self.source.updates(instrument_id),
            Arc::clone(&self.gate),
            self.tick_interval,
        );
        let handle = producer.start(stop.clone());
        self.entries
            .insert(instrument_id.to_string(), SubscriptionEntry { stop, handle });
        self.producers_started += 1;

        Ok(SubscribeOutcome::Started)
    }

    /// Handle UNSUBSCRIBE.
    ///
    /// Signals the producer without waiting for it, then sends exactly one
    /// empty snapshot as acknowledgement, whether or not a producer was
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Closed`] if the acknowledgement cannot be
    /// written.
    pub async fn unsubscribe(
        &mut self,
        instrument_id: &str,
    ) -> Result<UnsubscribeOutcome, OutboundError> {
        let outcome = match self.entries.get(instrument_id) {
            Some(entry) if entry.state() == SubscriptionState::Active => {
                tracing::info!(
                    connection_id = self.connection_id,
                    instrument_id,
                    "Signaling stop for update stream"
                );
                entry.stop.cancel();
                UnsubscribeOutcome::Stopping
            }
            _ => UnsubscribeOutcome::NotActive,
        };

        self.gate.send(Snapshot::empty(instrument_id).into()).await?;
        metrics::record_snapshot_sent(SnapshotKind::Acknowledgement);
        tracing::info!(
            connection_id = self.connection_id,
            instrument_id,
            "Sent empty snapshot for unsubscription"
        );

        Ok(outcome)
    }

    /// Signal every producer, then await each one.
    ///
    /// Returns the number of producer tasks joined.
    pub async fn shutdown(mut self) -> usize {
        self.teardown.cancel();

        let mut joined = 0;
        for (instrument_id, entry) in self.entries.drain() {
            match entry.handle.await {
                Ok(exit) => tracing::debug!(
                    connection_id = self.connection_id,
                    instrument_id = %instrument_id,
                    exit = exit.as_str(),
                    "Joined update producer"
                ),
                Err(e) => tracing::warn!(
                    connection_id = self.connection_id,
                    instrument_id = %instrument_id,
                    error = %e,
                    "Update producer task failed"
                ),
            }
            joined += 1;
        }
        joined
    }

    /// Remove and join the entry for `instrument_id`, if any.
    async fn reap(&mut self, instrument_id: &str) {
        let Some(entry) = self.entries.remove(instrument_id) else {
            return;
        };
        entry.stop.cancel();
        if let Err(e) = entry.handle.await {
            tracing::warn!(
                connection_id = self.connection_id,
                instrument_id,
                error = %e,
                "Update producer task failed"
            );
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        // Producers never outlive their registry, even if shutdown was skipped.
        self.teardown.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
