//! Connection Session
//!
//! Owns one client connection: reads subscription commands in arrival
//! order, dispatches them to the connection's [`SubscriptionRegistry`], and
//! tears everything down when the read side ends or a write fails.
//!
//! Teardown completes only after every producer started on the connection
//! has exited.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use super::outbound::{OutboundError, OutboundGate};
use super::registry::SubscriptionRegistry;
use crate::domain::subscription::{SubscriptionAction, SubscriptionCommand};
use crate::infrastructure::metrics;

/// Connection identifier, unique per server process.
pub type ConnectionId = u64;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed its command stream.
    PeerClosed,
    /// Reading the next command failed.
    ReadFailed,
    /// An outbound write failed.
    WriteFailed,
}

impl SessionEnd {
    /// End reason for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFailed => "read_failed",
            Self::WriteFailed => "write_failed",
        }
    }
}

/// What happened over a session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Why the session ended.
    pub end: SessionEnd,
    /// Commands dispatched to the registry.
    pub commands: u64,
    /// Producers started.
    pub producers_started: u64,
    /// Producers joined during teardown.
    pub producers_joined: usize,
    /// Messages written to the client.
    pub messages_sent: u64,
}

/// Read loop and teardown for one connection.
pub struct ConnectionSession<S> {
    connection_id: ConnectionId,
    inbound: S,
    gate: Arc<OutboundGate>,
    registry: SubscriptionRegistry,
}

impl<S, E> ConnectionSession<S>
where
    S: Stream<Item = Result<SubscriptionCommand, E>> + Unpin + Send,
    E: Display,
{
    /// Create a session reading commands from `inbound`.
    ///
    /// `registry` must write through `gate`.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        inbound: S,
        gate: Arc<OutboundGate>,
        registry: SubscriptionRegistry,
    ) -> Self {
        Self {
            connection_id,
            inbound,
            gate,
            registry,
        }
    }

    /// Run until the read side ends or a write fails, then stop and join
    /// every producer.
    pub async fn run(mut self) -> SessionSummary {
        tracing::info!(connection_id = self.connection_id, "Client connected");

        let (end, commands) = self.read_loop().await;

        let producers_started = self.registry.producers_started();
        let producers_joined = self.registry.shutdown().await;
        let messages_sent = self.gate.messages_sent();

        tracing::info!(
            connection_id = self.connection_id,
            reason = end.as_str(),
            commands,
            producers_joined,
            messages_sent,
            "Client disconnected, cleaned up subscriptions"
        );

        SessionSummary {
            end,
            commands,
            producers_started,
            producers_joined,
            messages_sent,
        }
    }

    async fn read_loop(&mut self) -> (SessionEnd, u64) {
        let mut commands = 0_u64;
        loop {
            let next = tokio::select! {
                biased;
                () = self.gate.closed() => return (SessionEnd::WriteFailed, commands),
                next = self.inbound.next() => next,
            };

            let command = match next {
                None => return (SessionEnd::PeerClosed, commands),
                Some(Err(e)) => {
                    tracing::warn!(
                        connection_id = self.connection_id,
                        error = %e,
                        "Failed to read subscription command"
                    );
                    return (SessionEnd::ReadFailed, commands);
                }
                Some(Ok(command)) => command,
            };

            commands += 1;
            metrics::record_command_received(command.action);
            if self.dispatch(&command).await.is_err() {
                return (SessionEnd::WriteFailed, commands);
            }
        }
    }

    async fn dispatch(&mut self, command: &SubscriptionCommand) -> Result<(), OutboundError> {
        tracing::debug!(
            connection_id = self.connection_id,
            action = command.action.as_str(),
            instrument_id = %command.instrument_id,
            "Received subscription command"
        );
        match command.action {
            SubscriptionAction::Subscribe => {
                self.registry.subscribe(&command.instrument_id).await?;
            }
            SubscriptionAction::Unsubscribe => {
                self.registry.unsubscribe(&command.instrument_id).await?;
            }
        }
        Ok(())
    }
}
