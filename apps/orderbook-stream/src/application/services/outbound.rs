//! Outbound Gate
//!
//! Single-writer gate over one connection's outbound channel. The
//! subscription registry (snapshots, unsubscribe acknowledgements) and every
//! update producer (incrementals) write through the same gate, one message
//! at a time.
//!
//! The first failed write is logged once and trips the gate's `closed`
//! token, which the connection session watches to end its read loop.
//! Every later write fails fast with [`OutboundError::Closed`].

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::session::ConnectionId;
use crate::domain::streaming::MarketDataMessage;
use crate::infrastructure::metrics;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was written.
    Sent,
    /// The writer's stop signal was set; nothing was written.
    Suppressed,
}

/// Outbound write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboundError {
    /// The consumer is gone or the channel was dropped.
    #[error("outbound channel closed")]
    Closed,
}

/// Serialized writer for one connection.
#[derive(Debug)]
pub struct OutboundGate {
    connection_id: ConnectionId,
    writer: Mutex<mpsc::Sender<MarketDataMessage>>,
    closed: CancellationToken,
    sent: AtomicU64,
}

impl OutboundGate {
    /// Wrap an existing sender.
    #[must_use]
    pub fn new(connection_id: ConnectionId, writer: mpsc::Sender<MarketDataMessage>) -> Self {
        Self {
            connection_id,
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
            sent: AtomicU64::new(0),
        }
    }

    /// Create a gate and the receiving end that feeds the transport.
    #[must_use]
    pub fn channel(
        connection_id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<MarketDataMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(connection_id, tx), rx)
    }

    /// Write `message` unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Closed`] if this or any earlier write failed.
    pub async fn send(&self, message: MarketDataMessage) -> Result<(), OutboundError> {
        let writer = self.writer.lock().await;
        self.write(&writer, message).await
    }

    /// Write `message` unless `stop` is set.
    ///
    /// `stop` is checked while holding the gate, so once the owner of `stop`
    /// cancels it and then writes through the gate, nothing from this
    /// writer can follow. Waiting for the gate or for channel capacity also
    /// ends as soon as `stop` fires, so a consumer that stops reading cannot
    /// pin a stopped writer.
    ///
    /// # Errors
    ///
    /// Returns [`OutboundError::Closed`] if this or any earlier write failed.
    pub async fn send_unless_stopped(
        &self,
        message: MarketDataMessage,
        stop: &CancellationToken,
    ) -> Result<Delivery, OutboundError> {
        let writer = tokio::select! {
            biased;
            () = stop.cancelled() => return Ok(Delivery::Suppressed),
            writer = self.writer.lock() => writer,
        };
        if stop.is_cancelled() {
            return Ok(Delivery::Suppressed);
        }

        // `mpsc::Sender::send` is cancel safe: a dropped send writes nothing.
        tokio::select! {
            biased;
            () = stop.cancelled() => Ok(Delivery::Suppressed),
            result = self.write(&writer, message) => result.map(|()| Delivery::Sent),
        }
    }

    async fn write(
        &self,
        writer: &mpsc::Sender<MarketDataMessage>,
        message: MarketDataMessage,
    ) -> Result<(), OutboundError> {
        if self.closed.is_cancelled() {
            return Err(OutboundError::Closed);
        }

        let kind = message.kind();
        match writer.send(message).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                metrics::record_message_sent(kind);
                Ok(())
            }
            Err(mpsc::error::SendError(message)) => {
                // Writes are serialized, so only the first failure gets here.
                tracing::warn!(
                    connection_id = self.connection_id,
                    instrument_id = message.instrument_id(),
                    kind,
                    "Outbound write failed, client likely disconnected"
                );
                metrics::record_write_failure();
                self.closed.cancel();
                Err(OutboundError::Closed)
            }
        }
    }

    /// Resolves once a write has failed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Whether a write has failed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Messages successfully written.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::streaming::Snapshot;

    fn ack(id: &str) -> MarketDataMessage {
        Snapshot::empty(id).into()
    }

    #[tokio::test]
    async fn send_delivers_in_order() {
        let (gate, mut rx) = OutboundGate::channel(1, 8);

        gate.send(ack("AAPL")).await.unwrap();
        gate.send(ack("MSFT")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().instrument_id(), "AAPL");
        assert_eq!(rx.recv().await.unwrap().instrument_id(), "MSFT");
        assert_eq!(gate.messages_sent(), 2);
    }

    #[tokio::test]
    async fn stopped_writer_is_suppressed() {
        let (gate, mut rx) = OutboundGate::channel(1, 8);
        let stop = CancellationToken::new();
        stop.cancel();

        let delivery = gate.send_unless_stopped(ack("AAPL"), &stop).await.unwrap();

        assert_eq!(delivery, Delivery::Suppressed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_releases_writer_blocked_on_full_channel() {
        let (gate, mut rx) = OutboundGate::channel(1, 1);
        let gate = Arc::new(gate);
        gate.send(ack("AAPL")).await.unwrap();

        let stop = CancellationToken::new();
        let blocked = {
            let gate = Arc::clone(&gate);
            let stop = stop.clone();
            tokio::spawn(async move { gate.send_unless_stopped(ack("MSFT"), &stop).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        stop.cancel();
        let delivery = tokio::time::timeout(std::time::Duration::from_secs(1), blocked)
            .await
            .expect("stopped writer should give up the gate")
            .unwrap();
        assert_eq!(delivery, Ok(Delivery::Suppressed));

        // The suppressed message never reached the channel and the gate is free.
        assert_eq!(rx.recv().await.unwrap().instrument_id(), "AAPL");
        gate.send(ack("GOOG")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().instrument_id(), "GOOG");
        assert_eq!(gate.messages_sent(), 2);
        assert!(!gate.is_closed());
    }

    #[tokio::test]
    async fn first_failure_closes_gate_for_everyone() {
        let (gate, rx) = OutboundGate::channel(7, 8);
        drop(rx);

        assert_eq!(gate.send(ack("AAPL")).await, Err(OutboundError::Closed));
        assert!(gate.is_closed());

        let stop = CancellationToken::new();
        assert_eq!(
            gate.send_unless_stopped(ack("MSFT"), &stop).await,
            Err(OutboundError::Closed)
        );
        assert_eq!(gate.messages_sent(), 0);
    }

    #[tokio::test]
    async fn closed_future_resolves_after_failure() {
        let (gate, rx) = OutboundGate::channel(1, 1);
        let gate = Arc::new(gate);
        drop(rx);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.closed().await })
        };

        let _ = gate.send(ack("AAPL")).await;

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
    }
}
