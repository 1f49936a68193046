//! Update Producer
//!
//! One task per (connection, instrument). Emits one incremental update per
//! tick until its stop token is set, its generator is exhausted, or a write
//! through the outbound gate fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::outbound::{Delivery, OutboundError, OutboundGate};
use super::session::ConnectionId;
use crate::application::ports::UpdateGenerator;
use crate::domain::streaming::InstrumentId;
use crate::infrastructure::metrics;

/// Why a producer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Stop signal observed.
    Stopped,
    /// Generator ran out of updates.
    Exhausted,
    /// Outbound write failed; the consumer is gone.
    DeliveryFailed,
}

impl ProducerExit {
    /// Exit reason for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Exhausted => "exhausted",
            Self::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Incremental update loop for one subscribed instrument.
pub struct UpdateProducer {
    connection_id: ConnectionId,
    instrument_id: InstrumentId,
    generator: Box<dyn UpdateGenerator>,
    gate: Arc<OutboundGate>,
    tick_interval: Duration,
}

impl UpdateProducer {
    /// Create a producer; nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        instrument_id: InstrumentId,
        generator: Box<dyn UpdateGenerator>,
        gate: Arc<OutboundGate>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            connection_id,
            instrument_id,
            generator,
            gate,
            tick_interval,
        }
    }

    /// Spawn the producer loop. `stop` is level-triggered: once set, the
    /// producer exits within one tick and writes nothing further.
    #[must_use]
    pub fn start(self, stop: CancellationToken) -> JoinHandle<ProducerExit> {
        tokio::spawn(self.run(stop))
    }

    async fn run(mut self, stop: CancellationToken) -> ProducerExit {
        metrics::producer_started();
        tracing::info!(
            connection_id = self.connection_id,
            instrument_id = %self.instrument_id,
            "Starting incremental update stream"
        );

        let exit = self.produce(&stop).await;

        metrics::producer_stopped();
        tracing::info!(
            connection_id = self.connection_id,
            instrument_id = %self.instrument_id,
            exit = exit.as_str(),
            "Stopped incremental update stream"
        );
        exit
    }

    async fn produce(&mut self, stop: &CancellationToken) -> ProducerExit {
        loop {
            if stop.is_cancelled() {
                return ProducerExit::Stopped;
            }

            let next = tokio::select! {
                biased;
                () = stop.cancelled() => return ProducerExit::Stopped,
                next = self.generator.next_update() => next,
            };
            let Some(update) = next else {
                return ProducerExit::Exhausted;
            };

            match self.gate.send_unless_stopped(update.into(), stop).await {
                Ok(Delivery::Sent) => {}
                Ok(Delivery::Suppressed) => return ProducerExit::Stopped,
                // Already reported once by the gate.
                Err(OutboundError::Closed) => return ProducerExit::DeliveryFailed,
            }

            tokio::select! {
                biased;
                () = stop.cancelled() => return ProducerExit::Stopped,
                () = tokio::time::sleep(self.tick_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::order_book::PriceLevel;
    use crate::domain::streaming::{IncrementalUpdate, MarketDataMessage};

    struct Counting {
        remaining: Option<u32>,
    }

    #[async_trait]
    impl UpdateGenerator for Counting {
        async fn next_update(&mut self) -> Option<IncrementalUpdate> {
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
            }
            Some(IncrementalUpdate {
                instrument_id: "AAPL".to_string(),
                bid_updates: vec![PriceLevel::new(dec!(99), dec!(1))],
                ask_updates: vec![],
            })
        }
    }

    fn producer(gate: &Arc<OutboundGate>, remaining: Option<u32>) -> UpdateProducer {
        UpdateProducer::new(
            1,
            "AAPL".to_string(),
            Box::new(Counting { remaining }),
            Arc::clone(gate),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn bounded_generator_exhausts() {
        let (gate, mut rx) = OutboundGate::channel(1, 16);
        let gate = Arc::new(gate);

        let exit = producer(&gate, Some(3))
            .start(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exit, ProducerExit::Exhausted);
        for _ in 0..3 {
            assert!(matches!(
                rx.recv().await.unwrap(),
                MarketDataMessage::Incremental(_)
            ));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_signal_ends_producer_promptly() {
        let (gate, _rx) = OutboundGate::channel(1, 1024);
        let gate = Arc::new(gate);
        let stop = CancellationToken::new();

        let handle = producer(&gate, None).start(stop.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("producer should exit within a tick")
            .unwrap();
        assert_eq!(exit, ProducerExit::Stopped);
    }

    #[tokio::test]
    async fn pre_cancelled_producer_writes_nothing() {
        let (gate, mut rx) = OutboundGate::channel(1, 16);
        let gate = Arc::new(gate);
        let stop = CancellationToken::new();
        stop.cancel();

        let exit = producer(&gate, None).start(stop).await.unwrap();

        assert_eq!(exit, ProducerExit::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn write_failure_terminates_producer() {
        let (gate, rx) = OutboundGate::channel(1, 16);
        let gate = Arc::new(gate);
        drop(rx);

        let exit = producer(&gate, None)
            .start(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exit, ProducerExit::DeliveryFailed);
        assert!(gate.is_closed());
    }
}
