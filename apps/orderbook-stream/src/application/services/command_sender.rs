//! Client Command Sender
//!
//! Writes SUBSCRIBE and UNSUBSCRIBE commands onto the connection's outbound
//! direction. Every clone shares one bounded channel, and the channel
//! accepts whole commands only, so concurrent callers never interleave
//! mid-message.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::streaming::InstrumentId;
use crate::domain::subscription::SubscriptionCommand;

/// Command send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The outbound direction of the connection is closed.
    #[error("command stream closed")]
    Closed,
}

/// Paced command writer for one connection.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<SubscriptionCommand>,
    pace: Duration,
}

impl CommandSender {
    /// Wrap an existing sender. `pace` is the delay between SUBSCRIBEs.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<SubscriptionCommand>, pace: Duration) -> Self {
        Self { tx, pace }
    }

    /// Create a sender and the receiving end that feeds the transport.
    #[must_use]
    pub fn channel(capacity: usize, pace: Duration) -> (Self, mpsc::Receiver<SubscriptionCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, pace), rx)
    }

    /// Send one SUBSCRIBE per instrument, in order, sleeping `pace` between
    /// sends. The first failure aborts the remaining sends.
    ///
    /// Returns the number of commands sent.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Closed`] if the connection's outbound
    /// direction is gone.
    pub async fn subscribe_all(&self, instruments: &[InstrumentId]) -> Result<usize, CommandError> {
        for (sent, instrument_id) in instruments.iter().enumerate() {
            if sent > 0 {
                tokio::time::sleep(self.pace).await;
            }
            if let Err(e) = self.send(SubscriptionCommand::subscribe(instrument_id.as_str())).await {
                tracing::warn!(
                    instrument_id = %instrument_id,
                    remaining = instruments.len() - sent,
                    "Failed to send subscription request, aborting remaining"
                );
                return Err(e);
            }
            tracing::info!(instrument_id = %instrument_id, "Sent subscription request");
        }
        Ok(instruments.len())
    }

    /// Send one UNSUBSCRIBE.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Closed`] if the connection's outbound
    /// direction is gone.
    pub async fn unsubscribe(&self, instrument_id: &str) -> Result<(), CommandError> {
        match self.send(SubscriptionCommand::unsubscribe(instrument_id)).await {
            Ok(()) => {
                tracing::info!(instrument_id, "Sent unsubscribe request");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(instrument_id, "Failed to send unsubscribe request");
                Err(e)
            }
        }
    }

    async fn send(&self, command: SubscriptionCommand) -> Result<(), CommandError> {
        self.tx.send(command).await.map_err(|_| CommandError::Closed)
    }
}
