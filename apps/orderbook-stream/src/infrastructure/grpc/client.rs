//! gRPC Market Data Client
//!
//! Opens the bidirectional `Subscribe` stream and adapts both directions to
//! domain types: a [`CommandSender`] for commands going up and an
//! [`UpdateStream`] of [`MarketDataMessage`]s coming down.

use std::pin::Pin;
use std::time::Duration;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;
use tonic::transport::{Channel, Endpoint};

use super::converters::{command_to_proto, message_from_proto};
use super::proto::orderbook::v1::market_data_service_client::MarketDataServiceClient;
use crate::application::services::CommandSender;
use crate::domain::streaming::MarketDataMessage;
use crate::infrastructure::metrics;

/// Capacity of the outbound command channel.
const COMMAND_BUFFER: usize = 64;

/// Server updates converted to domain messages.
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<MarketDataMessage, Status>> + Send>>;

/// Client connection failure.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Endpoint string is not a valid URI.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    /// Connection could not be established.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The server rejected the call.
    #[error("server returned status: {0}")]
    Status(#[from] Status),
}

/// Connected market data client.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    inner: MarketDataServiceClient<Channel>,
    endpoint: String,
}

impl MarketDataClient {
    /// Connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid or unreachable within
    /// `connect_timeout`.
    pub async fn connect(endpoint: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|_| ClientError::InvalidEndpoint(endpoint.to_string()))?
            .connect_timeout(connect_timeout)
            .connect()
            .await?;

        tracing::info!(endpoint, "Connected to market data server");

        Ok(Self {
            inner: MarketDataServiceClient::new(channel),
            endpoint: endpoint.to_string(),
        })
    }

    /// Endpoint this client is connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the subscription stream.
    ///
    /// Dropping every clone of the returned sender half-closes the stream;
    /// the server then tears the connection down and ends the update stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the call.
    pub async fn open_stream(
        &mut self,
        command_pace: Duration,
    ) -> Result<(CommandSender, UpdateStream), ClientError> {
        let (sender, commands) = CommandSender::channel(COMMAND_BUFFER, command_pace);
        let requests = ReceiverStream::new(commands).map(|command| command_to_proto(&command));

        let inbound = self.inner.subscribe(requests).await?.into_inner();
        let updates = inbound.filter_map(|update| match update {
            Ok(update) => {
                let message = message_from_proto(update);
                if message.is_none() {
                    metrics::record_protocol_anomaly("empty_update");
                    tracing::warn!("Received update with no payload, ignoring");
                }
                message.map(Ok)
            }
            Err(status) => Some(Err(status)),
        });

        Ok((sender, Box::pin(updates)))
    }
}
