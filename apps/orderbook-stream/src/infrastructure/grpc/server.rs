//! gRPC Streaming Server Implementation
//!
//! Implements `MarketDataService.Subscribe`: one bidirectional stream per
//! consumer, driven by a [`ConnectionSession`] running on its own task.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use super::converters::{command_from_proto, message_to_proto};
use super::proto::orderbook::v1::market_data_service_server::{
    MarketDataService, MarketDataServiceServer,
};
use super::proto::orderbook::v1::{MarketDataUpdate, SubscriptionRequest};
use crate::application::ports::BookSource;
use crate::application::services::{
    ConnectionId, ConnectionSession, OutboundGate, SessionSummary, SubscriptionRegistry,
};
use crate::domain::streaming::MarketDataMessage;
use crate::infrastructure::config::ProducerSettings;
use crate::infrastructure::metrics;

type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

// =============================================================================
// Server Statistics
// =============================================================================

/// Connection counters shared with the health server.
#[derive(Debug, Default)]
pub struct ServerStats {
    active_connections: AtomicI64,
    total_connections: AtomicU64,
    producers_started: AtomicU64,
    last_connection_at: RwLock<Option<DateTime<Utc>>>,
}

impl ServerStats {
    /// Create zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        let active = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        *self.last_connection_at.write() = Some(Utc::now());
        metrics::set_connections(active);
    }

    fn connection_closed(&self, summary: &SessionSummary, duration: Duration) {
        let active = self.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;
        self.producers_started
            .fetch_add(summary.producers_started, Ordering::Relaxed);
        metrics::set_connections(active);
        metrics::record_session_duration(duration);
    }

    /// Connections currently open.
    #[must_use]
    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Connections accepted since startup.
    #[must_use]
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Producers started by connections that have since closed.
    #[must_use]
    pub fn producers_started(&self) -> u64 {
        self.producers_started.load(Ordering::Relaxed)
    }

    /// When the most recent connection was accepted.
    #[must_use]
    pub fn last_connection_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connection_at.read()
    }
}

// =============================================================================
// Server
// =============================================================================

/// gRPC market data server.
pub struct MarketDataServer {
    source: Arc<dyn BookSource>,
    settings: ProducerSettings,
    stats: Arc<ServerStats>,
}

impl MarketDataServer {
    /// Create a server producing book data from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn BookSource>, settings: ProducerSettings) -> Self {
        Self {
            source,
            settings,
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Shared connection statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Wrap in the generated tonic service.
    #[must_use]
    pub fn into_service(self) -> MarketDataServiceServer<Self> {
        MarketDataServiceServer::new(self)
    }

    fn spawn_session(
        &self,
        connection_id: ConnectionId,
        inbound: Streaming<SubscriptionRequest>,
    ) -> ReceiverStream<MarketDataMessage> {
        let commands = inbound.filter_map(move |request| match request {
            Ok(request) => match command_from_proto(request) {
                Ok(command) => Some(Ok(command)),
                Err(e) => {
                    metrics::record_invalid_command(e.as_str());
                    tracing::warn!(
                        connection_id,
                        error = %e,
                        "Discarding malformed subscription request"
                    );
                    None
                }
            },
            Err(status) => Some(Err(status)),
        });

        let (gate, outbound) = OutboundGate::channel(connection_id, self.settings.outbound_capacity);
        let gate = Arc::new(gate);
        let registry = SubscriptionRegistry::new(
            connection_id,
            Arc::clone(&gate),
            Arc::clone(&self.source),
            self.settings.tick_interval,
        );
        let session = ConnectionSession::new(connection_id, commands, gate, registry);

        let stats = Arc::clone(&self.stats);
        stats.connection_opened();
        tokio::spawn(async move {
            let started = Instant::now();
            let summary = session.run().await;
            stats.connection_closed(&summary, started.elapsed());
        });

        ReceiverStream::new(outbound)
    }
}

#[tonic::async_trait]
impl MarketDataService for MarketDataServer {
    type SubscribeStream = BoxedStream<MarketDataUpdate>;

    async fn subscribe(
        &self,
        request: Request<Streaming<SubscriptionRequest>>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let connection_id = uuid::Uuid::new_v4().as_u64_pair().0;
        let remote = request.remote_addr();
        tracing::debug!(connection_id, remote = ?remote, "Opening market data stream");

        let outbound = self.spawn_session(connection_id, request.into_inner());
        let stream = outbound.map(|message| Ok::<_, Status>(message_to_proto(&message)));

        Ok(Response::new(Box::pin(stream) as Self::SubscribeStream))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::SessionEnd;

    fn summary(producers_started: u64) -> SessionSummary {
        SessionSummary {
            end: SessionEnd::PeerClosed,
            commands: 0,
            producers_started,
            producers_joined: 0,
            messages_sent: 0,
        }
    }

    #[test]
    fn stats_track_connection_lifecycle() {
        let stats = ServerStats::new();
        assert!(stats.last_connection_at().is_none());

        stats.connection_opened();
        stats.connection_opened();
        assert_eq!(stats.active_connections(), 2);
        assert_eq!(stats.total_connections(), 2);
        assert!(stats.last_connection_at().is_some());

        stats.connection_closed(&summary(3), Duration::from_secs(1));
        assert_eq!(stats.active_connections(), 1);
        assert_eq!(stats.total_connections(), 2);
        assert_eq!(stats.producers_started(), 3);
    }
}
