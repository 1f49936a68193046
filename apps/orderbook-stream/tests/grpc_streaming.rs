//! gRPC Streaming Integration Tests
//!
//! Drives a real server over loopback with the generated client and checks
//! the subscription lifecycle as seen on the wire.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::Streaming;
use tonic::transport::{Channel, Server};

use orderbook_stream::{
    MarketDataServer, ProducerSettings, ServerStats, SimulatedBookSource,
    proto::{
        MarketDataUpdate, OrderBookIncrementalUpdate, OrderBookSnapshot, SubscriptionRequest,
        market_data_service_client::MarketDataServiceClient, market_data_update::Update,
        subscription_request::Action,
    },
};

const TICK: Duration = Duration::from_millis(20);
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Start a test gRPC server on a random port and return a client.
async fn setup_test_server() -> (MarketDataServiceClient<Channel>, Arc<ServerStats>) {
    let settings = ProducerSettings {
        tick_interval: TICK,
        ..ProducerSettings::default()
    };
    let server = MarketDataServer::new(Arc::new(SimulatedBookSource::default()), settings);
    let stats = server.stats();

    // Find an available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(server.into_service())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    let client = MarketDataServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    (client, stats)
}

/// One open `Subscribe` call.
struct Session {
    commands: Option<mpsc::Sender<SubscriptionRequest>>,
    updates: Streaming<MarketDataUpdate>,
}

impl Session {
    async fn open(client: &mut MarketDataServiceClient<Channel>) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let updates = client
            .subscribe(ReceiverStream::new(rx))
            .await
            .unwrap()
            .into_inner();
        Self {
            commands: Some(tx),
            updates,
        }
    }

    async fn send(&self, action: Action, instrument_id: &str) {
        self.commands
            .as_ref()
            .expect("stream still open")
            .send(SubscriptionRequest {
                action: action.into(),
                instrument_id: instrument_id.to_string(),
            })
            .await
            .unwrap();
    }

    async fn next(&mut self) -> Option<Update> {
        timeout(RECV_TIMEOUT, self.updates.message())
            .await
            .expect("timed out waiting for update")
            .unwrap()
            .map(|u| u.update.expect("update carries a payload"))
    }

    async fn next_snapshot(&mut self) -> OrderBookSnapshot {
        match self.next().await {
            Some(Update::Snapshot(s)) => s,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    async fn next_incremental(&mut self) -> OrderBookIncrementalUpdate {
        match self.next().await {
            Some(Update::IncrementalUpdate(u)) => u,
            other => panic!("expected incremental, got {other:?}"),
        }
    }

    /// Half-close and collect everything until the server ends the stream.
    async fn close_and_drain(mut self) -> Vec<Update> {
        self.commands.take();
        let mut rest = Vec::new();
        while let Some(update) = self.next().await {
            rest.push(update);
        }
        rest
    }
}

fn is_empty_snapshot(update: &Update, instrument_id: &str) -> bool {
    matches!(update, Update::Snapshot(s)
        if s.instrument_id == instrument_id && s.bids.is_empty() && s.asks.is_empty())
}

// =============================================================================
// Subscribe
// =============================================================================

#[tokio::test]
async fn test_subscribe_sends_snapshot_then_alternating_incrementals() {
    let (mut client, _stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    session.send(Action::Subscribe, "AAPL").await;

    let snapshot = session.next_snapshot().await;
    assert_eq!(snapshot.instrument_id, "AAPL");
    let bids: Vec<_> = snapshot.bids.iter().map(|l| (l.price, l.quantity)).collect();
    let asks: Vec<_> = snapshot.asks.iter().map(|l| (l.price, l.quantity)).collect();
    assert_eq!(bids, vec![(99.5, 100.0), (99.0, 200.0)]);
    assert_eq!(asks, vec![(100.0, 150.0), (100.5, 250.0)]);

    let first = session.next_incremental().await;
    let second = session.next_incremental().await;
    assert_eq!(first.instrument_id, "AAPL");
    assert!((first.bid_updates[0].price - 99.1).abs() < 1e-9);
    assert!((first.ask_updates[0].price - 99.9).abs() < 1e-9);
    assert!((second.bid_updates[0].price - 98.9).abs() < 1e-9);
    assert!((second.ask_updates[0].price - 100.1).abs() < 1e-9);
    assert_eq!(second.bid_updates[0].quantity, 210.0);

    session.close_and_drain().await;
}

#[tokio::test]
async fn test_duplicate_subscribe_yields_one_snapshot() {
    let (mut client, stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    session.send(Action::Subscribe, "AAPL").await;
    session.send(Action::Subscribe, "AAPL").await;
    session.next_snapshot().await;
    tokio::time::sleep(TICK * 5).await;

    let rest = session.close_and_drain().await;
    assert!(
        rest.iter().all(|u| matches!(u, Update::IncrementalUpdate(_))),
        "second SUBSCRIBE must not resend a snapshot"
    );

    // One producer per instrument, counted once the session has closed.
    tokio::time::sleep(TICK).await;
    assert_eq!(stats.producers_started(), 1);
}

// =============================================================================
// Unsubscribe
// =============================================================================

#[tokio::test]
async fn test_unsubscribe_ack_is_last_message_for_instrument() {
    let (mut client, _stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    session.send(Action::Subscribe, "AAPL").await;
    session.send(Action::Subscribe, "MSFT").await;
    session.next_snapshot().await;
    tokio::time::sleep(TICK * 3).await;
    session.send(Action::Unsubscribe, "AAPL").await;
    tokio::time::sleep(TICK * 5).await;

    let rest = session.close_and_drain().await;

    let acks: Vec<_> = rest
        .iter()
        .enumerate()
        .filter(|(_, u)| is_empty_snapshot(u, "AAPL"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(acks.len(), 1, "exactly one acknowledgement");

    let after_ack = &rest[acks[0] + 1..];
    assert!(after_ack.iter().all(|u| match u {
        Update::Snapshot(s) => s.instrument_id != "AAPL",
        Update::IncrementalUpdate(i) => i.instrument_id != "AAPL",
    }));
    assert!(
        after_ack
            .iter()
            .any(|u| matches!(u, Update::IncrementalUpdate(i) if i.instrument_id == "MSFT")),
        "other instruments keep streaming"
    );
}

#[tokio::test]
async fn test_unsubscribe_without_subscription_is_acknowledged() {
    let (mut client, _stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    session.send(Action::Unsubscribe, "GOOG").await;

    let ack = session.next_snapshot().await;
    assert_eq!(ack.instrument_id, "GOOG");
    assert!(ack.bids.is_empty() && ack.asks.is_empty());

    assert!(session.close_and_drain().await.is_empty());
}

#[tokio::test]
async fn test_resubscribe_after_unsubscribe_sends_fresh_snapshot() {
    let (mut client, _stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    session.send(Action::Subscribe, "AAPL").await;
    session.next_snapshot().await;
    session.send(Action::Unsubscribe, "AAPL").await;
    session.send(Action::Subscribe, "AAPL").await;

    let rest = session.close_and_drain().await;
    let snapshots: Vec<_> = rest
        .iter()
        .filter_map(|u| match u {
            Update::Snapshot(s) => Some(s.bids.len()),
            Update::IncrementalUpdate(_) => None,
        })
        .collect();
    assert_eq!(snapshots, vec![0, 2], "ack then a fresh full snapshot");
}

// =============================================================================
// Protocol Anomalies and Teardown
// =============================================================================

#[tokio::test]
async fn test_malformed_requests_are_ignored() {
    let (mut client, _stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    session.send(Action::Unspecified, "AAPL").await;
    session.send(Action::Subscribe, "").await;
    session.send(Action::Subscribe, "MSFT").await;

    let snapshot = session.next_snapshot().await;
    assert_eq!(snapshot.instrument_id, "MSFT");

    session.close_and_drain().await;
}

#[tokio::test]
async fn test_half_close_tears_down_connection() {
    let (mut client, stats) = setup_test_server().await;
    let mut session = Session::open(&mut client).await;

    for id in ["AAPL", "MSFT", "GOOG"] {
        session.send(Action::Subscribe, id).await;
    }
    session.next_snapshot().await;
    assert_eq!(stats.active_connections(), 1);

    // Draining to end-of-stream proves every producer released the gate.
    session.close_and_drain().await;

    tokio::time::sleep(TICK).await;
    assert_eq!(stats.active_connections(), 0);
    assert_eq!(stats.total_connections(), 1);
    assert_eq!(stats.producers_started(), 3);
}

#[tokio::test]
async fn test_connections_are_independent() {
    let (mut client, _stats) = setup_test_server().await;
    let mut first = Session::open(&mut client).await;
    let mut second = Session::open(&mut client).await;

    first.send(Action::Subscribe, "AAPL").await;
    second.send(Action::Subscribe, "AAPL").await;

    assert_eq!(first.next_snapshot().await.instrument_id, "AAPL");
    assert_eq!(second.next_snapshot().await.instrument_id, "AAPL");

    first.send(Action::Unsubscribe, "AAPL").await;
    first.close_and_drain().await;

    // The other consumer's subscription is unaffected.
    let update = second.next_incremental().await;
    assert_eq!(update.instrument_id, "AAPL");
    second.close_and_drain().await;
}
