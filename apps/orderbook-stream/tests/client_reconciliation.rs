//! Client Reconciliation Integration Tests
//!
//! Runs the client half (command sender, update stream, reconciler) against
//! a real server and checks the books it rebuilds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use orderbook_stream::{
    BookDisplay, ClientReconciler, MarketDataClient, MarketDataServer, OrderBook, ProducerSettings,
    ReadLoopEnd, SimulatedBookSource, drive_updates,
};

const TICK: Duration = Duration::from_millis(10);

/// Records every render instead of printing it.
#[derive(Clone, Default)]
struct RecordingDisplay {
    renders: Arc<Mutex<Vec<OrderBook>>>,
}

impl RecordingDisplay {
    fn renders_for(&self, instrument_id: &str) -> Vec<OrderBook> {
        self.renders
            .lock()
            .iter()
            .filter(|b| b.instrument_id() == instrument_id)
            .cloned()
            .collect()
    }
}

impl BookDisplay for RecordingDisplay {
    fn render(&self, book: &OrderBook) {
        self.renders.lock().push(book.clone());
    }
}

/// Start a server whose producers stop after `max_updates` and return its
/// endpoint.
async fn setup_test_server(max_updates: Option<u64>) -> String {
    let settings = ProducerSettings {
        tick_interval: TICK,
        ..ProducerSettings::default()
    };
    let server = MarketDataServer::new(Arc::new(SimulatedBookSource::new(max_updates)), settings);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(server.into_service())
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    format!("http://{addr}")
}

fn levels(side: &orderbook_stream::BookSide) -> Vec<(Decimal, Decimal)> {
    side.levels().iter().map(|l| (l.price, l.quantity)).collect()
}

#[tokio::test]
async fn test_client_rebuilds_books_and_applies_unsubscribe_ack() {
    let endpoint = setup_test_server(Some(3)).await;
    let mut client = MarketDataClient::connect(&endpoint, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(client.endpoint(), endpoint);

    let (sender, updates) = client.open_stream(Duration::ZERO).await.unwrap();

    let script = tokio::spawn(async move {
        let sent = sender
            .subscribe_all(&["AAPL".to_string(), "MSFT".to_string()])
            .await
            .unwrap();
        assert_eq!(sent, 2);

        // Both producers finish their three updates well within this.
        tokio::time::sleep(TICK * 20).await;
        sender.unsubscribe("AAPL").await.unwrap();
        tokio::time::sleep(TICK * 5).await;
        // Dropping the sender half-closes the stream.
    });

    let display = RecordingDisplay::default();
    let mut reconciler = ClientReconciler::new(display.clone());
    let summary = timeout(Duration::from_secs(5), drive_updates(updates, &mut reconciler))
        .await
        .expect("server should close the stream after half-close");
    script.await.unwrap();

    assert_eq!(summary.end, ReadLoopEnd::Closed);
    assert_eq!(summary.anomalies, 0);
    // Two snapshots, six incrementals, one acknowledgement.
    assert_eq!(summary.applied, 9);

    let msft = reconciler.book("MSFT").unwrap();
    assert_eq!(
        levels(msft.bids()),
        vec![
            (dec!(99.5), dec!(100)),
            (dec!(99.1), dec!(220)),
            (dec!(99.0), dec!(200)),
            (dec!(98.9), dec!(210)),
        ]
    );
    assert_eq!(
        levels(msft.asks()),
        vec![
            (dec!(99.9), dec!(160)),
            (dec!(100.0), dec!(150)),
            (dec!(100.1), dec!(155)),
            (dec!(100.5), dec!(250)),
        ]
    );

    // The acknowledgement empties the book but keeps it.
    let aapl = reconciler.book("AAPL").unwrap();
    assert!(aapl.is_empty());

    let aapl_renders = display.renders_for("AAPL");
    assert_eq!(aapl_renders.len(), 5);
    assert!(aapl_renders.last().unwrap().is_empty());
    assert_eq!(display.renders_for("MSFT").len(), 4);
}

#[tokio::test]
async fn test_first_snapshot_renders_fixture_book() {
    let endpoint = setup_test_server(Some(0)).await;
    let mut client = MarketDataClient::connect(&endpoint, Duration::from_secs(2))
        .await
        .unwrap();
    let (sender, updates) = client.open_stream(Duration::ZERO).await.unwrap();

    sender.subscribe_all(&["GOOG".to_string()]).await.unwrap();
    let script = tokio::spawn(async move {
        tokio::time::sleep(TICK * 5).await;
        drop(sender);
    });

    let display = RecordingDisplay::default();
    let mut reconciler = ClientReconciler::new(display.clone());
    let summary = timeout(Duration::from_secs(5), drive_updates(updates, &mut reconciler))
        .await
        .unwrap();
    script.await.unwrap();

    assert_eq!(summary.end, ReadLoopEnd::Closed);
    assert_eq!(summary.applied, 1);

    let renders = display.renders_for("GOOG");
    assert_eq!(renders.len(), 1);
    let book = &renders[0];
    assert_eq!(book.bids().best().unwrap().price, dec!(99.5));
    assert_eq!(book.asks().best().unwrap().price, dec!(100.0));
    assert_eq!(book.spread(), Some(dec!(0.5)));
}
