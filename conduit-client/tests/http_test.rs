//! Client against the real HTTP peer.

use std::sync::Arc;
use std::time::Duration;

use conduit_client::{
    Conversation, ConversationDriver, DriverSettings, HandshakeOrchestrator, HttpTransport,
    TripOutcome,
};
use conduit_core::wire::codes;
use conduit_core::{
    ConduitError, DrbgEngine, ReseedMonitor, SessionStateStore, StoreConfig, TransportError,
};
use conduit_server::{router, PeerState};
use tokio::net::TcpListener;

async fn start_peer() -> (String, Arc<PeerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(PeerState::default());
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn orchestrator(
    base_url: &str,
    timeout: Duration,
) -> Arc<HandshakeOrchestrator<HttpTransport, DrbgEngine>> {
    let transport = Arc::new(HttpTransport::new(base_url, timeout).unwrap());
    let store = Arc::new(SessionStateStore::new(StoreConfig::default()));
    Arc::new(HandshakeOrchestrator::new(
        transport,
        store,
        Default::default(),
        timeout,
    ))
}

#[tokio::test]
async fn test_round_trips_over_http() {
    let (base_url, peer) = start_peer().await;
    let orchestrator = orchestrator(&base_url, Duration::from_secs(5));
    let monitor = Arc::new(ReseedMonitor::default());

    let mut conversation = Conversation::open("http-1", orchestrator, monitor)
        .await
        .unwrap();
    assert!(peer.has_conversation("http-1"));

    for trip in 1..=5 {
        let message = format!("Hello from client 1 for the {} time.", trip);
        assert_eq!(
            conversation.round_trip(&message).await.unwrap(),
            TripOutcome::Completed { reply: message }
        );
    }

    peer.forget("http-1");
    assert_eq!(
        conversation.round_trip("after loss").await.unwrap(),
        TripOutcome::Recovered
    );
}

#[tokio::test]
async fn test_driver_over_http() {
    let (base_url, _peer) = start_peer().await;
    let mut driver = ConversationDriver::new(
        orchestrator(&base_url, Duration::from_secs(5)),
        Arc::new(ReseedMonitor::default()),
        DriverSettings {
            max_trips: 3,
            max_delay: Duration::from_millis(5),
        },
    );

    assert!(driver.open(4).await.is_empty());
    let report = driver.run_batch().await;
    assert_eq!(report.conversations.len(), 4);
    assert_eq!(report.failures().count(), 0);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let orchestrator = orchestrator(&format!("http://{}", addr), Duration::from_millis(200));
    let err = orchestrator.handshake("c1").await.unwrap_err();
    assert!(matches!(
        err,
        ConduitError::Transport(TransportError::Timeout { .. })
    ));
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn test_unreachable_peer_is_request_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let orchestrator = orchestrator(&format!("http://{}", addr), Duration::from_secs(2));
    let err = orchestrator.handshake("c1").await.unwrap_err();
    assert!(matches!(
        err,
        ConduitError::Transport(TransportError::Request { .. })
    ));
}

#[tokio::test]
async fn test_non_ascii_id_rejected_before_sending() {
    let (base_url, peer) = start_peer().await;
    let orchestrator = orchestrator(&base_url, Duration::from_secs(5));

    let err = orchestrator.handshake("café-1").await.unwrap_err();
    assert_eq!(err.result_code(), codes::VALIDATION_ERROR);
    assert!(!peer.has_conversation("café-1"));
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn test_punctuated_id_round_trips_over_http() {
    let (base_url, peer) = start_peer().await;
    let orchestrator = orchestrator(&base_url, Duration::from_secs(5));
    let id = "conv:42/a_b.c~d";

    let mut conversation = Conversation::open(id, orchestrator, Arc::new(ReseedMonitor::default()))
        .await
        .unwrap();
    assert!(peer.has_conversation(id));
    assert_eq!(
        conversation.round_trip("héllo wörld").await.unwrap(),
        TripOutcome::Completed {
            reply: "héllo wörld".to_string()
        }
    );
}
