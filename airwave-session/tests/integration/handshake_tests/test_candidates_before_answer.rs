use std::sync::Arc;

use airwave_core::{NewSignal, SignalKind};
use airwave_session::peer::HandshakeState;
use airwave_session::signaling::{MemoryBus, SignalBus};

use crate::integration::init_tracing;
use crate::utils::{
    CONNECTION_TIMEOUT_MS, ICE_GATHERING_TIMEOUT_MS, TestClient, scripted_join, settle,
    start_broadcaster, wait_for_rows, wait_for_status,
};

#[tokio::test]
async fn test_early_candidates_are_queued_not_failed() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut broadcaster = start_broadcaster(&bus, "R", "B").await.expect("broadcast");
    let client = TestClient::new("L".into()).await.expect("client");

    bus.publish(NewSignal::join_request("R".into(), "L".into()))
        .await
        .unwrap();
    let offers = wait_for_rows(&bus, SignalKind::Offer, "B", "L", 1)
        .await
        .expect("offer");
    let answer = client
        .answer_offer(offers[0].sdp().unwrap().sdp)
        .await
        .expect("answer");
    let candidates = client
        .gathered_candidates(ICE_GATHERING_TIMEOUT_MS)
        .await
        .expect("candidates");
    assert!(!candidates.is_empty(), "no host candidates gathered");

    for candidate in &candidates {
        bus.publish(NewSignal::ice_candidate(
            "R".into(),
            "L".into(),
            "B".into(),
            candidate.clone(),
        ))
        .await
        .unwrap();
    }
    settle().await;

    let peer = broadcaster.registry().get(&"L".into()).expect("peer");
    assert_eq!(peer.handshake(), HandshakeState::OfferSent);
    assert_eq!(peer.pending_candidate_count(), candidates.len());

    bus.publish(NewSignal::answer("R".into(), "L".into(), "B".into(), answer))
        .await
        .unwrap();
    settle().await;

    assert_eq!(peer.pending_candidate_count(), 0);
    assert!(matches!(
        peer.handshake(),
        HandshakeState::AnswerReceived | HandshakeState::Connected
    ));

    broadcaster.stop().await;
    client.close().await.expect("close");
}

#[tokio::test]
async fn test_connects_with_candidates_ahead_of_answer() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut broadcaster = start_broadcaster(&bus, "R", "B").await.expect("broadcast");
    let client = Arc::new(TestClient::new("L".into()).await.expect("client"));

    let relay = scripted_join(&bus, "R", client.clone(), "B", true)
        .await
        .expect("scripted join");

    client
        .wait_for_connection(CONNECTION_TIMEOUT_MS)
        .await
        .expect("client connected");
    let status = wait_for_status(&broadcaster, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 1
    })
    .await
    .expect("broadcaster sees listener");
    assert_eq!(status.connected_peers, 1);
    assert_eq!(
        broadcaster.registry().get(&"L".into()).unwrap().handshake(),
        HandshakeState::Connected
    );

    relay.abort();
    broadcaster.stop().await;
    client.close().await.expect("close");
}
