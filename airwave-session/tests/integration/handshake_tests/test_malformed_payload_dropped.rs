use std::sync::Arc;

use airwave_core::{NewSignal, SignalKind};
use airwave_session::peer::HandshakeState;
use airwave_session::signaling::{MemoryBus, SignalBus};
use serde_json::json;

use crate::integration::init_tracing;
use crate::utils::{
    CONNECTION_TIMEOUT_MS, TestClient, rows_between, scripted_join, settle, start_broadcaster,
    start_listener, wait_for_rows, wait_for_status,
};

fn malformed(kind: SignalKind, from: &str, to: &str, payload: serde_json::Value) -> NewSignal {
    NewSignal {
        room_id: "R".into(),
        sender_id: from.into(),
        receiver_id: Some(to.into()),
        kind,
        payload,
    }
}

#[tokio::test]
async fn test_malformed_offer_is_dropped() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut listener = start_listener(&bus, "R", "L").await.expect("listen");

    bus.publish(malformed(SignalKind::Offer, "X", "L", json!({})))
        .await
        .unwrap();
    bus.publish(malformed(
        SignalKind::Offer,
        "Y",
        "L",
        json!({ "type": "offer", "sdp": "   " }),
    ))
    .await
    .unwrap();
    settle().await;

    assert!(listener.registry().is_empty());
    assert!(rows_between(&bus, SignalKind::Answer, "L", "X").is_empty());
    assert!(rows_between(&bus, SignalKind::Answer, "L", "Y").is_empty());

    // A well-formed offer from another broadcaster is still answered.
    let client = TestClient::new("B".into()).await.expect("client");
    let offer = client.create_audio_offer().await.expect("offer");
    bus.publish(NewSignal::offer("R".into(), "B".into(), "L".into(), offer))
        .await
        .unwrap();
    wait_for_rows(&bus, SignalKind::Answer, "L", "B", 1)
        .await
        .expect("answer to valid offer");

    let peer = listener.registry().get(&"B".into()).expect("peer");
    assert!(matches!(
        peer.handshake(),
        HandshakeState::AnswerSent | HandshakeState::Connected
    ));
    assert_eq!(listener.registry().len(), 1);

    listener.stop().await;
    client.close().await.expect("close");
}

#[tokio::test]
async fn test_malformed_answer_and_candidate_leave_handshakes_intact() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut broadcaster = start_broadcaster(&bus, "R", "B").await.expect("broadcast");

    bus.publish(NewSignal::join_request("R".into(), "L".into()))
        .await
        .unwrap();
    wait_for_rows(&bus, SignalKind::Offer, "B", "L", 1)
        .await
        .expect("offer to L");

    bus.publish(malformed(SignalKind::Answer, "L", "B", json!({})))
        .await
        .unwrap();
    bus.publish(malformed(
        SignalKind::IceCandidate,
        "L",
        "B",
        json!({ "type": "ice-candidate", "candidate": { "candidate": 7 } }),
    ))
    .await
    .unwrap();
    settle().await;

    let stuck = broadcaster.registry().get(&"L".into()).expect("peer kept");
    assert_eq!(stuck.handshake(), HandshakeState::OfferSent);
    assert_eq!(stuck.pending_candidate_count(), 0);

    // Another listener's handshake runs to completion meanwhile.
    let client = Arc::new(TestClient::new("M".into()).await.expect("client"));
    let relay = scripted_join(&bus, "R", client.clone(), "B", false)
        .await
        .expect("scripted join");
    client
        .wait_for_connection(CONNECTION_TIMEOUT_MS)
        .await
        .expect("client connected");
    wait_for_status(&broadcaster, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 1
    })
    .await
    .expect("M connected");

    assert_eq!(
        broadcaster.registry().get(&"M".into()).unwrap().handshake(),
        HandshakeState::Connected
    );
    assert_eq!(stuck.handshake(), HandshakeState::OfferSent);
    assert_eq!(broadcaster.registry().len(), 2);

    relay.abort();
    broadcaster.stop().await;
    client.close().await.expect("close");
}
