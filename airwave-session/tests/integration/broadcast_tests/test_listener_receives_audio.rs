use std::sync::Arc;

use airwave_core::SignalKind;
use airwave_session::media::PacketCounterSink;
use airwave_session::peer::HandshakeState;
use airwave_session::signaling::MemoryBus;
use airwave_session::{Role, SessionManager, TransportConfig};

use crate::integration::init_tracing;
use crate::utils::{CONNECTION_TIMEOUT_MS, start_broadcaster, wait_for_rows, wait_for_status};

#[tokio::test]
async fn test_listener_connects_and_receives_audio() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut broadcaster = start_broadcaster(&bus, "R", "B").await.expect("broadcast");

    let sink = PacketCounterSink::new();
    let mut listener = SessionManager::new(Arc::new(bus.clone()), TransportConfig::local_only())
        .with_sink(Arc::new(sink.clone()));
    listener
        .join_as_listener("R".into(), "L".into())
        .await
        .expect("join");
    assert_eq!(listener.role(), Role::Listener);

    wait_for_rows(&bus, SignalKind::Offer, "B", "L", 1)
        .await
        .expect("offer");
    wait_for_rows(&bus, SignalKind::Answer, "L", "B", 1)
        .await
        .expect("answer");

    let status = wait_for_status(&broadcaster, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 1
    })
    .await
    .expect("broadcaster connected");
    assert_eq!(status.role, Role::Broadcaster);

    let status = wait_for_status(&listener, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 1 && s.receiving_audio
    })
    .await
    .expect("listener receiving");
    assert_eq!(status.role, Role::Listener);
    assert_eq!(sink.tracks(), 1);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while sink.packets() == 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(sink.packets() > 0, "no RTP reached the listener");

    assert_eq!(
        broadcaster.registry().get(&"L".into()).unwrap().handshake(),
        HandshakeState::Connected
    );
    assert_eq!(
        listener.registry().get(&"B".into()).unwrap().handshake(),
        HandshakeState::Connected
    );

    // Candidates flowed both ways as individual rows.
    assert!(
        !crate::utils::rows_between(&bus, SignalKind::IceCandidate, "B", "L").is_empty()
    );
    assert!(
        !crate::utils::rows_between(&bus, SignalKind::IceCandidate, "L", "B").is_empty()
    );

    assert_eq!(listener.stop().await, 1);
    assert!(listener.status().is_idle());
    broadcaster.stop().await;
}
