use airwave_session::peer::HandshakeState;
use airwave_session::signaling::MemoryBus;

use crate::integration::init_tracing;
use crate::utils::{CONNECTION_TIMEOUT_MS, start_broadcaster, start_listener, wait_for_status};

#[tokio::test]
async fn test_lost_listener_is_evicted_and_can_rejoin() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut broadcaster = start_broadcaster(&bus, "R", "B").await.expect("broadcast");
    let mut listener = start_listener(&bus, "R", "L").await.expect("listen");

    wait_for_status(&broadcaster, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 1
    })
    .await
    .expect("broadcaster connected");
    let first = broadcaster.registry().get(&"L".into()).expect("peer");
    assert_eq!(first.handshake(), HandshakeState::Connected);

    // The listener goes away without any signaling row; only the link notices.
    listener.stop().await;

    let status = wait_for_status(&broadcaster, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 0
    })
    .await
    .expect("listener evicted");
    assert_eq!(status.connected_peers, 0);
    assert!(broadcaster.registry().get(&"L".into()).is_none());
    assert!(broadcaster.registry().is_empty());

    // A fresh join is the recovery path.
    let mut listener = start_listener(&bus, "R", "L").await.expect("rejoin");
    wait_for_status(&broadcaster, CONNECTION_TIMEOUT_MS, |s| {
        s.connected_peers == 1
    })
    .await
    .expect("rejoined listener connected");
    let second = broadcaster.registry().get(&"L".into()).expect("peer");
    assert!(second.epoch() > first.epoch());

    listener.stop().await;
    broadcaster.stop().await;
}
