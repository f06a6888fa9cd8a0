use std::path::Path;
use std::sync::Arc;

use airwave_session::media::{PacketCounterSink, PlaylistSource};
use airwave_session::signaling::MemoryBus;
use airwave_session::{SessionManager, TransportConfig};

use crate::integration::init_tracing;
use crate::utils::{CONNECTION_TIMEOUT_MS, session, wait_for_status};

#[tokio::test]
async fn test_playlist_reaches_listener() {
    init_tracing();

    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/silence.opus");

    let bus = MemoryBus::new();
    let mut broadcaster = session(Arc::new(bus.clone()));
    broadcaster
        .start_broadcast(
            "R".into(),
            "B".into(),
            Box::new(PlaylistSource::new(vec![fixture.clone(), fixture])),
        )
        .await
        .expect("broadcast playlist");

    let sink = PacketCounterSink::new();
    let mut listener = SessionManager::new(Arc::new(bus.clone()), TransportConfig::local_only())
        .with_sink(Arc::new(sink.clone()));
    listener
        .join_as_listener("R".into(), "L".into())
        .await
        .expect("join");

    wait_for_status(&listener, CONNECTION_TIMEOUT_MS, |s| s.receiving_audio)
        .await
        .expect("listener receiving");

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while sink.packets() < 5 && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(sink.packets() >= 5, "playlist audio did not arrive");
    assert!(sink.bytes() > 0);

    listener.stop().await;
    broadcaster.stop().await;
}
