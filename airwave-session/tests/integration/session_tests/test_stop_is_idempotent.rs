use std::sync::Arc;

use airwave_session::signaling::MemoryBus;
use airwave_session::{Role, SessionStatus};

use crate::integration::init_tracing;
use crate::utils::{TrackedSource, session, silent_microphone, start_listener};

#[tokio::test]
async fn test_stop_while_idle_is_a_no_op() {
    init_tracing();

    let mut manager = session(Arc::new(MemoryBus::new()));
    assert_eq!(manager.stop().await, 0);
    assert_eq!(manager.stop().await, 0);
    assert_eq!(manager.status(), SessionStatus::default());
}

#[tokio::test]
async fn test_stop_releases_media_once() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut manager = session(Arc::new(bus.clone()));
    let (source, counters) = TrackedSource::wrap(silent_microphone());

    manager
        .start_broadcast("R".into(), "B".into(), source)
        .await
        .expect("broadcast");
    let status = manager.status();
    assert_eq!(status.role, Role::Broadcaster);
    assert_eq!(status.room_id, Some("R".into()));
    assert_eq!(status.local_id, Some("B".into()));

    manager.stop().await;
    manager.stop().await;

    assert_eq!(counters.released(), 1);
    assert_eq!(bus.subscriber_count(), 0);
    assert!(manager.status().is_idle());
}

#[tokio::test]
async fn test_stop_listener_unsubscribes() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut manager = start_listener(&bus, "R", "L").await.expect("listen");
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(bus.row_count(), 1);

    assert_eq!(manager.stop().await, 0);
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(manager.role(), Role::Idle);
}
