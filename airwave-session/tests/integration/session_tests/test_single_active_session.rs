use airwave_session::signaling::MemoryBus;
use airwave_session::{Role, SessionError};

use crate::integration::init_tracing;
use crate::utils::{silent_microphone, start_broadcaster, start_listener};

#[tokio::test]
async fn test_starting_while_broadcasting_is_invalid() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut manager = start_broadcaster(&bus, "R", "B").await.expect("broadcast");
    assert_eq!(manager.role(), Role::Broadcaster);

    let err = manager
        .start_broadcast("R".into(), "B".into(), silent_microphone())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(Role::Broadcaster)));

    let err = manager
        .join_as_listener("R".into(), "B".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(Role::Broadcaster)));

    // The running session is untouched.
    assert_eq!(manager.role(), Role::Broadcaster);
    assert_eq!(bus.subscriber_count(), 1);

    manager.stop().await;
}

#[tokio::test]
async fn test_starting_while_listening_is_invalid() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut manager = start_listener(&bus, "R", "L").await.expect("listen");

    let err = manager
        .start_broadcast("R".into(), "L".into(), silent_microphone())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(Role::Listener)));

    manager.stop().await;
    manager
        .start_broadcast("R".into(), "L".into(), silent_microphone())
        .await
        .expect("idle again after stop");
    assert_eq!(manager.role(), Role::Broadcaster);
    manager.stop().await;
}
