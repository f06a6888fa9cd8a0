use std::sync::Arc;

use airwave_core::SignalKind;
use airwave_session::media::{CaptureConstraints, DeniedCapture, MicrophoneSource, PlaylistSource};
use airwave_session::signaling::MemoryBus;
use airwave_session::{MediaError, Role, SessionError};

use crate::integration::init_tracing;
use crate::utils::{RecordingBus, TrackedSource, session, silent_microphone};

#[tokio::test]
async fn test_denied_microphone_leaves_session_idle() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut manager = session(Arc::new(bus.clone()));

    let denied = Box::new(MicrophoneSource::new(
        Box::new(DeniedCapture),
        CaptureConstraints::default(),
    ));
    let err = manager
        .start_broadcast("R".into(), "B".into(), denied)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::MediaAccess(MediaError::PermissionDenied { .. })
    ));

    assert_eq!(manager.role(), Role::Idle);
    assert!(manager.status().is_idle());
    assert_eq!(bus.subscriber_count(), 0);

    manager
        .start_broadcast("R".into(), "B".into(), silent_microphone())
        .await
        .expect("retry with a working device");
    manager.stop().await;
}

#[tokio::test]
async fn test_empty_playlist_is_a_media_error() {
    init_tracing();

    let mut manager = session(Arc::new(MemoryBus::new()));
    let err = manager
        .start_broadcast("R".into(), "B".into(), Box::new(PlaylistSource::new(vec![])))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::MediaAccess(MediaError::EmptyPlaylist)
    ));
    assert_eq!(manager.role(), Role::Idle);
}

#[tokio::test]
async fn test_unreachable_bus_releases_media() {
    init_tracing();

    let bus = MemoryBus::new();
    bus.set_offline(true);
    let mut manager = session(Arc::new(bus.clone()));

    let (source, counters) = TrackedSource::wrap(silent_microphone());
    let err = manager
        .start_broadcast("R".into(), "B".into(), source)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(counters.acquired(), 1);
    assert_eq!(counters.released(), 1);
    assert_eq!(manager.role(), Role::Idle);
}

#[tokio::test]
async fn test_failed_join_announcement_keeps_listening() {
    init_tracing();

    let bus = RecordingBus::new();
    bus.reject(SignalKind::JoinRequest);
    let mut manager = session(Arc::new(bus.clone()));

    let err = manager
        .join_as_listener("R".into(), "L".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(bus.attempts(), vec![(SignalKind::JoinRequest, false)]);

    // Not rolled back: still subscribed and listening until stopped.
    assert_eq!(manager.role(), Role::Listener);
    assert_eq!(bus.memory().subscriber_count(), 1);

    manager.stop().await;
    assert_eq!(manager.role(), Role::Idle);
    assert_eq!(bus.memory().subscriber_count(), 0);
}
