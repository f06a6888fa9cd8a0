use airwave_core::{NewSignal, SignalKind};
use airwave_session::signaling::{MemoryBus, SignalBus};
use serde_json::json;

use crate::integration::init_tracing;
use crate::utils::{settle, start_broadcaster, wait_for_rows};

#[tokio::test]
async fn test_unknown_and_misrouted_kinds_are_ignored() {
    init_tracing();

    let bus = MemoryBus::new();
    let mut broadcaster = start_broadcaster(&bus, "R", "B").await.expect("broadcast");

    bus.publish(NewSignal {
        room_id: "R".into(),
        sender_id: "L".into(),
        receiver_id: Some("B".into()),
        kind: SignalKind::Other("renegotiate".into()),
        payload: json!({ "type": "renegotiate" }),
    })
    .await
    .unwrap();
    // A broadcaster never handles offers, nor answers it did not ask for.
    bus.publish(NewSignal::offer("R".into(), "X".into(), "B".into(), "v=0".into()))
        .await
        .unwrap();
    bus.publish(NewSignal::answer("R".into(), "L".into(), "B".into(), "v=0".into()))
        .await
        .unwrap();
    settle().await;

    assert!(broadcaster.registry().is_empty());
    assert_eq!(bus.row_count(), 3);

    // The loop is still serving.
    bus.publish(NewSignal::join_request("R".into(), "L".into()))
        .await
        .unwrap();
    wait_for_rows(&bus, SignalKind::Offer, "B", "L", 1)
        .await
        .expect("offer after ignored rows");

    broadcaster.stop().await;
}
