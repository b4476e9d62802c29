//! End-to-end sessions between a primary and a companion endpoint over the
//! in-memory loopback link.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use wristlink_client::{
    DeliveryOutcome, Endpoint, EngineConfig, LoopbackTransport, ManualSensor, SensorSource,
    SensorValue,
};
use wristlink_core::{Activation, Channel, QueueLane};
use wristlink_types::{
    CommandKind, ComplicationUpdate, Message, NowPlayingUpdate, PlaybackCommand, Role,
    StateUpdate,
};

struct Session {
    primary: Endpoint<LoopbackTransport>,
    companion: Endpoint<LoopbackTransport>,
    link: LoopbackTransport,
    companion_link: LoopbackTransport,
}

async fn session() -> Session {
    let (primary_link, companion_link) = LoopbackTransport::pair();
    let link = primary_link.clone();
    let primary = Endpoint::new(Role::Primary, primary_link, EngineConfig::default());
    let companion = Endpoint::new(
        Role::Companion,
        companion_link.clone(),
        EngineConfig::default(),
    );
    Session {
        primary,
        companion,
        link,
        companion_link,
    }
}

async fn activate_both(s: &Session) {
    s.primary.activate().await;
    s.companion.activate().await;
    settle().await;
}

async fn settle() {
    sleep(Duration::from_millis(20)).await;
}

async fn next(inbound: &mut broadcast::Receiver<Message>) -> Message {
    timeout(Duration::from_secs(1), inbound.recv())
        .await
        .expect("timed out waiting for inbound message")
        .expect("inbound stream closed")
}

fn track(title: &str, progress: f64) -> Message {
    Message::NowPlaying(NowPlayingUpdate {
        title: title.into(),
        artist: "Nils Frahm".into(),
        artwork: None,
        is_playing: true,
        progress,
        duration_seconds: 312.0,
        explanation: Some("Low tempo for focus".into()),
    })
}

#[tokio::test]
async fn both_sides_become_reachable() {
    let s = session().await;
    activate_both(&s).await;

    let primary = s.primary.connection_state();
    let companion = s.companion.connection_state();
    assert_eq!(primary.activation, Activation::Activated);
    assert!(primary.reachable);
    assert!(primary.paired);
    assert!(companion.reachable);
}

#[tokio::test]
async fn playback_state_and_commands_cross_immediately() {
    let s = session().await;
    let mut to_companion = s.companion.inbound();
    let mut to_primary = s.primary.inbound();
    activate_both(&s).await;

    let outcome = s.primary.deliver(&track("Says", 0.1)).await;
    assert!(matches!(outcome, DeliveryOutcome::Sent(Channel::Immediate)));
    assert_eq!(next(&mut to_companion).await, track("Says", 0.1));

    let skip = Message::Playback(PlaybackCommand {
        kind: CommandKind::Skip,
    });
    s.companion.send(&skip);
    assert_eq!(next(&mut to_primary).await, skip);
}

#[tokio::test]
async fn outage_delivers_latest_context_and_every_sample() {
    let s = session().await;
    let mut to_companion = s.companion.inbound();
    let mut to_primary = s.primary.inbound();
    activate_both(&s).await;

    let heart_rate = Arc::new(ManualSensor::heart_rate());
    assert!(
        s.companion
            .start_monitoring(vec![heart_rate.clone() as Arc<dyn SensorSource>])
            .await
    );

    s.link.set_link_up(false);
    settle().await;
    assert!(!s.primary.connection_state().reachable);
    assert!(!s.companion.connection_state().reachable);

    for (i, title) in ["One", "Two", "Three"].into_iter().enumerate() {
        let outcome = s.primary.deliver(&track(title, i as f64 / 10.0)).await;
        assert!(matches!(
            outcome,
            DeliveryOutcome::Sent(Channel::PersistentContext)
        ));
    }

    for bpm in [70.0, 72.0, 75.0] {
        heart_rate.set(SensorValue::HeartRate(Some(bpm)));
        settle().await;
    }
    let stats = s.companion.stop_monitoring().await.unwrap();
    assert_eq!(stats.samples_submitted, 3);
    assert_eq!(s.companion_link.queued_guaranteed(), 3);

    s.link.set_link_up(true);

    // Only the latest playback state survives the outage.
    assert_eq!(next(&mut to_companion).await, track("Three", 0.2));
    settle().await;
    assert!(to_companion.try_recv().is_err());

    // Every sample arrives, in capture order.
    let mut received = Vec::new();
    for _ in 0..3 {
        match next(&mut to_primary).await {
            Message::Biometric(sample) => received.push(sample.heart_rate_bpm),
            other => panic!("unexpected message {:?}", other),
        }
    }
    assert_eq!(received, vec![Some(70.0), Some(72.0), Some(75.0)]);
    assert!(s.primary.connection_state().reachable);
}

#[tokio::test]
async fn dropped_session_reactivates_on_its_own() {
    let s = session().await;
    let mut to_companion = s.companion.inbound();
    activate_both(&s).await;

    s.companion_link.drop_session();
    settle().await;

    assert!(s.companion_link.is_active());
    let state = s.companion.connection_state();
    assert_eq!(state.activation, Activation::Activated);
    assert!(state.reachable);

    let label = Message::State(StateUpdate {
        current_context_label: Some("Wind down".into()),
    });
    s.primary.send(&label);
    assert_eq!(next(&mut to_companion).await, label);
}

#[tokio::test]
async fn late_companion_sees_context_written_before_it_started() {
    let (primary_link, companion_link) = LoopbackTransport::pair();
    let primary = Endpoint::new(Role::Primary, primary_link, EngineConfig::default());
    primary.activate().await;

    // Companion not active yet: unreachable, so the state goes to context.
    let outcome = primary.deliver(&track("Opening", 0.0)).await;
    assert!(matches!(
        outcome,
        DeliveryOutcome::Sent(Channel::PersistentContext)
    ));

    let companion = Endpoint::new(Role::Companion, companion_link, EngineConfig::default());
    let mut inbound = companion.inbound();
    companion.activate().await;

    assert_eq!(next(&mut inbound).await, track("Opening", 0.0));
}

#[tokio::test]
async fn complications_jump_the_standard_queue() {
    let s = session().await;
    let mut to_companion = s.companion.inbound();
    activate_both(&s).await;
    s.link.set_complication_enabled(true);

    s.link.set_link_up(false);
    settle().await;

    let playing = |title: &str| Message::State(StateUpdate {
        current_context_label: Some(title.into()),
    });
    let complication = Message::Complication(ComplicationUpdate {
        payload: b"ring:0.4".to_vec(),
    });

    s.primary.send(&playing("Focus"));
    let outcome = s.primary.deliver(&complication).await;
    assert!(matches!(
        outcome,
        DeliveryOutcome::Sent(Channel::GuaranteedQueue(QueueLane::Complication))
    ));

    s.link.set_link_up(true);

    // Context first, then the queue.
    assert_eq!(next(&mut to_companion).await, playing("Focus"));
    assert_eq!(next(&mut to_companion).await, complication);
}

#[tokio::test]
async fn deactivated_companion_stops_receiving() {
    let s = session().await;
    activate_both(&s).await;

    s.companion.deactivate().await;
    settle().await;

    assert_eq!(
        s.companion.connection_state().activation,
        Activation::Inactive
    );
    assert!(!s.primary.connection_state().reachable);
    assert!(!s.companion_link.is_active());
}
