//! Run a scripted primary/companion session.
//!
//! Both endpoints share one loopback link. Every step moves the heart-rate
//! sensor; playback state, context labels, complications, commands, mood and
//! crown input are sent on fixed cadences. The link goes down for half of
//! every outage period, and the companion's session is dropped once at
//! three quarters of the run to exercise reactivation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use wristlink_client::{
    DeliveryOutcome, Endpoint, EngineConfig, LoopbackTransport, ManualSensor, SensorSource,
    SensorValue,
};
use wristlink_core::Channel;
use wristlink_types::{
    CommandKind, ComplicationUpdate, CrownAdjustment, Message, MoodInput, NowPlayingUpdate,
    PlaybackCommand, Role, StateUpdate,
};

const TRACKS: [(&str, &str); 4] = [
    ("Says", "Nils Frahm"),
    ("Avril 14th", "Aphex Twin"),
    ("Weightless", "Marconi Union"),
    ("An Ending (Ascent)", "Brian Eno"),
];

const CONTEXT_LABELS: [&str; 3] = ["Deep focus", "Wind down", "Commute"];

/// Shape of a scripted session.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    /// Number of steps.
    pub steps: u32,
    /// Duration of one step in milliseconds.
    pub step_ms: u64,
    /// Outage period in steps (0 = no outages).
    pub outage_every: u32,
}

/// Per-channel delivery counts for one side.
#[derive(Debug, Default, Serialize)]
pub struct ChannelTally {
    immediate: u64,
    context: u64,
    guaranteed: u64,
    fell_back: u64,
    dropped: u64,
}

impl ChannelTally {
    fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent(Channel::Immediate) => self.immediate += 1,
            DeliveryOutcome::Sent(Channel::PersistentContext) => self.context += 1,
            DeliveryOutcome::Sent(Channel::GuaranteedQueue(_)) => self.guaranteed += 1,
            DeliveryOutcome::FellBack { .. } => self.fell_back += 1,
            DeliveryOutcome::Dropped(_) => self.dropped += 1,
        }
    }
}

/// Everything the run observed.
#[derive(Debug, Serialize)]
pub struct Summary {
    steps: u32,
    outages: u32,
    session_drops: u32,
    primary_sent: ChannelTally,
    companion_sent: ChannelTally,
    samples_submitted: u64,
    sample_flushes: u64,
    primary_received: BTreeMap<String, u64>,
    companion_received: BTreeMap<String, u64>,
}

/// Run the scripted session.
pub async fn run(config_path: Option<&Path>, script: Script, json: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let summary = simulate(config, script).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn simulate(config: EngineConfig, script: Script) -> Result<Summary> {
    let (primary_link, companion_link) = LoopbackTransport::pair();
    let link = primary_link.clone();
    link.set_complication_enabled(true);

    let primary = Endpoint::new(Role::Primary, primary_link, config.clone());
    let companion = Endpoint::new(Role::Companion, companion_link.clone(), config);

    let (primary_received, stop_primary) = collect(primary.inbound());
    let (companion_received, stop_companion) = collect(companion.inbound());

    let state = primary.activate().await;
    tracing::info!("Primary: {:?}", state.activation);
    let state = companion.activate().await;
    tracing::info!("Companion: {:?}", state.activation);
    if !state.is_activated() {
        anyhow::bail!("Companion failed to activate");
    }

    let heart_rate = Arc::new(ManualSensor::heart_rate());
    let hrv = Arc::new(ManualSensor::hrv());
    let motion = Arc::new(ManualSensor::motion());
    companion
        .start_monitoring(vec![
            heart_rate.clone() as Arc<dyn SensorSource>,
            hrv.clone() as Arc<dyn SensorSource>,
            motion.clone() as Arc<dyn SensorSource>,
        ])
        .await;

    let step = Duration::from_millis(script.step_ms);
    let drop_at = (script.steps >= 4).then(|| script.steps * 3 / 4);
    let mut primary_sent = ChannelTally::default();
    let mut companion_sent = ChannelTally::default();
    let mut link_up = true;
    let mut outages = 0;
    let mut session_drops = 0;

    for i in 0..script.steps {
        let want_up = link_wanted(script.outage_every, i);
        if want_up != link_up {
            if !want_up {
                outages += 1;
                tracing::info!("Step {}: link down", i);
            } else {
                tracing::info!("Step {}: link up", i);
            }
            link.set_link_up(want_up);
            link_up = want_up;
        }

        if Some(i) == drop_at {
            tracing::info!("Step {}: dropping companion session", i);
            companion_link.drop_session();
            session_drops += 1;
        }

        heart_rate.set(SensorValue::HeartRate(Some(60.0 + f64::from(i * 7 % 30))));
        if i % 3 == 0 {
            hrv.set(SensorValue::Hrv(Some(40.0 + f64::from(i % 12))));
        }
        if i % 4 == 0 {
            motion.set(SensorValue::Stationary(i % 8 == 0));
        }

        if i % 5 == 0 {
            primary_sent.record(&primary.deliver(&now_playing(i)).await);
        }
        if i % 6 == 0 {
            let label = CONTEXT_LABELS[(i / 6) as usize % CONTEXT_LABELS.len()];
            let message = Message::State(StateUpdate {
                current_context_label: Some(label.to_string()),
            });
            primary_sent.record(&primary.deliver(&message).await);
        }
        if i % 10 == 0 {
            let message = Message::Complication(ComplicationUpdate {
                payload: format!("hr:{}", 60 + i * 7 % 30).into_bytes(),
            });
            primary_sent.record(&primary.deliver(&message).await);
        }
        if i % 7 == 3 {
            let kind = CommandKind::ALL[(i / 7) as usize % CommandKind::ALL.len()];
            let message = Message::Playback(PlaybackCommand { kind });
            companion_sent.record(&companion.deliver(&message).await);
        }
        if i % 9 == 4 {
            let message = Message::Mood(MoodInput {
                mood_level: (i % 5) as u8 + 1,
                energy_level: (i % 3) as u8 + 1,
            });
            companion_sent.record(&companion.deliver(&message).await);
        }
        if i % 11 == 5 {
            let message = Message::Crown(CrownAdjustment {
                adjustment_type: "energy".to_string(),
                delta: if i % 2 == 0 { 0.5 } else { -0.5 },
            });
            companion_sent.record(&companion.deliver(&message).await);
        }

        tokio::time::sleep(step).await;
    }

    if !link_up {
        tracing::info!("Restoring link for shutdown");
        link.set_link_up(true);
    }
    let settle = step.max(Duration::from_millis(20));
    tokio::time::sleep(settle).await;

    let stats = companion.stop_monitoring().await.unwrap_or_default();
    tokio::time::sleep(settle).await;
    companion.deactivate().await;
    primary.deactivate().await;

    Ok(Summary {
        steps: script.steps,
        outages,
        session_drops,
        primary_sent,
        companion_sent,
        samples_submitted: stats.samples_submitted,
        sample_flushes: stats.flushes,
        primary_received: finish(primary_received, stop_primary).await,
        companion_received: finish(companion_received, stop_companion).await,
    })
}

fn link_wanted(outage_every: u32, step: u32) -> bool {
    if outage_every == 0 {
        return true;
    }
    let half = (outage_every / 2).max(1);
    step % outage_every < half
}

fn now_playing(step: u32) -> Message {
    let (title, artist) = TRACKS[(step / 20) as usize % TRACKS.len()];
    Message::NowPlaying(NowPlayingUpdate {
        title: title.to_string(),
        artist: artist.to_string(),
        artwork: None,
        is_playing: step % 40 < 35,
        progress: f64::from(step % 20) / 20.0,
        duration_seconds: 240.0,
        explanation: None,
    })
}

type Received = JoinHandle<BTreeMap<String, u64>>;

/// Count inbound messages per kind until told to stop.
fn collect(mut inbound: broadcast::Receiver<Message>) -> (Received, oneshot::Sender<()>) {
    let (stop, mut stopped) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut counts = BTreeMap::new();
        loop {
            tokio::select! {
                received = inbound.recv() => match received {
                    Ok(message) => *counts.entry(message.kind().to_string()).or_insert(0) += 1,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Inbound collector skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = &mut stopped => {
                    while let Ok(message) = inbound.try_recv() {
                        *counts.entry(message.kind().to_string()).or_insert(0) += 1;
                    }
                    break;
                }
            }
        }
        counts
    });
    (handle, stop)
}

async fn finish(handle: Received, stop: oneshot::Sender<()>) -> BTreeMap<String, u64> {
    let _ = stop.send(());
    handle.await.unwrap_or_else(|e| {
        tracing::error!("Inbound collector failed: {}", e);
        BTreeMap::new()
    })
}

fn print_summary(summary: &Summary) {
    println!("=== wristlink-sim summary ===");
    println!();
    println!(
        "Steps: {} ({} outages, {} dropped sessions)",
        summary.steps, summary.outages, summary.session_drops
    );
    println!();
    print_tally("Primary sent", &summary.primary_sent);
    print_tally("Companion sent", &summary.companion_sent);
    println!("Samples:");
    println!(
        "  {} submitted in {} flushes",
        summary.samples_submitted, summary.sample_flushes
    );
    println!();
    print_counts("Primary received", &summary.primary_received);
    print_counts("Companion received", &summary.companion_received);
}

fn print_tally(label: &str, tally: &ChannelTally) {
    println!("{}:", label);
    println!("  Immediate:  {}", tally.immediate);
    println!("  Context:    {}", tally.context);
    println!("  Guaranteed: {}", tally.guaranteed);
    println!("  Fell back:  {}", tally.fell_back);
    println!("  Dropped:    {}", tally.dropped);
    println!();
}

fn print_counts(label: &str, counts: &BTreeMap<String, u64>) {
    println!("{}:", label);
    if counts.is_empty() {
        println!("  (nothing)");
    }
    for (kind, count) in counts {
        println!("  {}: {}", kind, count);
    }
    println!();
}
