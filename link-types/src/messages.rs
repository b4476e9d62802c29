//! Protocol messages for wristlink.
//!
//! Messages are ephemeral: built at the send call site, encoded once, handed
//! to exactly one transport channel. Direction is a property of the variant
//! and is enforced by the sending endpoint, not by the type itself.

use std::fmt;

/// All possible protocol messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Currently playing track (primary → companion).
    NowPlaying(NowPlayingUpdate),
    /// Session context label (primary → companion).
    State(StateUpdate),
    /// Opaque payload for the companion's complication surface.
    Complication(ComplicationUpdate),
    /// One biometric snapshot (companion → primary).
    Biometric(BiometricUpdate),
    /// Self-reported mood and energy (companion → primary).
    Mood(MoodInput),
    /// Transport control from the wrist (companion → primary).
    Playback(PlaybackCommand),
    /// Digital crown turn (companion → primary).
    Crown(CrownAdjustment),
}

impl Message {
    /// The variant's kind.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::NowPlaying(_) => MessageKind::NowPlaying,
            Message::State(_) => MessageKind::State,
            Message::Complication(_) => MessageKind::Complication,
            Message::Biometric(_) => MessageKind::Biometric,
            Message::Mood(_) => MessageKind::Mood,
            Message::Playback(_) => MessageKind::Playback,
            Message::Crown(_) => MessageKind::Crown,
        }
    }

    /// Direction this message is allowed to travel.
    pub fn direction(&self) -> Direction {
        self.kind().direction()
    }
}

impl From<NowPlayingUpdate> for Message {
    fn from(value: NowPlayingUpdate) -> Self {
        Message::NowPlaying(value)
    }
}

impl From<StateUpdate> for Message {
    fn from(value: StateUpdate) -> Self {
        Message::State(value)
    }
}

impl From<ComplicationUpdate> for Message {
    fn from(value: ComplicationUpdate) -> Self {
        Message::Complication(value)
    }
}

impl From<BiometricUpdate> for Message {
    fn from(value: BiometricUpdate) -> Self {
        Message::Biometric(value)
    }
}

impl From<MoodInput> for Message {
    fn from(value: MoodInput) -> Self {
        Message::Mood(value)
    }
}

impl From<PlaybackCommand> for Message {
    fn from(value: PlaybackCommand) -> Self {
        Message::Playback(value)
    }
}

impl From<CrownAdjustment> for Message {
    fn from(value: CrownAdjustment) -> Self {
        Message::Crown(value)
    }
}

/// Fieldless mirror of [`Message`] used for routing and discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`Message::NowPlaying`]
    NowPlaying,
    /// [`Message::State`]
    State,
    /// [`Message::Complication`]
    Complication,
    /// [`Message::Biometric`]
    Biometric,
    /// [`Message::Mood`]
    Mood,
    /// [`Message::Playback`]
    Playback,
    /// [`Message::Crown`]
    Crown,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [MessageKind; 7] = [
        MessageKind::NowPlaying,
        MessageKind::State,
        MessageKind::Complication,
        MessageKind::Biometric,
        MessageKind::Mood,
        MessageKind::Playback,
        MessageKind::Crown,
    ];

    /// Wire discriminator stored under the `type` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::NowPlaying => "nowPlaying",
            MessageKind::State => "stateUpdate",
            MessageKind::Complication => "complicationUpdate",
            MessageKind::Biometric => "biometricUpdate",
            MessageKind::Mood => "moodInput",
            MessageKind::Playback => "playbackCommand",
            MessageKind::Crown => "crownAdjustment",
        }
    }

    /// Parse a wire discriminator.
    pub fn from_discriminator(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Direction messages of this kind travel.
    pub fn direction(&self) -> Direction {
        match self {
            MessageKind::NowPlaying | MessageKind::State | MessageKind::Complication => {
                Direction::ToCompanion
            }
            MessageKind::Biometric
            | MessageKind::Mood
            | MessageKind::Playback
            | MessageKind::Crown => Direction::ToPrimary,
        }
    }

    /// Latency-sensitive kinds where only the latest value matters.
    pub fn is_latest_value(&self) -> bool {
        !matches!(self, MessageKind::Biometric | MessageKind::Complication)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Travel direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Primary device → wrist companion.
    ToCompanion,
    /// Wrist companion → primary device.
    ToPrimary,
}

/// Which side of the pair an endpoint runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The phone-side endpoint.
    Primary,
    /// The wrist-worn endpoint.
    Companion,
}

impl Role {
    /// Direction of messages this role sends.
    pub fn outbound(&self) -> Direction {
        match self {
            Role::Primary => Direction::ToCompanion,
            Role::Companion => Direction::ToPrimary,
        }
    }

    /// Whether this role may send the given message.
    pub fn may_send(&self, message: &Message) -> bool {
        message.direction() == self.outbound()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Companion => f.write_str("companion"),
        }
    }
}

/// Currently playing track.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingUpdate {
    /// Track title.
    pub title: String,
    /// Track artist.
    pub artist: String,
    /// Encoded artwork image. Only attached when the caller computed it;
    /// the default flow leaves it out to keep payloads small.
    pub artwork: Option<Vec<u8>>,
    /// Whether playback is running.
    pub is_playing: bool,
    /// Playback position as a fraction in `0.0..=1.0`.
    pub progress: f64,
    /// Track length in seconds.
    pub duration_seconds: f64,
    /// Why this track was picked, if known.
    pub explanation: Option<String>,
}

/// Session context shown on the companion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateUpdate {
    /// Human-readable label for the current context, if any.
    pub current_context_label: Option<String>,
}

/// Complication surface payload. Opaque to the engine.
#[derive(Clone, PartialEq, Default)]
pub struct ComplicationUpdate {
    /// Rendering payload.
    pub payload: Vec<u8>,
}

impl fmt::Debug for ComplicationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplicationUpdate")
            .field("payload", &format!("[{} bytes]", self.payload.len()))
            .finish()
    }
}

/// One point-in-time combination of the latest known sensor values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BiometricUpdate {
    /// Heart rate in beats per minute, if a reading is available.
    pub heart_rate_bpm: Option<f64>,
    /// Heart rate variability (SDNN) in milliseconds, if available.
    pub hrv_ms: Option<f64>,
    /// Whether the wearer is currently stationary.
    pub is_stationary: bool,
    /// Whether a workout session is running.
    pub is_in_workout: bool,
    /// Workout activity name, if in a workout.
    pub workout_type: Option<String>,
    /// Capture time in milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
}

/// Self-reported mood and energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoodInput {
    /// Mood level on the companion's picker scale.
    pub mood_level: u8,
    /// Energy level on the companion's picker scale.
    pub energy_level: u8,
}

/// Transport control issued from the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCommand {
    /// What to do.
    pub kind: CommandKind,
}

/// Playback control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Skip to the next track.
    Skip,
    /// Go back to the previous track.
    Previous,
}

impl CommandKind {
    /// Every command, in declaration order.
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Play,
        CommandKind::Pause,
        CommandKind::Skip,
        CommandKind::Previous,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Play => "play",
            CommandKind::Pause => "pause",
            CommandKind::Skip => "skip",
            CommandKind::Previous => "previous",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// Digital crown rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct CrownAdjustment {
    /// What the crown is adjusting (e.g. `"energy"`, `"volume"`).
    pub adjustment_type: String,
    /// Signed rotation delta.
    pub delta: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_are_unique_and_parse_back() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_discriminator(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::from_discriminator("bogus"), None);
    }

    #[test]
    fn direction_follows_variant() {
        let mood = Message::Mood(MoodInput {
            mood_level: 3,
            energy_level: 4,
        });
        let state = Message::State(StateUpdate::default());

        assert_eq!(mood.direction(), Direction::ToPrimary);
        assert_eq!(state.direction(), Direction::ToCompanion);
    }

    #[test]
    fn primary_may_not_send_playback_commands() {
        let command = Message::Playback(PlaybackCommand {
            kind: CommandKind::Skip,
        });

        assert!(!Role::Primary.may_send(&command));
        assert!(Role::Companion.may_send(&command));
    }

    #[test]
    fn companion_may_not_send_now_playing() {
        let now_playing = Message::NowPlaying(NowPlayingUpdate {
            title: "t".into(),
            artist: "a".into(),
            artwork: None,
            is_playing: true,
            progress: 0.0,
            duration_seconds: 1.0,
            explanation: None,
        });

        assert!(Role::Primary.may_send(&now_playing));
        assert!(!Role::Companion.may_send(&now_playing));
    }

    #[test]
    fn latest_value_kinds() {
        assert!(MessageKind::NowPlaying.is_latest_value());
        assert!(MessageKind::Playback.is_latest_value());
        assert!(!MessageKind::Biometric.is_latest_value());
        assert!(!MessageKind::Complication.is_latest_value());
    }

    #[test]
    fn command_kind_parse() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CommandKind::parse("rewind"), None);
    }

    #[test]
    fn complication_debug_hides_payload() {
        let update = ComplicationUpdate {
            payload: vec![0xAB; 12],
        };
        let debug = format!("{:?}", update);
        assert!(debug.contains("12 bytes"));
        assert!(!debug.contains("171"));
    }
}
