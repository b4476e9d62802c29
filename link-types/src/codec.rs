//! Discriminated-union codec between [`Message`] and [`WireMap`].
//!
//! Layout: the `type` key holds [`MessageKind::as_str`], every other key is a
//! camelCase field name. Optional fields are omitted when absent rather than
//! written as a null, since the wire has no null.

use crate::{
    BiometricUpdate, CodecError, CommandKind, ComplicationUpdate, CrownAdjustment, Message,
    MessageKind, MoodInput, NowPlayingUpdate, PlaybackCommand, StateUpdate, WireMap, WireValue,
    TYPE_KEY,
};

// Field keys
const TITLE: &str = "title";
const ARTIST: &str = "artist";
const ARTWORK: &str = "artwork";
const IS_PLAYING: &str = "isPlaying";
const PROGRESS: &str = "progress";
const DURATION: &str = "duration";
const EXPLANATION: &str = "explanation";
const CONTEXT_LABEL: &str = "currentContextLabel";
const PAYLOAD: &str = "payload";
const HEART_RATE: &str = "heartRate";
const HRV: &str = "hrv";
const IS_STATIONARY: &str = "isStationary";
const IS_IN_WORKOUT: &str = "isInWorkout";
const WORKOUT_TYPE: &str = "workoutType";
const CAPTURED_AT: &str = "capturedAt";
const MOOD_LEVEL: &str = "moodLevel";
const ENERGY_LEVEL: &str = "energyLevel";
const COMMAND: &str = "command";
const ADJUSTMENT_TYPE: &str = "adjustmentType";
const DELTA: &str = "delta";

/// Encode a message into its wire map.
///
/// Fails only for messages that are not well formed: non-finite numbers,
/// `progress` outside `0.0..=1.0`, a negative duration, or a capture time
/// past `i64::MAX` milliseconds.
pub fn encode(message: &Message) -> Result<WireMap, CodecError> {
    let kind = message.kind();
    check_well_formed(message).map_err(|(field, reason)| CodecError::Encoding {
        kind,
        field,
        reason,
    })?;

    let mut map = WireMap::new().with(TYPE_KEY, kind.as_str());
    match message {
        Message::NowPlaying(m) => {
            map.insert(TITLE, m.title.as_str());
            map.insert(ARTIST, m.artist.as_str());
            if let Some(artwork) = &m.artwork {
                map.insert(ARTWORK, artwork.clone());
            }
            map.insert(IS_PLAYING, m.is_playing);
            map.insert(PROGRESS, m.progress);
            map.insert(DURATION, m.duration_seconds);
            if let Some(explanation) = &m.explanation {
                map.insert(EXPLANATION, explanation.as_str());
            }
        }
        Message::State(m) => {
            if let Some(label) = &m.current_context_label {
                map.insert(CONTEXT_LABEL, label.as_str());
            }
        }
        Message::Complication(m) => {
            map.insert(PAYLOAD, m.payload.clone());
        }
        Message::Biometric(m) => {
            if let Some(bpm) = m.heart_rate_bpm {
                map.insert(HEART_RATE, bpm);
            }
            if let Some(hrv) = m.hrv_ms {
                map.insert(HRV, hrv);
            }
            map.insert(IS_STATIONARY, m.is_stationary);
            map.insert(IS_IN_WORKOUT, m.is_in_workout);
            if let Some(workout) = &m.workout_type {
                map.insert(WORKOUT_TYPE, workout.as_str());
            }
            // Range checked above.
            map.insert(CAPTURED_AT, m.captured_at_ms as i64);
        }
        Message::Mood(m) => {
            map.insert(MOOD_LEVEL, i64::from(m.mood_level));
            map.insert(ENERGY_LEVEL, i64::from(m.energy_level));
        }
        Message::Playback(m) => {
            map.insert(COMMAND, m.kind.as_str());
        }
        Message::Crown(m) => {
            map.insert(ADJUSTMENT_TYPE, m.adjustment_type.as_str());
            map.insert(DELTA, m.delta);
        }
    }
    Ok(map)
}

/// Decode a wire map into a message.
///
/// Unknown keys are ignored so newer peers can add fields.
pub fn decode(map: &WireMap) -> Result<Message, CodecError> {
    let discriminator = match map.get(TYPE_KEY) {
        Some(WireValue::String(s)) => s.as_str(),
        Some(other) => {
            return Err(CodecError::UnknownVariant(format!(
                "<{} discriminator>",
                other.type_name()
            )))
        }
        None => return Err(CodecError::UnknownVariant("<missing>".to_string())),
    };
    let kind = MessageKind::from_discriminator(discriminator)
        .ok_or_else(|| CodecError::UnknownVariant(discriminator.to_string()))?;
    let fields = Fields { map, kind };

    let message = match kind {
        MessageKind::NowPlaying => Message::NowPlaying(NowPlayingUpdate {
            title: fields.string(TITLE)?,
            artist: fields.string(ARTIST)?,
            artwork: fields.opt_bytes(ARTWORK)?,
            is_playing: fields.bool(IS_PLAYING)?,
            progress: fields.float(PROGRESS)?,
            duration_seconds: fields.float(DURATION)?,
            explanation: fields.opt_string(EXPLANATION)?,
        }),
        MessageKind::State => Message::State(StateUpdate {
            current_context_label: fields.opt_string(CONTEXT_LABEL)?,
        }),
        MessageKind::Complication => Message::Complication(ComplicationUpdate {
            payload: fields.bytes(PAYLOAD)?,
        }),
        MessageKind::Biometric => Message::Biometric(BiometricUpdate {
            heart_rate_bpm: fields.opt_float(HEART_RATE)?,
            hrv_ms: fields.opt_float(HRV)?,
            is_stationary: fields.bool(IS_STATIONARY)?,
            is_in_workout: fields.bool(IS_IN_WORKOUT)?,
            workout_type: fields.opt_string(WORKOUT_TYPE)?,
            captured_at_ms: fields.unsigned(CAPTURED_AT)?,
        }),
        MessageKind::Mood => Message::Mood(MoodInput {
            mood_level: fields.level(MOOD_LEVEL)?,
            energy_level: fields.level(ENERGY_LEVEL)?,
        }),
        MessageKind::Playback => {
            let raw = fields.string(COMMAND)?;
            let command = CommandKind::parse(&raw)
                .ok_or_else(|| fields.malformed(COMMAND, format!("has unknown value {:?}", raw)))?;
            Message::Playback(PlaybackCommand { kind: command })
        }
        MessageKind::Crown => Message::Crown(CrownAdjustment {
            adjustment_type: fields.string(ADJUSTMENT_TYPE)?,
            delta: fields.float(DELTA)?,
        }),
    };

    check_well_formed(&message).map_err(|(field, reason)| fields.malformed(field, reason))?;
    Ok(message)
}

/// Shared encode/decode invariants. Returns the offending field and reason.
fn check_well_formed(message: &Message) -> Result<(), (&'static str, &'static str)> {
    fn finite(field: &'static str, value: f64) -> Result<(), (&'static str, &'static str)> {
        if value.is_finite() {
            Ok(())
        } else {
            Err((field, "must be finite"))
        }
    }

    match message {
        Message::NowPlaying(m) => {
            finite(PROGRESS, m.progress)?;
            if !(0.0..=1.0).contains(&m.progress) {
                return Err((PROGRESS, "must be within 0..=1"));
            }
            finite(DURATION, m.duration_seconds)?;
            if m.duration_seconds < 0.0 {
                return Err((DURATION, "must not be negative"));
            }
        }
        Message::Biometric(m) => {
            if let Some(bpm) = m.heart_rate_bpm {
                finite(HEART_RATE, bpm)?;
            }
            if let Some(hrv) = m.hrv_ms {
                finite(HRV, hrv)?;
            }
            if i64::try_from(m.captured_at_ms).is_err() {
                return Err((CAPTURED_AT, "exceeds the wire integer range"));
            }
        }
        Message::Crown(m) => finite(DELTA, m.delta)?,
        Message::State(_) | Message::Complication(_) | Message::Mood(_) | Message::Playback(_) => {}
    }
    Ok(())
}

/// Typed field access for one variant's map.
struct Fields<'a> {
    map: &'a WireMap,
    kind: MessageKind,
}

impl Fields<'_> {
    fn malformed(&self, field: &'static str, reason: impl Into<String>) -> CodecError {
        CodecError::MalformedPayload {
            kind: self.kind,
            field,
            reason: reason.into(),
        }
    }

    /// Look up an optional field, converting with `extract` and reporting
    /// `expected` when the stored value has the wrong type.
    fn optional<T>(
        &self,
        key: &'static str,
        expected: &str,
        extract: impl Fn(&WireValue) -> Option<T>,
    ) -> Result<Option<T>, CodecError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| {
                self.malformed(
                    key,
                    format!("expected {}, found {}", expected, value.type_name()),
                )
            }),
        }
    }

    fn required<T>(
        &self,
        key: &'static str,
        expected: &str,
        extract: impl Fn(&WireValue) -> Option<T>,
    ) -> Result<T, CodecError> {
        self.optional(key, expected, extract)?
            .ok_or_else(|| self.malformed(key, "is missing"))
    }

    fn string(&self, key: &'static str) -> Result<String, CodecError> {
        self.required(key, "string", as_string)
    }

    fn opt_string(&self, key: &'static str) -> Result<Option<String>, CodecError> {
        self.optional(key, "string", as_string)
    }

    fn float(&self, key: &'static str) -> Result<f64, CodecError> {
        self.required(key, "number", as_float)
    }

    fn opt_float(&self, key: &'static str) -> Result<Option<f64>, CodecError> {
        self.optional(key, "number", as_float)
    }

    fn bool(&self, key: &'static str) -> Result<bool, CodecError> {
        self.required(key, "bool", |v| match v {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    fn integer(&self, key: &'static str) -> Result<i64, CodecError> {
        self.required(key, "integer", |v| match v {
            WireValue::Integer(i) => Some(*i),
            _ => None,
        })
    }

    fn unsigned(&self, key: &'static str) -> Result<u64, CodecError> {
        let value = self.integer(key)?;
        u64::try_from(value).map_err(|_| self.malformed(key, "must not be negative"))
    }

    fn level(&self, key: &'static str) -> Result<u8, CodecError> {
        let value = self.integer(key)?;
        u8::try_from(value).map_err(|_| self.malformed(key, format!("{} is out of range", value)))
    }

    fn bytes(&self, key: &'static str) -> Result<Vec<u8>, CodecError> {
        self.required(key, "bytes", as_bytes)
    }

    fn opt_bytes(&self, key: &'static str) -> Result<Option<Vec<u8>>, CodecError> {
        self.optional(key, "bytes", as_bytes)
    }
}

fn as_string(value: &WireValue) -> Option<String> {
    match value {
        WireValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

// Some transports collapse integral floats to integers, so accept both.
fn as_float(value: &WireValue) -> Option<f64> {
    match value {
        WireValue::Float(f) => Some(*f),
        WireValue::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn as_bytes(value: &WireValue) -> Option<Vec<u8>> {
    match value {
        WireValue::Bytes(b) => Some(b.clone()),
        _ => None,
    }
}
