//! Flat wire representation shared by every transport channel.
//!
//! A [`WireMap`] is a string-keyed map of primitive values. The reserved
//! [`TYPE_KEY`] entry carries the message discriminator; every other entry is
//! a variant-specific field. Nested values are never produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CodecError;

/// Reserved key holding the message discriminator.
pub const TYPE_KEY: &str = "type";

/// A single primitive wire value.
///
/// Serialized untagged so the byte framing stays a flat map of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    /// UTF-8 string.
    String(String),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Raw byte blob (artwork, complication payloads).
    Bytes(Vec<u8>),
}

impl WireValue {
    /// Short name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::String(_) => "string",
            WireValue::Integer(_) => "integer",
            WireValue::Float(_) => "float",
            WireValue::Bool(_) => "bool",
            WireValue::Bytes(_) => "bytes",
        }
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::String(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Integer(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Float(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(value: Vec<u8>) -> Self {
        WireValue::Bytes(value)
    }
}

/// Flat string-keyed map of primitive values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireMap(BTreeMap<String, WireValue>);

impl WireMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<WireValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.0.get(key)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<WireValue> {
        self.0.remove(key)
    }

    /// Check whether a field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields, discriminator included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the map has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WireValue)> {
        self.0.iter()
    }

    /// The discriminator string, if present and a string.
    pub fn discriminator(&self) -> Option<&str> {
        match self.0.get(TYPE_KEY) {
            Some(WireValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Serialize to MessagePack bytes for byte-oriented transports.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(self).map_err(CodecError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(CodecError::Deserialization)
    }
}

impl FromIterator<(String, WireValue)> for WireMap {
    fn from_iter<I: IntoIterator<Item = (String, WireValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
