//! Timestamped history entries and the per-module state record.
//!
//! Every history entry is keyed by a string of the form
//! `"[YYYY-MM-DD HH:MM:SS] label"`.  The bracketed prefix is the only source
//! of ordering information, so it is parsed strictly: a key whose prefix does
//! not match [`TIMESTAMP_FORMAT`] yields [`SynapseError::MalformedEvent`].
//!
//! On the wire an event is a single-entry JSON object, which is also the
//! shape handed to the decision-maker and the summarizer:
//!
//! ```rust
//! use synapse_types::TimestampedEvent;
//!
//! let event = TimestampedEvent::from_raw("[2026-02-07 14:19:42] status", "picked up breakfast");
//! let json = serde_json::to_string(&event).unwrap();
//! assert_eq!(json, r#"{"[2026-02-07 14:19:42] status":"picked up breakfast"}"#);
//! assert_eq!(event.label(), "status");
//! ```

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::SynapseError;

/// Literal `chrono` format of the timestamp prefix, brackets included.
pub const TIMESTAMP_FORMAT: &str = "[%Y-%m-%d %H:%M:%S]";

// ─────────────────────────────────────────────────────────────────────────────
// TimestampedEvent
// ─────────────────────────────────────────────────────────────────────────────

/// One append-only history entry: `{ "[timestamp] label": data }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedEvent {
    key: String,
    data: String,
}

impl TimestampedEvent {
    /// Build an event stamped with `timestamp`.
    pub fn at(timestamp: NaiveDateTime, label: &str, data: impl Into<String>) -> Self {
        Self {
            key: format!("{} {}", timestamp.format(TIMESTAMP_FORMAT), label),
            data: data.into(),
        }
    }

    /// Build an event stamped with the current local wall-clock time.
    pub fn now(label: &str, data: impl Into<String>) -> Self {
        Self::at(Local::now().naive_local(), label, data)
    }

    /// Wrap an already-formatted key without validating it.
    ///
    /// Used for externally produced entries (summarizer output, restored
    /// snapshots).  Validation happens when the key is parsed.
    pub fn from_raw(key: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }

    /// The full `"[timestamp] label"` key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The event payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The part of the key after the timestamp prefix.
    ///
    /// Returns the whole key when no prefix terminator is present.
    pub fn label(&self) -> &str {
        match self.key.find(']') {
            Some(end) => self.key[end + 1..].trim_start(),
            None => &self.key,
        }
    }

    /// Parse the timestamp prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SynapseError::MalformedEvent`] when the prefix is missing or
    /// does not match [`TIMESTAMP_FORMAT`].
    pub fn timestamp(&self) -> Result<NaiveDateTime, SynapseError> {
        parse_timestamp_prefix(&self.key)
    }
}

/// Byte layout of a well-formed prefix; `#` marks an ASCII digit.
const PREFIX_SHAPE: &[u8; 21] = b"[####-##-## ##:##:##]";

/// Parse the `[YYYY-MM-DD HH:MM:SS]` prefix of `key`.
///
/// The prefix is a fixed-width literal: zero-padded fields, one space
/// between date and time, and no padding inside the brackets.
pub fn parse_timestamp_prefix(key: &str) -> Result<NaiveDateTime, SynapseError> {
    let malformed = |reason: String| SynapseError::MalformedEvent {
        key: key.to_string(),
        reason,
    };
    let prefix = key
        .get(..PREFIX_SHAPE.len())
        .filter(|p| {
            p.bytes().zip(PREFIX_SHAPE).all(|(byte, &expected)| match expected {
                b'#' => byte.is_ascii_digit(),
                _ => byte == expected,
            })
        })
        .ok_or_else(|| malformed("prefix is not `[YYYY-MM-DD HH:MM:SS]`".to_string()))?;
    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).map_err(|e| malformed(e.to_string()))
}

impl Serialize for TimestampedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.data)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for TimestampedEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut iter = entries.into_iter();
        match (iter.next(), iter.next()) {
            (Some((key, data)), None) => Ok(Self { key, data }),
            _ => Err(de::Error::custom(
                "an event must be an object with exactly one `[timestamp] label` entry",
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CapabilityState
// ─────────────────────────────────────────────────────────────────────────────

/// The state record owned by one capability module.
///
/// `session == None` means the module keeps no history; `impression == None`
/// means it has no current snapshot.  Both are independent construction-time
/// choices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityState {
    pub session: Option<Vec<TimestampedEvent>>,
    pub impression: Option<serde_json::Value>,
}

impl CapabilityState {
    /// A state that records history, starting empty.
    pub fn with_history() -> Self {
        Self {
            session: Some(Vec::new()),
            impression: None,
        }
    }

    /// A state that never records history.
    pub fn without_history() -> Self {
        Self::default()
    }

    /// Seed the impression with a module-specific default.
    pub fn with_impression(mut self, impression: serde_json::Value) -> Self {
        self.impression = Some(impression);
        self
    }

    /// `true` when the module participates in history.
    pub fn keeps_history(&self) -> bool {
        self.session.is_some()
    }

    /// Number of events currently held (0 when history is disabled).
    pub fn event_count(&self) -> usize {
        self.session.as_ref().map_or(0, Vec::len)
    }
}
