//! Chronological Merger.
//!
//! Flattens the per-module sessions of a [`Context`] into one timeline sorted
//! ascending by parsed timestamp.
//!
//! Ties are resolved by a stable sort over the concatenation of sessions in
//! link order, so two events stamped with the same second keep
//! module-then-insertion order.  Every key is parsed before anything is
//! sorted; one bad key fails the whole merge.
//!
//! # Example
//!
//! ```rust
//! use synapse_context::merger::order_context;
//! use synapse_types::{Context, ModuleSession, TimestampedEvent};
//!
//! let context = Context {
//!     sessions: vec![
//!         ModuleSession {
//!             module: "arm".into(),
//!             events: vec![TimestampedEvent::from_raw("[2026-02-07 14:19:42] status", "picked up breakfast")],
//!         },
//!         ModuleSession {
//!             module: "drive".into(),
//!             events: vec![TimestampedEvent::from_raw("[2026-02-07 14:19:40] status", "arrived at store")],
//!         },
//!     ],
//!     impressions: Default::default(),
//! };
//!
//! let ordered = order_context(&context).unwrap();
//! assert_eq!(ordered.timeline[0].data(), "arrived at store");
//! assert_eq!(ordered.timeline[1].data(), "picked up breakfast");
//! ```

use synapse_types::{Context, OrderedContext, SynapseError, TimestampedEvent};
use tracing::trace;

/// Merge every session of `context` into one ordered timeline.  Impressions
/// are carried over untouched.
///
/// # Errors
///
/// [`SynapseError::MalformedEvent`] for the first event whose timestamp
/// prefix does not parse.
pub fn order_context(context: &Context) -> Result<OrderedContext, SynapseError> {
    let timeline = merge_timeline(context.sessions.iter().map(|s| s.events.as_slice()))?;
    Ok(OrderedContext {
        timeline,
        impressions: context.impressions.clone(),
    })
}

/// Merge already-ordered sessions, given in tie-break order.
pub fn merge_timeline<'a>(
    sessions: impl IntoIterator<Item = &'a [TimestampedEvent]>,
) -> Result<Vec<TimestampedEvent>, SynapseError> {
    let mut keyed = Vec::new();
    for session in sessions {
        for event in session {
            keyed.push((event.timestamp()?, event));
        }
    }
    // `sort_by_key` is stable.
    keyed.sort_by_key(|(timestamp, _)| *timestamp);
    trace!(events = keyed.len(), "timeline merged");
    Ok(keyed.into_iter().map(|(_, event)| event.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use synapse_types::ModuleSession;

    fn session(module: &str, keys: &[(&str, &str)]) -> ModuleSession {
        ModuleSession {
            module: module.to_string(),
            events: keys
                .iter()
                .map(|(k, d)| TimestampedEvent::from_raw(*k, *d))
                .collect(),
        }
    }

    fn is_sorted(timeline: &[TimestampedEvent]) -> bool {
        timeline
            .windows(2)
            .all(|w| w[0].timestamp().unwrap() <= w[1].timestamp().unwrap())
    }

    #[test]
    fn interleaves_sessions_by_time() {
        let context = Context {
            sessions: vec![
                session(
                    "chat",
                    &[
                        ("[2026-02-07 14:00:00] user", "get me breakfast"),
                        ("[2026-02-07 14:25:00] assistant", "here you go"),
                    ],
                ),
                session(
                    "drive",
                    &[
                        ("[2026-02-07 14:05:00] status", "driving"),
                        ("[2026-02-07 14:19:40] status", "arrived at store"),
                    ],
                ),
                session("arm", &[("[2026-02-07 14:19:42] status", "picked up breakfast")]),
            ],
            impressions: BTreeMap::new(),
        };

        let ordered = order_context(&context).unwrap();
        assert_eq!(ordered.timeline.len(), context.event_count());
        assert!(is_sorted(&ordered.timeline));
        let data: Vec<_> = ordered.timeline.iter().map(TimestampedEvent::data).collect();
        assert_eq!(
            data,
            vec![
                "get me breakfast",
                "driving",
                "arrived at store",
                "picked up breakfast",
                "here you go"
            ]
        );
    }

    #[test]
    fn equal_timestamps_keep_module_then_insertion_order() {
        let context = Context {
            sessions: vec![
                session(
                    "drive",
                    &[
                        ("[2026-02-07 14:19:40] status", "drive-1"),
                        ("[2026-02-07 14:19:40] status", "drive-2"),
                    ],
                ),
                session("arm", &[("[2026-02-07 14:19:40] status", "arm-1")]),
                session("chat", &[("[2026-02-07 14:19:39] user", "chat-1")]),
            ],
            impressions: BTreeMap::new(),
        };

        let ordered = order_context(&context).unwrap();
        let data: Vec<_> = ordered.timeline.iter().map(TimestampedEvent::data).collect();
        assert_eq!(data, vec!["chat-1", "drive-1", "drive-2", "arm-1"]);
    }

    #[test]
    fn malformed_key_fails_whole_merge() {
        let context = Context {
            sessions: vec![
                session("drive", &[("[2026-02-07 14:19:40] status", "ok")]),
                session("arm", &[("status at noon", "bad")]),
            ],
            impressions: BTreeMap::new(),
        };
        let err = order_context(&context).unwrap_err();
        assert!(matches!(err, SynapseError::MalformedEvent { key, .. } if key == "status at noon"));
    }

    #[test]
    fn impressions_pass_through() {
        let impressions =
            BTreeMap::from([("drive".to_string(), serde_json::json!({"moving": true}))]);
        let context = Context {
            sessions: Vec::new(),
            impressions: impressions.clone(),
        };
        let ordered = order_context(&context).unwrap();
        assert!(ordered.timeline.is_empty());
        assert_eq!(ordered.impressions, impressions);
    }

    #[test]
    fn compressed_sessions_still_merge() {
        // One module's history collapsed into a summary keyed at its first
        // event, next to an untouched module.
        let context = Context {
            sessions: vec![
                session(
                    "drive",
                    &[
                        ("[2026-02-07 14:05:00] summary", "drove to the store"),
                        ("[2026-02-07 14:19:40] status", "arrived at store"),
                    ],
                ),
                session(
                    "chat",
                    &[
                        ("[2026-02-07 11:41:54]", "talked about breakfast"),
                        ("[2026-02-07 14:21:00] user", "thanks"),
                    ],
                ),
            ],
            impressions: BTreeMap::new(),
        };
        let ordered = order_context(&context).unwrap();
        assert_eq!(ordered.timeline.len(), 4);
        assert!(is_sorted(&ordered.timeline));
        assert_eq!(ordered.timeline[0].data(), "talked about breakfast");
    }
}
