//! Point-in-time views over all linked modules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SynapseError;
use crate::event::TimestampedEvent;

/// The session of one module as captured in a [`Context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSession {
    pub module: String,
    pub events: Vec<TimestampedEvent>,
}

/// A copied snapshot of every linked module's state.
///
/// `sessions` keeps module link order, which is the first key of the merge
/// tie-break.  Modules with no history or an empty history are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub sessions: Vec<ModuleSession>,
    pub impressions: BTreeMap<String, serde_json::Value>,
}

impl Context {
    /// The captured session of `module`, if it had one.
    pub fn session(&self, module: &str) -> Option<&[TimestampedEvent]> {
        self.sessions
            .iter()
            .find(|s| s.module == module)
            .map(|s| s.events.as_slice())
    }

    /// Total number of events across all captured sessions.
    pub fn event_count(&self) -> usize {
        self.sessions.iter().map(|s| s.events.len()).sum()
    }
}

/// A [`Context`] whose sessions have been merged into one chronological
/// timeline.  Lives for one decision cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderedContext {
    pub timeline: Vec<TimestampedEvent>,
    pub impressions: BTreeMap<String, serde_json::Value>,
}

impl OrderedContext {
    /// Render the context as the JSON document handed to the decision-maker.
    pub fn to_json_pretty(&self) -> Result<String, SynapseError> {
        serde_json::to_string_pretty(self).map_err(|e| SynapseError::Serialization(e.to_string()))
    }
}
