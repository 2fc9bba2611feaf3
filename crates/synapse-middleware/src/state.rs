//! Per-module state and the core every capability module embeds.
//!
//! [`StateStore`] is the one record a module owns.  Its mutex only serializes
//! the module's own producers against the copy-read taken at assembly time;
//! no lock is ever held across modules.
//!
//! [`ModuleCore`] bundles a store with the module's name and its
//! [`TriggerSink`], and exposes the four operations every module performs:
//! record an event, publish an impression, request a decision and (via the
//! [`CapabilityModule`][crate::CapabilityModule] trait) describe itself.

use parking_lot::Mutex;
use synapse_types::{CapabilityState, SynapseError, TimestampedEvent, Trigger};
use tracing::{debug, trace};

use crate::trigger::TriggerSink;

// ─────────────────────────────────────────────────────────────────────────────
// StateStore
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StateStore {
    state: Mutex<CapabilityState>,
}

impl StateStore {
    pub fn new(initial: CapabilityState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    /// Append to the history.  Returns `false` when the module keeps none.
    pub fn append(&self, event: TimestampedEvent) -> bool {
        match self.state.lock().session.as_mut() {
            Some(session) => {
                session.push(event);
                true
            }
            None => false,
        }
    }

    /// Last write wins.
    pub fn set_impression(&self, impression: serde_json::Value) {
        self.state.lock().impression = Some(impression);
    }

    /// A copy of the current state, detached from later writes.
    pub fn snapshot(&self) -> CapabilityState {
        self.state.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().event_count()
    }

    /// Replace the first `consumed` events with `compressed`, keeping any
    /// events appended after those were captured.
    ///
    /// Returns the session length afterwards.  A module without history is
    /// left untouched.
    pub fn compact(&self, consumed: usize, compressed: Vec<TimestampedEvent>) -> usize {
        let mut state = self.state.lock();
        let Some(session) = state.session.as_mut() else {
            return 0;
        };
        let consumed = consumed.min(session.len());
        session.splice(..consumed, compressed);
        session.len()
    }

    /// Overwrite the whole state, e.g. from a persisted snapshot.
    pub fn restore(&self, state: CapabilityState) {
        *self.state.lock() = state;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModuleCore
// ─────────────────────────────────────────────────────────────────────────────

/// Name, state and trigger handle of one capability module.
#[derive(Debug)]
pub struct ModuleCore {
    name: String,
    store: StateStore,
    sink: TriggerSink,
}

impl ModuleCore {
    pub fn new(name: impl Into<String>, initial: CapabilityState, sink: TriggerSink) -> Self {
        Self {
            name: name.into(),
            store: StateStore::new(initial),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an event stamped with the current wall-clock time.
    pub fn record_event(&self, label: &str, data: impl Into<String>) {
        if self.store.append(TimestampedEvent::now(label, data)) {
            trace!(module = %self.name, label, "event recorded");
        } else {
            trace!(module = %self.name, label, "module keeps no history; event ignored");
        }
    }

    pub fn set_impression(&self, impression: serde_json::Value) {
        self.store.set_impression(impression);
    }

    /// Ask for a decision cycle.  Returns as soon as the trigger is queued.
    pub fn request_decision(&self) -> Result<(), SynapseError> {
        self.submit(Trigger::from_module(&self.name))
    }

    /// Like [`request_decision`](Self::request_decision), with a payload
    /// describing what changed.
    pub fn request_decision_with(&self, payload: serde_json::Value) -> Result<(), SynapseError> {
        self.submit(Trigger::from_module(&self.name).with_payload(payload))
    }

    pub fn state(&self) -> CapabilityState {
        self.store.snapshot()
    }

    pub fn event_count(&self) -> usize {
        self.store.event_count()
    }

    /// See [`StateStore::compact`].
    pub fn apply_summary(&self, consumed: usize, compressed: Vec<TimestampedEvent>) -> usize {
        let after = self.store.compact(consumed, compressed);
        debug!(module = %self.name, consumed, after, "session compacted");
        after
    }

    pub fn restore(&self, state: CapabilityState) {
        self.store.restore(state);
    }

    fn submit(&self, trigger: Trigger) -> Result<(), SynapseError> {
        self.sink.submit(trigger)?;
        trace!(module = %self.name, "decision requested");
        Ok(())
    }
}
