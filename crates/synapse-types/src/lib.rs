use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod context;
pub mod event;

pub use context::{Context, ModuleSession, OrderedContext};
pub use event::{CapabilityState, TIMESTAMP_FORMAT, TimestampedEvent, parse_timestamp_prefix};

/// Module sessions keyed by module name, the shape exchanged with the
/// summarizer.
pub type SessionMap = BTreeMap<String, Vec<TimestampedEvent>>;

/// A request that a new decision cycle should run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Name of the module that asked for the cycle.
    pub source: String,
    pub payload: Option<serde_json::Value>,
}

impl Trigger {
    pub fn from_module(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// What a capability offers to the decision-maker, recomputed every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Stable identifier, also the action name the decision-maker calls.
    pub name: String,
    pub description: String,
    /// JSON Schema of the action arguments.
    pub parameters: serde_json::Value,
}

/// A single action chosen by the decision-maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Every module's state for one agent identity, as exported for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent: String,
    pub saved_at: DateTime<Utc>,
    pub modules: BTreeMap<String, CapabilityState>,
}

/// Observability record published on the activity bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "synapse-runtime::dispatcher"
    pub source: String,
    pub kind: ActivityKind,
}

impl Activity {
    pub fn new(source: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            kind,
        }
    }
}

/// Variants of activity reported by the dispatcher and the decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityKind {
    TriggerReceived { module: String },
    TriggerRejected { module: String },
    CycleStarted { cycle_id: Uuid, trigger: String },
    CycleCompleted { cycle_id: Uuid, action: Option<String> },
    CycleFailed { cycle_id: Uuid, reason: String },
    /// Free-text reasoning trace from the decision-maker.
    Thought(String),
    ActionInvoked { capability: String, result: String },
    ActionSuppressed { capability: String },
    SummaryApplied { events_before: usize, events_after: usize },
}

/// Error taxonomy shared by every Synapse crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SynapseError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Malformed Event `{key}`: {reason}")]
    MalformedEvent { key: String, reason: String },

    #[error("Trigger Rejected: {waiting} of {max_waiters} wait slots occupied")]
    RejectedTrigger { waiting: usize, max_waiters: usize },

    #[error("Decision Timeout: no decision within {budget_ms} ms")]
    DecisionTimeout { budget_ms: u64 },

    #[error("Decision Failed: {0}")]
    DecisionFailed(String),

    #[error("Summarization Failed: {0}")]
    SummarizationFailed(String),

    #[error("Unknown Capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid Arguments for {capability}: {details}")]
    InvalidArguments { capability: String, details: String },

    #[error("Capability Fault on {capability}: {details}")]
    CapabilityFailed { capability: String, details: String },

    #[error("Persistence Error: {0}")]
    Persistence(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl SynapseError {
    /// `true` for lock saturation, which is backpressure rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SynapseError::RejectedTrigger { .. })
    }
}
