//! The persistence hook contract.
//!
//! The registry produces and consumes [`AgentSnapshot`]s
//! ([`CapabilityRegistry::export_state`][crate::CapabilityRegistry::export_state] /
//! [`import_state`][crate::CapabilityRegistry::import_state]); a
//! [`StatePersistence`] implementation decides where they live.

use synapse_types::{AgentSnapshot, SynapseError};

pub trait StatePersistence: Send + Sync {
    /// Store `snapshot`, replacing any previous snapshot of the same agent.
    fn save(&self, snapshot: &AgentSnapshot) -> Result<(), SynapseError>;

    /// The latest snapshot saved for `agent`, if any.
    fn load(&self, agent: &str) -> Result<Option<AgentSnapshot>, SynapseError>;
}
