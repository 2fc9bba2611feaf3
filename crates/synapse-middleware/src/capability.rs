//! The capability module contract.
//!
//! A capability module represents one externally-facing capability (chat,
//! navigation, an arm, a clock).  It owns a [`ModuleCore`], turns activity in
//! its environment into events and impressions, requests decision cycles,
//! and optionally offers one action the decision-maker may call.
//!
//! # Contract
//!
//! * `core` – the embedded [`ModuleCore`] holding name, state and trigger
//!   handle.
//! * `describe` – the action this module offers, computed fresh on every
//!   call so that runtime-discovered details (known landmarks, available
//!   skills) are always current.  `None` for state-only modules.
//! * `invoke` – perform the action with arguments matching the schema
//!   returned by `describe`.  The returned string is a short human-readable
//!   result.

use async_trait::async_trait;
use synapse_types::{CapabilityDescriptor, SynapseError};

use crate::state::ModuleCore;

#[async_trait]
pub trait CapabilityModule: Send + Sync {
    fn core(&self) -> &ModuleCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn describe(&self) -> Option<CapabilityDescriptor>;

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, SynapseError>;
}

/// Deserialize action arguments, mapping failures to
/// [`SynapseError::InvalidArguments`].
pub fn parse_arguments<T: serde::de::DeserializeOwned>(
    capability: &str,
    arguments: serde_json::Value,
) -> Result<T, SynapseError> {
    serde_json::from_value(arguments).map_err(|e| SynapseError::InvalidArguments {
        capability: capability.to_string(),
        details: e.to_string(),
    })
}
