//! `synapse-capabilities` – Concrete capability modules
//!
//! Each module wraps one external capability behind the
//! [`CapabilityModule`][synapse_middleware::CapabilityModule] contract.
//! Hardware is reached through driver traits so the same modules run against
//! real devices or the simulated drivers in [`sim`].
//!
//! # Modules
//!
//! - [`chat`] – [`ChatModule`][chat::ChatModule]: user conversation; the
//!   `chat` action.
//! - [`navigator`] – [`NavigationModule`][navigator::NavigationModule] over a
//!   [`NavigationDriver`][navigator::NavigationDriver]; the `navigate` action
//!   with a live landmark list.
//! - [`arm`] – [`ArmModule`][arm::ArmModule] over an
//!   [`ArmDriver`][arm::ArmDriver]; the `manipulate` action.
//! - [`scheduler`] – [`SchedulerModule`][scheduler::SchedulerModule]:
//!   periodic stimuli and the `remind` action.
//! - [`sim`] – simulated navigation and arm drivers.

use schemars::JsonSchema;
use schemars::schema_for;

pub mod arm;
pub mod chat;
pub mod navigator;
pub mod scheduler;
pub mod sim;

pub use arm::{ArmDriver, ArmFeedback, ArmModule};
pub use chat::ChatModule;
pub use navigator::{NavigationDriver, NavigationModule, NavigationStatus};
pub use scheduler::{SchedulerModule, Stimulus};
pub use sim::{SimArm, SimNavigator};

/// JSON Schema of an action's argument struct.
pub(crate) fn parameters_schema<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_default()
}
