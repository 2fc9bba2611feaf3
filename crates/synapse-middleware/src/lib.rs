//! `synapse-middleware` – Capability Plumbing
//!
//! Everything that sits between a capability module and the decision cycle,
//! without caring what the module actually does.
//!
//! # Modules
//!
//! - [`capability`] – the [`CapabilityModule`] trait every module implements.
//! - [`state`] – [`StateStore`] and [`ModuleCore`]: per-module state plus the
//!   record/impression/request-decision operations.
//! - [`trigger`] – [`TriggerSink`] / [`TriggerQueue`]: the non-blocking
//!   channel modules use to ask for decision cycles.  Modules receive a sink
//!   at wiring time; there is no global dispatcher.
//! - [`registry`] – [`CapabilityRegistry`]: linked modules in link order,
//!   action routing, summary application and export/import.
//! - [`persistence`] – the [`StatePersistence`] hook contract.
//! - [`bus`] – [`ActivityBus`] for observability.

pub mod bus;
pub mod capability;
pub mod persistence;
pub mod registry;
pub mod state;
pub mod trigger;

pub use bus::{ActivityBus, SourceSubscriber};
pub use capability::{CapabilityModule, parse_arguments};
pub use persistence::StatePersistence;
pub use registry::CapabilityRegistry;
pub use state::{ModuleCore, StateStore};
pub use trigger::{TriggerQueue, TriggerSink};
