//! `synapse-memory` – Long-lived agent state.
//!
//! Lets an agent's accumulated context outlive the process, using a local
//! SQLite substrate.
//!
//! # Modules
//!
//! - [`snapshot`] – [`SnapshotStore`][snapshot::SnapshotStore]: stores
//!   [`AgentSnapshot`][synapse_types::AgentSnapshot]s keyed by agent identity
//!   and module name, and implements the
//!   [`StatePersistence`][synapse_middleware::StatePersistence] hook.

pub mod snapshot;

pub use snapshot::{SnapshotError, SnapshotStore};
