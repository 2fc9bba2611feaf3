//! `synapse-kernel` – Admission & Compression Policy
//!
//! The two policy primitives every decision cycle passes through.  Neither
//! performs I/O; both are cheap to clone and share.
//!
//! # Modules
//!
//! - [`decision_lock`] – [`SingleFlightLock`][decision_lock::SingleFlightLock]:
//!   lets at most one decision cycle run, parks a bounded number of followers
//!   and rejects the rest immediately.
//! - [`summary_gate`] – [`SummaryGate`][summary_gate::SummaryGate]:
//!   decides when accumulated history is due for compression and vets the
//!   compressed result before it replaces any module session.

pub mod decision_lock;
pub mod summary_gate;

pub use decision_lock::{DEFAULT_MAX_WAITERS, DecisionPermit, LockState, SingleFlightLock};
pub use summary_gate::{DEFAULT_RETENTION_THRESHOLD, SummaryGate, SummaryPolicy};
