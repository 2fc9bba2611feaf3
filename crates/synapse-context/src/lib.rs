//! `synapse-context` – What the decision-maker sees
//!
//! # Modules
//!
//! - [`assembler`] – [`ContextAssembler`]: point-in-time copy of every
//!   linked module's state.
//! - [`merger`] – [`order_context`]: stable chronological merge of the
//!   captured sessions into one timeline.

pub mod assembler;
pub mod merger;

pub use assembler::ContextAssembler;
pub use merger::{merge_timeline, order_context};
