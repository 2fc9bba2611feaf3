//! `synapse-runtime` – Decision Cycle Engine
//!
//! Where triggers become decisions.  The runtime ties the kernel's lock and
//! summary gate to the context crate and the capability registry, and talks
//! to the external reasoning model.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`DecisionCycle`][orchestrator::DecisionCycle]:
//!   maybe-summarize, then assemble, merge, decide and act under the
//!   single-flight lock, with a hard time budget.
//! - [`dispatcher`] – [`TriggerDispatcher`][dispatcher::TriggerDispatcher]:
//!   drains the trigger queue and spawns one cycle per trigger, publishing
//!   idle/busy status on a `watch` channel.
//! - [`decision`] – the [`DecisionMaker`][decision::DecisionMaker] seam and
//!   its LLM-backed implementation, which constrains the reply to the offered
//!   actions through a JSON Schema.
//! - [`summarizer`] – the [`Summarizer`][summarizer::Summarizer] seam and its
//!   LLM-backed implementation (one batched call for every module).
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver]: async
//!   OpenAI-compatible chat-completions client with structured output.
//! - [`repeat_guard`] – [`RepeatGuard`][repeat_guard::RepeatGuard]: withholds
//!   an action chosen too many times in a row.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod decision;
pub mod dispatcher;
pub mod llm_driver;
pub mod orchestrator;
pub mod repeat_guard;
pub mod summarizer;
pub mod telemetry;

pub use decision::{ACTION_GUIDELINES, Decision, DecisionMaker, DecisionRequest, LlmDecisionMaker};
pub use dispatcher::{DispatchState, DispatcherStatus, TriggerDispatcher};
pub use llm_driver::{ChatMessage, LlmDriver, LlmError, Role};
pub use orchestrator::{CycleConfig, CycleOutcome, DecisionCycle};
pub use repeat_guard::RepeatGuard;
pub use summarizer::{LlmSummarizer, Summarizer};
pub use telemetry::{TracerProviderGuard, init_tracing};
