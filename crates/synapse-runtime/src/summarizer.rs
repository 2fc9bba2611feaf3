//! The external summarizer seam.
//!
//! A [`Summarizer`] rewrites every captured module session into a shorter
//! one in a single batched call.  The result must keep the
//! `[YYYY-MM-DD HH:MM:SS]` key prefix; the decision cycle validates it with
//! the summary gate before anything is applied.

use async_trait::async_trait;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use synapse_types::{SessionMap, SynapseError, TimestampedEvent};
use tracing::debug;

use crate::llm_driver::{ChatMessage, LlmDriver, strip_code_fence};

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Compress `sessions`.  Modules missing from the result keep their
    /// history untouched.
    async fn summarize(&self, sessions: &SessionMap) -> Result<SessionMap, SynapseError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured output shape
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummarizedEvent {
    /// `[YYYY-MM-DD HH:MM:SS]` followed by an optional label.
    pub timestamp_label: String,
    pub data_or_summary: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummarizedSession {
    pub events: Vec<SummarizedEvent>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ToolSession {
    pub tool_name: String,
    pub session: SummarizedSession,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummarizedSessions {
    pub sessions: Vec<ToolSession>,
}

impl SummarizedSessions {
    pub fn into_session_map(self) -> SessionMap {
        self.sessions
            .into_iter()
            .map(|tool| {
                let events = tool
                    .session
                    .events
                    .into_iter()
                    .map(|e| TimestampedEvent::from_raw(e.timestamp_label, e.data_or_summary))
                    .collect();
                (tool.tool_name, events)
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM-backed implementation
// ─────────────────────────────────────────────────────────────────────────────

const SUMMARY_INSTRUCTIONS: &str = "\
You compress the recorded history of a robot assistant. The input maps each \
capability to its chronological list of `{\"[YYYY-MM-DD HH:MM:SS] label\": data}` events.
- Rewrite each session as a shorter list that still represents what happened precisely.
- Never invent information that is not present in the data.
- A session with fewer than 2 events may be returned unchanged.
- Entries that already read like summaries were compressed before; merge them with newer events.
- Every `timestamp_label` must start with a timestamp of the form [%Y-%m-%d %H:%M:%S], \
  e.g. [2026-02-07 11:41:54]. For a span of time pick one representative moment, never a range.
- Keep the events of each session in chronological order.";

pub struct LlmSummarizer {
    driver: LlmDriver,
}

impl LlmSummarizer {
    pub fn new(driver: LlmDriver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, sessions: &SessionMap) -> Result<SessionMap, SynapseError> {
        let input = serde_json::to_string_pretty(sessions)
            .map_err(|e| SynapseError::Serialization(e.to_string()))?;
        let schema = serde_json::to_value(schema_for!(SummarizedSessions))
            .map_err(|e| SynapseError::Serialization(e.to_string()))?;
        let messages = [
            ChatMessage::system(SUMMARY_INSTRUCTIONS),
            ChatMessage::user(input),
        ];
        let reply = self
            .driver
            .complete(&messages, "summarized_sessions", schema)
            .await
            .map_err(|e| SynapseError::SummarizationFailed(e.to_string()))?;
        let parsed: SummarizedSessions = serde_json::from_str(strip_code_fence(&reply))
            .map_err(|e| SynapseError::SummarizationFailed(format!("unparseable summary: {e}")))?;
        debug!(modules = parsed.sessions.len(), "summary received");
        Ok(parsed.into_session_map())
    }
}
