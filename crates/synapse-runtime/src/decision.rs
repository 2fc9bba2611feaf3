//! The external decision-maker seam.
//!
//! [`DecisionMaker`] is what the decision cycle calls once it holds the lock:
//! it receives the ordered context plus the freshly described actions and
//! answers with at most one [`ActionCall`].  [`LlmDecisionMaker`] is the
//! production implementation backed by an [`LlmDriver`].
//!
//! The model is asked for a document of the shape
//!
//! ```json
//! { "thought": "short reasoning", "action": { "name": "chat", "arguments": { "message": "hi" } } }
//! ```
//!
//! where `action` may be `null`.  `thought` is logged and published only.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use synapse_types::{ActionCall, CapabilityDescriptor, OrderedContext, SynapseError, Trigger};
use tracing::debug;

use crate::llm_driver::{ChatMessage, LlmDriver, strip_code_fence};

/// Everything the decision-maker sees for one cycle.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub trigger: Trigger,
    pub context: OrderedContext,
    pub actions: Vec<CapabilityDescriptor>,
}

/// Zero or one action, plus an optional free-text trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub action: Option<ActionCall>,
    pub thought: Option<String>,
}

impl Decision {
    /// A decision to do nothing.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn act(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            action: Some(ActionCall {
                name: name.into(),
                arguments,
            }),
            thought: None,
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }
}

#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, SynapseError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM-backed implementation
// ─────────────────────────────────────────────────────────────────────────────

const DECISION_SCHEMA_NAME: &str = "decision";

/// Closing rules of the decision prompt so the model does not spin on a
/// single action.
pub const ACTION_GUIDELINES: &str = "\
## Action Guidelines
- Choose at most one action per turn, or none when nothing needs doing.
- Do not repeat the same action with the same arguments more than 3 times in a row.
- If an action failed, try a different approach rather than retrying immediately.
- Only call actions listed as available, with arguments matching their schema.";

pub struct LlmDecisionMaker {
    driver: LlmDriver,
    instructions: String,
}

impl LlmDecisionMaker {
    /// `instructions` describe the agent's identity and goals.
    pub fn new(driver: LlmDriver, instructions: impl Into<String>) -> Self {
        Self {
            driver,
            instructions: instructions.into(),
        }
    }
}

#[async_trait]
impl DecisionMaker for LlmDecisionMaker {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, SynapseError> {
        let messages = build_messages(&self.instructions, request)?;
        let schema = decision_schema(&request.actions);
        let reply = self
            .driver
            .complete(&messages, DECISION_SCHEMA_NAME, schema)
            .await
            .map_err(|e| SynapseError::DecisionFailed(e.to_string()))?;
        debug!(model = self.driver.model(), "decision reply received");
        parse_decision(&reply)
    }
}

/// JSON Schema constraining the reply to one of the offered actions.
pub fn decision_schema(actions: &[CapabilityDescriptor]) -> Value {
    let mut choices = vec![json!({ "type": "null" })];
    choices.extend(actions.iter().map(|a| {
        json!({
            "type": "object",
            "description": a.description,
            "properties": {
                "name": { "const": a.name },
                "arguments": a.parameters,
            },
            "required": ["name", "arguments"],
        })
    }));
    json!({
        "type": "object",
        "properties": {
            "thought": { "type": "string" },
            "action": { "anyOf": choices },
        },
        "required": ["thought", "action"],
    })
}

/// System prompt plus one user message carrying the trigger, the ordered
/// context and the action list.
pub fn build_messages(
    instructions: &str,
    request: &DecisionRequest,
) -> Result<Vec<ChatMessage>, SynapseError> {
    let system = format!(
        "{instructions}\n\n\
         You receive your recent history as a chronological timeline of \
         `[YYYY-MM-DD HH:MM:SS] label` events, plus the current state of each \
         capability. Decide whether to take one of the available actions now. \
         Reply with `action: null` when nothing needs doing.\n\n\
         {ACTION_GUIDELINES}"
    );
    let actions = serde_json::to_string_pretty(&request.actions)
        .map_err(|e| SynapseError::Serialization(e.to_string()))?;
    let trigger = match &request.trigger.payload {
        Some(payload) => format!("{} ({payload})", request.trigger.source),
        None => request.trigger.source.clone(),
    };
    let user = format!(
        "Woken by: {trigger}\n\nContext:\n{}\n\nAvailable actions:\n{actions}",
        request.context.to_json_pretty()?
    );
    Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    action: Option<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parse the model's reply.  A blank action name counts as no action.
pub fn parse_decision(reply: &str) -> Result<Decision, SynapseError> {
    let raw: RawDecision = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| SynapseError::DecisionFailed(format!("unparseable decision: {e}")))?;
    let action = raw
        .action
        .filter(|a| !a.name.trim().is_empty())
        .map(|a| ActionCall {
            name: a.name,
            arguments: a.arguments,
        });
    let thought = raw.thought.filter(|t| !t.trim().is_empty());
    Ok(Decision { action, thought })
}
