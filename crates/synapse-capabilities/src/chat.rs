//! Chat capability: the conversation with the user.
//!
//! Inbound text becomes a `user` event and asks for a decision.  The `chat`
//! action hands the message to whoever holds the outbound receiver (a
//! terminal, a socket writer, a test) and records it as an `assistant` event
//! once it was handed over.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use synapse_middleware::{CapabilityModule, ModuleCore, TriggerSink, parse_arguments};
use synapse_types::{CapabilityDescriptor, CapabilityState, SynapseError};
use tokio::sync::mpsc;
use tracing::info;

use crate::parameters_schema;

pub const CHAT_MODULE: &str = "chat";

/// Arguments of the `chat` action.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChatArgs {
    /// The message to say to the user.
    pub message: String,
}

pub struct ChatModule {
    core: ModuleCore,
    outbound: mpsc::UnboundedSender<String>,
}

impl ChatModule {
    /// Returns the module and the receiver of every message it sends.
    pub fn new(sink: TriggerSink) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, replies) = mpsc::unbounded_channel();
        let module = Self {
            core: ModuleCore::new(CHAT_MODULE, CapabilityState::with_history(), sink),
            outbound,
        };
        (module, replies)
    }

    /// Record a user message and ask for a decision.
    pub fn receive(&self, text: &str) -> Result<(), SynapseError> {
        self.core.record_event("user", text);
        self.core.request_decision()
    }
}

#[async_trait]
impl CapabilityModule for ChatModule {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn describe(&self) -> Option<CapabilityDescriptor> {
        Some(CapabilityDescriptor {
            name: "chat".to_string(),
            description: "Say something to the user. Use it to answer questions, confirm \
                          what you are about to do, or report what happened."
                .to_string(),
            parameters: parameters_schema::<ChatArgs>(),
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, SynapseError> {
        let args: ChatArgs = parse_arguments(CHAT_MODULE, arguments)?;
        info!(message = %args.message, "chat reply");
        self.outbound
            .send(args.message.clone())
            .map_err(|_| SynapseError::CapabilityFailed {
                capability: CHAT_MODULE.to_string(),
                details: "nobody is listening for replies".to_string(),
            })?;
        self.core.record_event("assistant", args.message);
        Ok("Message delivered.".to_string())
    }
}
