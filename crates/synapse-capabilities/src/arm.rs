//! Arm / gripper capability.
//!
//! The `manipulate` action hands a free-text instruction to the arm driver on
//! a background task.  Feedback (gripper state, held object, a short note) is
//! recorded as an event and becomes the module's impression; a report marked
//! `done` asks for a new decision.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use synapse_middleware::{CapabilityModule, ModuleCore, TriggerSink, parse_arguments};
use synapse_types::{CapabilityDescriptor, CapabilityState, SynapseError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::parameters_schema;

pub const ARM_MODULE: &str = "arm";

/// A manipulator that follows short natural-language instructions.
#[async_trait]
pub trait ArmDriver: Send + Sync {
    fn id(&self) -> &str;

    /// Example instructions the arm is good at.
    fn skills(&self) -> Vec<String>;

    /// Carry out `instruction` and report how it went.
    async fn execute(&self, instruction: &str) -> Result<ArmFeedback, SynapseError>;
}

/// One feedback report from the arm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmFeedback {
    pub gripper_closed: bool,
    /// Object currently held, if any.
    pub holding: Option<String>,
    pub note: String,
    /// The instruction has finished, successfully or not.
    pub done: bool,
}

/// Arguments of the `manipulate` action.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ManipulateArgs {
    /// A short instruction for the arm, e.g. "pick up the cup".
    pub instruction: String,
}

struct Shared {
    core: ModuleCore,
    driver: Arc<dyn ArmDriver>,
}

impl Shared {
    fn report(&self, feedback: ArmFeedback) -> Result<(), SynapseError> {
        self.core.record_event("feedback", feedback.note.clone());
        let impression = serde_json::to_value(&feedback)
            .map_err(|e| SynapseError::Serialization(e.to_string()))?;
        self.core.set_impression(impression);
        if feedback.done {
            self.core.request_decision()?;
        }
        Ok(())
    }
}

pub struct ArmModule {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ArmModule {
    pub fn new(driver: Arc<dyn ArmDriver>, sink: TriggerSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: ModuleCore::new(ARM_MODULE, CapabilityState::with_history(), sink),
                driver,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn report_feedback(&self, feedback: ArmFeedback) -> Result<(), SynapseError> {
        self.shared.report(feedback)
    }

    pub fn is_busy(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ArmModule {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl CapabilityModule for ArmModule {
    fn core(&self) -> &ModuleCore {
        &self.shared.core
    }

    fn describe(&self) -> Option<CapabilityDescriptor> {
        Some(CapabilityDescriptor {
            name: "manipulate".to_string(),
            description: format!(
                "Give the arm one short instruction. It is good at: {}. \
                 Only one instruction runs at a time; completion is reported as feedback.",
                self.shared.driver.skills().join("; ")
            ),
            parameters: parameters_schema::<ManipulateArgs>(),
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, SynapseError> {
        let args: ManipulateArgs = parse_arguments(ARM_MODULE, arguments)?;
        if self.is_busy() {
            return Err(SynapseError::CapabilityFailed {
                capability: ARM_MODULE.to_string(),
                details: "the arm is still executing the previous instruction".to_string(),
            });
        }
        self.shared.core.record_event("instruction", args.instruction.clone());
        info!(driver = self.shared.driver.id(), instruction = %args.instruction, "arm instructed");

        let shared = Arc::clone(&self.shared);
        let instruction = args.instruction.clone();
        let handle = tokio::spawn(async move {
            let feedback = match shared.driver.execute(&instruction).await {
                Ok(feedback) => feedback,
                Err(e) => ArmFeedback {
                    note: format!("failed to {instruction}: {e}"),
                    done: true,
                    ..ArmFeedback::default()
                },
            };
            if let Err(e) = shared.report(feedback) {
                warn!(error = %e, "could not report arm feedback");
            }
        });
        *self.task.lock() = Some(handle);
        Ok(format!("Started: {}.", args.instruction))
    }
}
