//! Navigation capability: travel between named landmarks.
//!
//! The `navigate` action starts a trip and returns at once; the trip runs on
//! its own task and reports its end through
//! [`NavigationModule::report_status`], which records the outcome and asks
//! for a new decision.  Starting a new trip halts the previous one.
//!
//! The landmark list is read from the driver every time the action is
//! described, so landmarks discovered at runtime show up in the very next
//! cycle as an `enum` on the `destination` parameter.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use synapse_middleware::{CapabilityModule, ModuleCore, TriggerSink, parse_arguments};
use synapse_types::{CapabilityDescriptor, CapabilityState, SynapseError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::parameters_schema;

pub const NAVIGATION_MODULE: &str = "navigation";

// ─────────────────────────────────────────────────────────────────────────────
// Driver contract
// ─────────────────────────────────────────────────────────────────────────────

/// A mobile base that can travel to named landmarks.
#[async_trait]
pub trait NavigationDriver: Send + Sync {
    fn id(&self) -> &str;

    /// Landmarks currently known to the driver.
    fn landmarks(&self) -> Vec<String>;

    /// Travel to `landmark`, resolving when the trip ends with
    /// [`NavigationStatus::Arrived`] or [`NavigationStatus::Blocked`].
    async fn travel(&self, landmark: &str) -> Result<NavigationStatus, SynapseError>;

    /// Stop wherever the base is.
    async fn halt(&self) -> Result<(), SynapseError>;
}

/// Where the base is in its current trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NavigationStatus {
    Idle,
    Moving { destination: String },
    Arrived { destination: String },
    Blocked { destination: String, reason: String },
}

impl NavigationStatus {
    /// Human-readable event text.
    pub fn describe(&self) -> String {
        match self {
            NavigationStatus::Idle => "idle".to_string(),
            NavigationStatus::Moving { destination } => format!("moving to {destination}"),
            NavigationStatus::Arrived { destination } => format!("arrived at {destination}"),
            NavigationStatus::Blocked {
                destination,
                reason,
            } => format!("blocked on the way to {destination}: {reason}"),
        }
    }

    /// Trip endings deserve a decision; progress does not.
    pub fn needs_decision(&self) -> bool {
        matches!(
            self,
            NavigationStatus::Arrived { .. } | NavigationStatus::Blocked { .. }
        )
    }
}

/// Arguments of the `navigate` action.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NavigateArgs {
    /// The landmark to travel to.
    pub destination: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Module
// ─────────────────────────────────────────────────────────────────────────────

struct Shared {
    core: ModuleCore,
    driver: Arc<dyn NavigationDriver>,
}

impl Shared {
    fn report(&self, status: NavigationStatus) -> Result<(), SynapseError> {
        self.core.record_event("status", status.describe());
        let impression = serde_json::to_value(&status)
            .map_err(|e| SynapseError::Serialization(e.to_string()))?;
        self.core.set_impression(impression);
        if status.needs_decision() {
            self.core.request_decision()?;
        }
        Ok(())
    }
}

pub struct NavigationModule {
    shared: Arc<Shared>,
    trip: Mutex<Option<JoinHandle<()>>>,
}

impl NavigationModule {
    pub fn new(driver: Arc<dyn NavigationDriver>, sink: TriggerSink) -> Self {
        let initial = CapabilityState::with_history().with_impression(
            serde_json::to_value(NavigationStatus::Idle).unwrap_or_default(),
        );
        Self {
            shared: Arc::new(Shared {
                core: ModuleCore::new(NAVIGATION_MODULE, initial, sink),
                driver,
            }),
            trip: Mutex::new(None),
        }
    }

    /// Record a status report from the base.  Arrivals and blockages request
    /// a decision.
    pub fn report_status(&self, status: NavigationStatus) -> Result<(), SynapseError> {
        self.shared.report(status)
    }

    /// `true` while a trip task is running.
    pub fn is_travelling(&self) -> bool {
        self.trip.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    async fn start_trip(&self, destination: String) -> Result<(), SynapseError> {
        let previous = self.trip.lock().take();
        if let Some(previous) = previous.filter(|t| !t.is_finished()) {
            previous.abort();
            self.shared.driver.halt().await?;
            debug!(driver = self.shared.driver.id(), "previous trip halted");
        }

        self.shared.report(NavigationStatus::Moving {
            destination: destination.clone(),
        })?;

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let outcome = match shared.driver.travel(&destination).await {
                Ok(status) => status,
                Err(e) => NavigationStatus::Blocked {
                    destination,
                    reason: e.to_string(),
                },
            };
            if let Err(e) = shared.report(outcome) {
                warn!(error = %e, "could not report trip outcome");
            }
        });
        *self.trip.lock() = Some(handle);
        Ok(())
    }
}

impl Drop for NavigationModule {
    fn drop(&mut self) {
        if let Some(trip) = self.trip.lock().take() {
            trip.abort();
        }
    }
}

#[async_trait]
impl CapabilityModule for NavigationModule {
    fn core(&self) -> &ModuleCore {
        &self.shared.core
    }

    fn describe(&self) -> Option<CapabilityDescriptor> {
        let landmarks = self.shared.driver.landmarks();
        let mut parameters = parameters_schema::<NavigateArgs>();
        if let Some(destination) = parameters
            .pointer_mut("/properties/destination")
            .and_then(serde_json::Value::as_object_mut)
        {
            destination.insert("enum".to_string(), serde_json::json!(landmarks));
        }
        Some(CapabilityDescriptor {
            name: "navigate".to_string(),
            description: format!(
                "Plan and drive a path to one of the known landmarks ({}). \
                 Returns immediately; arrival is reported as a new status event.",
                landmarks.join(", ")
            ),
            parameters,
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, SynapseError> {
        let args: NavigateArgs = parse_arguments(NAVIGATION_MODULE, arguments)?;
        if !self
            .shared
            .driver
            .landmarks()
            .iter()
            .any(|l| *l == args.destination)
        {
            return Err(SynapseError::InvalidArguments {
                capability: NAVIGATION_MODULE.to_string(),
                details: format!("unknown landmark `{}`", args.destination),
            });
        }
        info!(destination = %args.destination, "navigation started");
        self.start_trip(args.destination.clone()).await?;
        Ok(format!("Heading to {}.", args.destination))
    }
}
