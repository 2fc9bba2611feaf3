//! In-process simulated drivers for headless runs and tests.
//!
//! [`SimNavigator`] "travels" by sleeping for a configurable time;
//! [`SimArm`] understands a handful of pick/place phrasings and keeps track
//! of what it holds.  Neither ever touches real hardware.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use synapse_capabilities::sim::SimNavigator;
//! use synapse_capabilities::navigator::NavigationDriver;
//!
//! let nav = SimNavigator::new(["kitchen", "store"])
//!     .with_travel_time(Duration::from_millis(5))
//!     .with_obstacle("store", "the aisle is blocked");
//! assert_eq!(nav.landmarks(), vec!["kitchen", "store"]);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use synapse_types::SynapseError;
use tracing::debug;

use crate::arm::{ArmDriver, ArmFeedback};
use crate::navigator::{NavigationDriver, NavigationStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

pub struct SimNavigator {
    landmarks: Mutex<Vec<String>>,
    obstacles: HashMap<String, String>,
    travel_time: Duration,
    location: Mutex<Option<String>>,
}

impl SimNavigator {
    pub fn new<I, S>(landmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            landmarks: Mutex::new(landmarks.into_iter().map(Into::into).collect()),
            obstacles: HashMap::new(),
            travel_time: Duration::from_secs(2),
            location: Mutex::new(None),
        }
    }

    pub fn with_travel_time(mut self, travel_time: Duration) -> Self {
        self.travel_time = travel_time;
        self
    }

    /// Trips to `landmark` end blocked with `reason`.
    pub fn with_obstacle(mut self, landmark: impl Into<String>, reason: impl Into<String>) -> Self {
        self.obstacles.insert(landmark.into(), reason.into());
        self
    }

    /// Learn a new landmark at runtime.
    pub fn discover(&self, landmark: impl Into<String>) {
        let landmark = landmark.into();
        let mut landmarks = self.landmarks.lock();
        if !landmarks.contains(&landmark) {
            landmarks.push(landmark);
        }
    }

    pub fn location(&self) -> Option<String> {
        self.location.lock().clone()
    }
}

#[async_trait]
impl NavigationDriver for SimNavigator {
    fn id(&self) -> &str {
        "sim_navigator"
    }

    fn landmarks(&self) -> Vec<String> {
        self.landmarks.lock().clone()
    }

    async fn travel(&self, landmark: &str) -> Result<NavigationStatus, SynapseError> {
        tokio::time::sleep(self.travel_time).await;
        if let Some(reason) = self.obstacles.get(landmark) {
            debug!(landmark, "sim trip blocked");
            return Ok(NavigationStatus::Blocked {
                destination: landmark.to_string(),
                reason: reason.clone(),
            });
        }
        *self.location.lock() = Some(landmark.to_string());
        Ok(NavigationStatus::Arrived {
            destination: landmark.to_string(),
        })
    }

    async fn halt(&self) -> Result<(), SynapseError> {
        debug!("sim navigator halted");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arm
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SimArm {
    holding: Mutex<Option<String>>,
}

impl SimArm {
    pub fn holding(&self) -> Option<String> {
        self.holding.lock().clone()
    }
}

#[async_trait]
impl ArmDriver for SimArm {
    fn id(&self) -> &str {
        "sim_arm"
    }

    fn skills(&self) -> Vec<String> {
        vec![
            "pick up <object>".to_string(),
            "put down".to_string(),
            "open gripper".to_string(),
            "close gripper".to_string(),
        ]
    }

    async fn execute(&self, instruction: &str) -> Result<ArmFeedback, SynapseError> {
        let lowered = instruction.trim().to_lowercase();
        let mut holding = self.holding.lock();

        let feedback = if let Some(object) = lowered.strip_prefix("pick up ") {
            if let Some(held) = holding.as_ref() {
                ArmFeedback {
                    gripper_closed: true,
                    holding: Some(held.clone()),
                    note: format!("cannot pick up {object} while holding {held}"),
                    done: true,
                }
            } else {
                *holding = Some(object.to_string());
                ArmFeedback {
                    gripper_closed: true,
                    holding: holding.clone(),
                    note: format!("picked up {object}"),
                    done: true,
                }
            }
        } else if lowered.starts_with("put down")
            || lowered.starts_with("place")
            || lowered == "open gripper"
        {
            let released = holding.take();
            ArmFeedback {
                gripper_closed: false,
                holding: None,
                note: match released {
                    Some(object) => format!("put down {object}"),
                    None => "gripper opened, nothing was held".to_string(),
                },
                done: true,
            }
        } else if lowered == "close gripper" {
            ArmFeedback {
                gripper_closed: true,
                holding: holding.clone(),
                note: "gripper closed".to_string(),
                done: true,
            }
        } else {
            return Err(SynapseError::CapabilityFailed {
                capability: "arm".to_string(),
                details: format!("the simulated arm does not know how to `{instruction}`"),
            });
        };
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_navigator_arrives_or_blocks() {
        let nav = SimNavigator::new(["kitchen", "store"])
            .with_travel_time(Duration::ZERO)
            .with_obstacle("store", "aisle blocked");

        let status = nav.travel("kitchen").await.unwrap();
        assert_eq!(
            status,
            NavigationStatus::Arrived {
                destination: "kitchen".into()
            }
        );
        assert_eq!(nav.location().as_deref(), Some("kitchen"));

        let status = nav.travel("store").await.unwrap();
        assert!(matches!(
            status,
            NavigationStatus::Blocked { reason, .. } if reason == "aisle blocked"
        ));
        assert_eq!(nav.location().as_deref(), Some("kitchen"));
    }

    #[test]
    fn discover_does_not_duplicate() {
        let nav = SimNavigator::new(["kitchen"]);
        nav.discover("garden");
        nav.discover("kitchen");
        assert_eq!(nav.landmarks(), vec!["kitchen", "garden"]);
    }

    #[tokio::test]
    async fn sim_arm_tracks_held_object() {
        let arm = SimArm::default();

        let picked = arm.execute("Pick up the cup").await.unwrap();
        assert_eq!(picked.holding.as_deref(), Some("the cup"));
        assert!(picked.gripper_closed);

        let refused = arm.execute("pick up the plate").await.unwrap();
        assert!(refused.note.starts_with("cannot pick up"));

        let placed = arm.execute("put down").await.unwrap();
        assert_eq!(placed.note, "put down the cup");
        assert!(arm.holding().is_none());

        assert!(arm.execute("juggle").await.is_err());
    }
}
