//! Scheduled stimuli.
//!
//! A clock for the agent: periodic stimuli fire on a fixed cadence, and the
//! `remind` action lets the decision-maker schedule a one-shot note for
//! itself.  Each firing records a `stimulus` event and asks for a decision.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use synapse_middleware::{CapabilityModule, ModuleCore, TriggerSink, parse_arguments};
use synapse_types::{CapabilityDescriptor, CapabilityState, SynapseError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::parameters_schema;

pub const SCHEDULER_MODULE: &str = "scheduler";

/// A periodic stimulus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stimulus {
    pub label: String,
    pub every_secs: u64,
}

/// Arguments of the `remind` action.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemindArgs {
    /// What to be reminded of.
    pub note: String,
    /// Seconds from now.
    pub delay_secs: u64,
}

pub struct SchedulerModule {
    core: Arc<ModuleCore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn fire(core: &ModuleCore, note: &str) {
    core.record_event("stimulus", note);
    if let Err(e) = core.request_decision_with(serde_json::json!({ "stimulus": note })) {
        warn!(error = %e, note, "stimulus could not request a decision");
    }
}

impl SchedulerModule {
    pub fn new(sink: TriggerSink) -> Self {
        Self {
            core: Arc::new(ModuleCore::new(
                SCHEDULER_MODULE,
                CapabilityState::with_history(),
                sink,
            )),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start firing `stimulus` every `every_secs`, first one period from now.
    ///
    /// # Errors
    ///
    /// [`SynapseError::Configuration`] for a zero period.
    pub fn start(&self, stimulus: &Stimulus) -> Result<(), SynapseError> {
        if stimulus.every_secs == 0 {
            return Err(SynapseError::Configuration(format!(
                "stimulus `{}` needs a period of at least one second",
                stimulus.label
            )));
        }
        let period = Duration::from_secs(stimulus.every_secs);
        let core = Arc::clone(&self.core);
        let label = stimulus.label.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                fire(&core, &label);
            }
        });
        debug!(label = %stimulus.label, every_secs = stimulus.every_secs, "stimulus scheduled");
        self.track(handle);
        Ok(())
    }

    /// Fire `note` once after `delay`.
    pub fn remind_in(&self, note: impl Into<String>, delay: Duration) {
        let core = Arc::clone(&self.core);
        let note = note.into();
        self.track(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(&core, &note);
        }));
    }

    /// Number of timers still pending.
    pub fn pending(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }
}

impl Drop for SchedulerModule {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl CapabilityModule for SchedulerModule {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn describe(&self) -> Option<CapabilityDescriptor> {
        Some(CapabilityDescriptor {
            name: "remind".to_string(),
            description: "Schedule a note to come back to later. After the delay the note \
                          appears as a stimulus event and you get to decide again."
                .to_string(),
            parameters: parameters_schema::<RemindArgs>(),
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, SynapseError> {
        let args: RemindArgs = parse_arguments(SCHEDULER_MODULE, arguments)?;
        self.remind_in(args.note, Duration::from_secs(args.delay_secs));
        Ok(format!("Reminder set for {} s from now.", args.delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn periodic_stimulus_fires_each_period() {
        let (sink, mut queue) = TriggerSink::channel();
        let scheduler = SchedulerModule::new(sink);
        scheduler
            .start(&Stimulus {
                label: "check the battery".into(),
                every_secs: 30,
            })
            .unwrap();

        let first = queue.next().await.unwrap();
        assert_eq!(first.source, SCHEDULER_MODULE);
        assert_eq!(first.payload.unwrap()["stimulus"], "check the battery");
        queue.next().await.unwrap();

        let session = scheduler.core().state().session.unwrap();
        assert_eq!(session.len(), 2);
        assert!(session.iter().all(|e| e.data() == "check the battery"));
    }

    #[test]
    fn zero_period_is_rejected() {
        let (sink, _queue) = TriggerSink::channel();
        let scheduler = SchedulerModule::new(sink);
        let err = scheduler
            .start(&Stimulus {
                label: "spin".into(),
                every_secs: 0,
            })
            .unwrap_err();
        assert!(matches!(err, SynapseError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn remind_action_fires_once() {
        let (sink, mut queue) = TriggerSink::channel();
        let scheduler = SchedulerModule::new(sink);

        let reply = scheduler
            .invoke(json!({"note": "ask about dinner", "delay_secs": 600}))
            .await
            .unwrap();
        assert_eq!(reply, "Reminder set for 600 s from now.");
        assert_eq!(scheduler.pending(), 1);

        let trigger = queue.next().await.unwrap();
        assert_eq!(trigger.payload.unwrap()["stimulus"], "ask about dinner");
        tokio::task::yield_now().await;
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.core().event_count(), 1);
    }
}
