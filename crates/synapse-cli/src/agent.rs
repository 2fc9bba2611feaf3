//! Agent wiring – builds the capability modules, the decision cycle and the
//! dispatcher from a [`Config`], and owns their lifetime.

use std::sync::Arc;

use synapse_capabilities::{
    ArmModule, ChatModule, NavigationModule, SchedulerModule, SimArm, SimNavigator,
};
use synapse_kernel::{SingleFlightLock, SummaryGate};
use synapse_memory::SnapshotStore;
use synapse_middleware::{ActivityBus, CapabilityRegistry, StatePersistence, TriggerSink};
use synapse_runtime::{
    DecisionCycle, DispatcherStatus, LlmDecisionMaker, LlmDriver, LlmSummarizer, TriggerDispatcher,
};
use synapse_types::{OrderedContext, SynapseError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;

pub struct Agent {
    name: String,
    chat: Arc<ChatModule>,
    cycle: Arc<DecisionCycle>,
    persistence: Option<Box<dyn StatePersistence>>,
    status: watch::Receiver<DispatcherStatus>,
    stop: Option<oneshot::Sender<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

fn driver(cfg: &Config, model: &str) -> LlmDriver {
    let driver = LlmDriver::new(&cfg.llm_base_url, model);
    if cfg.api_key.is_empty() {
        driver
    } else {
        driver.with_api_key(cfg.api_key.expose())
    }
}

impl Agent {
    /// Wire everything and start the dispatcher.  Must be called inside a
    /// Tokio runtime.  Returns the agent and the receiver of chat replies.
    pub fn start(cfg: &Config) -> Result<(Self, mpsc::UnboundedReceiver<String>), SynapseError> {
        let (sink, queue) = TriggerSink::channel();

        let (chat, replies) = ChatModule::new(sink.clone());
        let chat = Arc::new(chat);
        let navigator = SimNavigator::new(cfg.landmarks.iter().cloned());
        let scheduler = Arc::new(SchedulerModule::new(sink.clone()));
        for stimulus in &cfg.stimuli {
            scheduler.start(stimulus)?;
        }

        let mut registry = CapabilityRegistry::new();
        registry.register(chat.clone())?;
        registry.register(Arc::new(NavigationModule::new(Arc::new(navigator), sink.clone())))?;
        registry.register(Arc::new(ArmModule::new(Arc::new(SimArm::default()), sink)))?;
        registry.register(scheduler)?;

        let persistence: Option<Box<dyn StatePersistence>> = match &cfg.state_db {
            Some(path) => Some(Box::new(SnapshotStore::open(path).map_err(SynapseError::from)?)),
            None => None,
        };
        if let Some(store) = &persistence {
            match store.load(&cfg.agent_name)? {
                Some(snapshot) => {
                    let restored = registry.import_state(&snapshot);
                    info!(
                        agent = %cfg.agent_name,
                        restored,
                        saved_at = %snapshot.saved_at,
                        "agent state restored"
                    );
                }
                None => info!(agent = %cfg.agent_name, "no saved state; starting fresh"),
            }
        }

        let decider =
            LlmDecisionMaker::new(driver(cfg, &cfg.decision_model), cfg.instructions.clone());
        let summarizer = LlmSummarizer::new(driver(cfg, &cfg.summary_model));
        let cycle = DecisionCycle::new(registry, Arc::new(decider))?
            .with_lock(SingleFlightLock::new(cfg.max_waiters))
            .with_config(cfg.cycle_config())
            .with_summarizer(Arc::new(summarizer), SummaryGate::new(cfg.summary_policy()));
        let cycle = Arc::new(cycle);

        let dispatcher = TriggerDispatcher::new(queue, Arc::clone(&cycle));
        let status = dispatcher.status();
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(dispatcher.run_until(async {
            stopped.await.ok();
        }));

        Ok((
            Self {
                name: cfg.agent_name.clone(),
                chat,
                cycle,
                persistence,
                status,
                stop: Some(stop),
                dispatcher: Some(handle),
            },
            replies,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand a line typed by the user to the chat module.
    pub fn say(&self, text: &str) -> Result<(), SynapseError> {
        self.chat.receive(text)
    }

    pub fn status(&self) -> DispatcherStatus {
        self.status.borrow().clone()
    }

    pub fn cycle(&self) -> &DecisionCycle {
        &self.cycle
    }

    pub fn bus(&self) -> &ActivityBus {
        self.cycle.bus()
    }

    pub fn context(&self) -> Result<OrderedContext, SynapseError> {
        self.cycle.ordered_context()
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    /// Save every module's state.  Returns `false` when persistence is off.
    pub fn save(&self) -> Result<bool, SynapseError> {
        let Some(store) = &self.persistence else {
            return Ok(false);
        };
        let snapshot = self.cycle.registry().export_state(&self.name);
        store.save(&snapshot)?;
        info!(agent = %self.name, modules = snapshot.modules.len(), "agent state saved");
        Ok(true)
    }

    /// Stop the dispatcher, then save state.
    pub async fn shutdown(mut self) -> Result<bool, SynapseError> {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        if let Some(handle) = self.dispatcher.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "dispatcher task ended abnormally");
        }
        self.save()
    }
}
