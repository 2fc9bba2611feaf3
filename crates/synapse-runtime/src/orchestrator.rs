//! [`DecisionCycle`] – one assemble → decide → act pass.
//!
//! Each call to [`DecisionCycle::run`]:
//!
//! 1. **Summarize** – if the [`SummaryGate`] says the combined history is too
//!    long, compress it through the [`Summarizer`].  This happens *before*
//!    the lock so a slow summary never serializes with decisions.  At most
//!    one summary is in flight; failures are logged and skipped.
//! 2. **Admit** – acquire the [`SingleFlightLock`].  A saturated lock returns
//!    [`SynapseError::RejectedTrigger`] and the trigger is dropped.
//! 3. **Assemble** – copy every module's state and merge it into an
//!    [`OrderedContext`].  A queued cycle does this only once it holds the
//!    lock, so it sees everything the previous cycle produced.
//! 4. **Decide** – hand the context and fresh capability descriptors to the
//!    [`DecisionMaker`].
//! 5. **Act** – dispatch at most one action, unless the [`RepeatGuard`]
//!    withholds it.
//!
//! Steps 4 and 5 share one time budget.  The permit is released when `run`
//! returns, whatever the outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use synapse_context::{ContextAssembler, order_context};
use synapse_kernel::{SingleFlightLock, SummaryGate};
use synapse_middleware::{ActivityBus, CapabilityRegistry};
use synapse_types::{ActivityKind, OrderedContext, SynapseError, Trigger};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::decision::{DecisionMaker, DecisionRequest};
use crate::repeat_guard::{DEFAULT_REPEAT_THRESHOLD, RepeatGuard};
use crate::summarizer::Summarizer;

const SOURCE: &str = "synapse-runtime::cycle";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleConfig {
    /// Budget for deciding and dispatching the chosen action.
    pub decision_timeout: Duration,
    /// Budget for one summarizer call.
    pub summary_timeout: Duration,
    /// Identical consecutive actions before one is withheld; 0 disables.
    pub repeat_threshold: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_secs(60),
            summary_timeout: Duration::from_secs(60),
            repeat_threshold: DEFAULT_REPEAT_THRESHOLD,
        }
    }
}

/// How a cycle that ran to completion ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Acted { action: String, result: String },
    /// The decision-maker chose to do nothing.
    Idle,
    /// The chosen action repeated too often and was withheld.
    Suppressed { action: String },
}

impl CycleOutcome {
    pub fn action(&self) -> Option<&str> {
        match self {
            CycleOutcome::Acted { action, .. } => Some(action),
            CycleOutcome::Idle | CycleOutcome::Suppressed { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DecisionCycle
// ─────────────────────────────────────────────────────────────────────────────

pub struct DecisionCycle {
    registry: CapabilityRegistry,
    assembler: ContextAssembler,
    lock: SingleFlightLock,
    gate: SummaryGate,
    decider: Arc<dyn DecisionMaker>,
    summarizer: Option<Arc<dyn Summarizer>>,
    guard: Mutex<RepeatGuard>,
    bus: ActivityBus,
    config: CycleConfig,
    summarizing: AtomicBool,
}

/// Clears the in-flight flag even when the summary future is cancelled.
struct SummaryInFlight<'a>(&'a AtomicBool);

impl Drop for SummaryInFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DecisionCycle {
    /// Cycle over every module of `registry` with the default lock, no
    /// summarizer and a private activity bus.
    ///
    /// # Errors
    ///
    /// [`SynapseError::Configuration`] when `registry` has no modules.
    pub fn new(
        registry: CapabilityRegistry,
        decider: Arc<dyn DecisionMaker>,
    ) -> Result<Self, SynapseError> {
        let assembler = ContextAssembler::from_registry(&registry)?;
        let config = CycleConfig::default();
        Ok(Self {
            registry,
            assembler,
            lock: SingleFlightLock::default(),
            gate: SummaryGate::default(),
            decider,
            summarizer: None,
            guard: Mutex::new(RepeatGuard::new(config.repeat_threshold)),
            bus: ActivityBus::default(),
            config,
            summarizing: AtomicBool::new(false),
        })
    }

    /// Compress history through `summarizer` whenever `gate` says so.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>, gate: SummaryGate) -> Self {
        self.summarizer = Some(summarizer);
        self.gate = gate;
        self
    }

    pub fn with_lock(mut self, lock: SingleFlightLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_bus(mut self, bus: ActivityBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_config(mut self, config: CycleConfig) -> Self {
        self.guard = Mutex::new(RepeatGuard::new(config.repeat_threshold));
        self.config = config;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn lock(&self) -> &SingleFlightLock {
        &self.lock
    }

    pub fn bus(&self) -> &ActivityBus {
        &self.bus
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// The ordered context as the next cycle would see it right now.
    pub fn ordered_context(&self) -> Result<OrderedContext, SynapseError> {
        order_context(&self.assembler.assemble())
    }

    /// Run one decision cycle for `trigger`.
    ///
    /// # Errors
    ///
    /// - [`SynapseError::RejectedTrigger`] when the lock is saturated.
    /// - [`SynapseError::DecisionTimeout`] when deciding and acting exceed
    ///   the budget.
    /// - Any error of the merge, the decision-maker or the chosen action.
    #[instrument(skip(self, trigger), fields(source = %trigger.source))]
    pub async fn run(&self, trigger: Trigger) -> Result<CycleOutcome, SynapseError> {
        self.maybe_summarize().await;

        let _permit = self.lock.acquire().await?;
        let cycle_id = Uuid::new_v4();
        self.bus.emit(
            SOURCE,
            ActivityKind::CycleStarted {
                cycle_id,
                trigger: trigger.source.clone(),
            },
        );

        let result = self.decide_and_act(trigger).await;
        match &result {
            Ok(outcome) => {
                debug!(%cycle_id, ?outcome, "decision cycle completed");
                self.bus.emit(
                    SOURCE,
                    ActivityKind::CycleCompleted {
                        cycle_id,
                        action: outcome.action().map(str::to_string),
                    },
                );
            }
            Err(e) => {
                self.bus.emit(
                    SOURCE,
                    ActivityKind::CycleFailed {
                        cycle_id,
                        reason: e.to_string(),
                    },
                );
            }
        }
        result
    }

    async fn decide_and_act(&self, trigger: Trigger) -> Result<CycleOutcome, SynapseError> {
        let request = DecisionRequest {
            trigger,
            context: self.ordered_context()?,
            actions: self.registry.descriptors(),
        };
        debug!(
            events = request.context.timeline.len(),
            actions = request.actions.len(),
            "context assembled"
        );

        let budget = self.config.decision_timeout;
        tokio::time::timeout(budget, self.act_on(&request))
            .await
            .map_err(|_| SynapseError::DecisionTimeout {
                budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    async fn act_on(&self, request: &DecisionRequest) -> Result<CycleOutcome, SynapseError> {
        let decision = self.decider.decide(request).await?;
        if let Some(thought) = decision.thought {
            info!(%thought, "decision trace");
            self.bus.emit(SOURCE, ActivityKind::Thought(thought));
        }

        let Some(call) = decision.action else {
            self.guard.lock().reset();
            return Ok(CycleOutcome::Idle);
        };

        let repeated = self.guard.lock().record(&call);
        if repeated {
            warn!(action = %call.name, "same action chosen too many times in a row; withheld");
            self.bus.emit(
                SOURCE,
                ActivityKind::ActionSuppressed {
                    capability: call.name.clone(),
                },
            );
            return Ok(CycleOutcome::Suppressed { action: call.name });
        }

        let action = call.name.clone();
        let result = self.registry.dispatch(call).await?;
        info!(%action, %result, "action invoked");
        self.bus.emit(
            SOURCE,
            ActivityKind::ActionInvoked {
                capability: action.clone(),
                result: result.clone(),
            },
        );
        Ok(CycleOutcome::Acted { action, result })
    }

    // ── Summarization ────────────────────────────────────────────────────────

    async fn maybe_summarize(&self) {
        let Some(summarizer) = &self.summarizer else {
            return;
        };
        let before = self.registry.total_events();
        if !self.gate.should_summarize(before) {
            return;
        }
        if self.summarizing.swap(true, Ordering::AcqRel) {
            debug!("summary already in flight; skipped");
            return;
        }
        let _in_flight = SummaryInFlight(&self.summarizing);

        match self.summarize(summarizer.as_ref(), before).await {
            Ok(after) => {
                info!(before, after, "history summarized");
                self.bus.emit(
                    SOURCE,
                    ActivityKind::SummaryApplied {
                        events_before: before,
                        events_after: after,
                    },
                );
            }
            Err(e) => warn!(error = %e, "summarization skipped this cycle"),
        }
    }

    async fn summarize(
        &self,
        summarizer: &dyn Summarizer,
        before: usize,
    ) -> Result<usize, SynapseError> {
        let captured = self.registry.sessions();
        if captured.is_empty() {
            return Ok(before);
        }
        let budget = self.config.summary_timeout;
        let compressed = tokio::time::timeout(budget, summarizer.summarize(&captured))
            .await
            .map_err(|_| {
                SynapseError::SummarizationFailed(format!(
                    "no summary within {} ms",
                    budget.as_millis()
                ))
            })??;
        self.gate.check_compressed(&compressed)?;
        Ok(self.registry.apply_compressed(&captured, compressed))
    }
}
