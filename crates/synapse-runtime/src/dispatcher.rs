//! [`TriggerDispatcher`] – turns queued triggers into decision cycles.
//!
//! The dispatcher owns the [`TriggerQueue`] and spawns one
//! [`DecisionCycle::run`] per trigger without waiting for it.  Concurrency is
//! bounded by the cycle's lock, not here: a trigger that finds the lock
//! saturated is dropped, counted and reported as
//! [`ActivityKind::TriggerRejected`].
//!
//! The submit side is the [`TriggerSink`][synapse_middleware::TriggerSink]
//! paired with the queue; modules hold clones of it.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use synapse_middleware::TriggerQueue;
//! # use synapse_runtime::{DecisionCycle, TriggerDispatcher};
//! # async fn wire(queue: TriggerQueue, cycle: Arc<DecisionCycle>) {
//! let dispatcher = TriggerDispatcher::new(queue, cycle);
//! let mut status = dispatcher.status();
//! tokio::spawn(dispatcher.run());
//! status.changed().await.ok();
//! println!("{:?}", *status.borrow());
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use synapse_middleware::TriggerQueue;
use synapse_types::{ActivityKind, Trigger};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::orchestrator::DecisionCycle;

const SOURCE: &str = "synapse-runtime::dispatcher";

/// Whether any cycle is currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchState {
    #[default]
    Idle,
    Busy,
}

/// Snapshot published on the dispatcher's watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStatus {
    pub state: DispatchState,
    /// Spawned cycles that have not returned yet, queued ones included.
    pub in_flight: usize,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub triggers_rejected: u64,
}

pub struct TriggerDispatcher {
    queue: TriggerQueue,
    cycle: Arc<DecisionCycle>,
    status: Arc<watch::Sender<DispatcherStatus>>,
    tasks: JoinSet<()>,
}

impl TriggerDispatcher {
    pub fn new(queue: TriggerQueue, cycle: Arc<DecisionCycle>) -> Self {
        let (status, _) = watch::channel(DispatcherStatus::default());
        Self {
            queue,
            cycle,
            status: Arc::new(status),
            tasks: JoinSet::new(),
        }
    }

    /// Follow the dispatcher's status.
    pub fn status(&self) -> watch::Receiver<DispatcherStatus> {
        self.status.subscribe()
    }

    /// Dispatch until every trigger sink is dropped, then wait for the
    /// cycles still in flight.
    ///
    /// Modules linked into the cycle usually hold sinks themselves, so a
    /// long-running process should prefer [`run_until`](Self::run_until).
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Dispatch until `shutdown` resolves or every sink is dropped.
    ///
    /// On shutdown, cycles still in flight are aborted; their locks are
    /// released as they unwind.
    #[instrument(skip_all)]
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!("trigger dispatcher started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(in_flight = self.tasks.len(), "dispatcher shutting down");
                    self.tasks.abort_all();
                    break;
                }
                next = self.queue.next() => match next {
                    Some(trigger) => self.spawn(trigger),
                    None => {
                        debug!("all trigger sinks dropped");
                        break;
                    }
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    Self::reap(joined);
                }
            }
        }
        while let Some(joined) = self.tasks.join_next().await {
            Self::reap(joined);
        }
        self.status.send_modify(|s| {
            s.in_flight = 0;
            s.state = DispatchState::Idle;
        });
        info!("trigger dispatcher stopped");
    }

    fn spawn(&mut self, trigger: Trigger) {
        let source = trigger.source.clone();
        debug!(%source, "trigger received");
        self.cycle.bus().emit(
            SOURCE,
            ActivityKind::TriggerReceived {
                module: source.clone(),
            },
        );
        self.status.send_modify(|s| {
            s.in_flight += 1;
            s.state = DispatchState::Busy;
        });

        let cycle = Arc::clone(&self.cycle);
        let status = Arc::clone(&self.status);
        self.tasks.spawn(async move {
            let result = cycle.run(trigger).await;
            status.send_modify(|s| {
                s.in_flight = s.in_flight.saturating_sub(1);
                match &result {
                    Ok(_) => s.cycles_completed += 1,
                    Err(e) if e.is_rejection() => s.triggers_rejected += 1,
                    Err(_) => s.cycles_failed += 1,
                }
                if s.in_flight == 0 {
                    s.state = DispatchState::Idle;
                }
            });
            match result {
                Ok(outcome) => debug!(%source, ?outcome, "cycle finished"),
                Err(e) if e.is_rejection() => {
                    debug!(%source, "trigger dropped: a cycle is running and one is queued");
                    cycle
                        .bus()
                        .emit(SOURCE, ActivityKind::TriggerRejected { module: source });
                }
                Err(e) => warn!(%source, error = %e, "decision cycle failed"),
            }
        });
    }

    fn reap(joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "decision cycle task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use synapse_capabilities::ChatModule;
    use synapse_middleware::{CapabilityRegistry, TriggerSink};
    use synapse_types::SynapseError;

    use crate::decision::{Decision, DecisionMaker, DecisionRequest};
    use crate::orchestrator::CycleConfig;

    struct Sleepy {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DecisionMaker for Sleepy {
        async fn decide(&self, _request: &DecisionRequest) -> Result<Decision, SynapseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Decision::idle())
        }
    }

    fn wire(
        delay: Duration,
        config: CycleConfig,
    ) -> (TriggerSink, Arc<ChatModule>, Arc<Sleepy>, TriggerDispatcher) {
        let (sink, queue) = TriggerSink::channel();
        let (chat, _replies) = ChatModule::new(sink.clone());
        let chat = Arc::new(chat);
        let mut registry = CapabilityRegistry::new();
        registry.register(chat.clone()).unwrap();
        let decider = Arc::new(Sleepy {
            delay,
            calls: AtomicUsize::new(0),
        });
        let cycle = DecisionCycle::new(registry, decider.clone())
            .unwrap()
            .with_config(config);
        (sink, chat, decider, TriggerDispatcher::new(queue, Arc::new(cycle)))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_triggers_is_coalesced() {
        let (_sink, chat, decider, dispatcher) =
            wire(Duration::from_millis(100), CycleConfig::default());
        let mut status = dispatcher.status();
        let handle = tokio::spawn(dispatcher.run());

        chat.receive("one").unwrap();
        chat.receive("two").unwrap();
        chat.receive("three").unwrap();
        let last = status
            .wait_for(|s| s.cycles_completed + s.triggers_rejected == 3)
            .await
            .unwrap()
            .clone();
        handle.abort();

        assert_eq!(decider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(last.cycles_completed, 2);
        assert_eq!(last.triggers_rejected, 1);
        assert_eq!(last.cycles_failed, 0);
        assert_eq!(last.state, DispatchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_leaves_dispatcher_available() {
        let config = CycleConfig {
            decision_timeout: Duration::from_millis(10),
            ..CycleConfig::default()
        };
        let (_sink, chat, decider, dispatcher) = wire(Duration::from_secs(5), config);
        let mut status = dispatcher.status();
        let handle = tokio::spawn(dispatcher.run());

        chat.receive("first").unwrap();
        status
            .wait_for(|s| s.cycles_failed == 1 && s.state == DispatchState::Idle)
            .await
            .unwrap();

        chat.receive("second").unwrap();
        status.wait_for(|s| s.cycles_failed == 2).await.unwrap();
        assert_eq!(decider.calls.load(Ordering::SeqCst), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn closed_queue_ends_the_loop() {
        let (sink, queue) = TriggerSink::channel();
        let (chat, _replies) = ChatModule::new(TriggerSink::channel().0);
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(chat)).unwrap();
        let decider = Arc::new(Sleepy {
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        let cycle = DecisionCycle::new(registry, decider.clone()).unwrap();
        let dispatcher = TriggerDispatcher::new(queue, Arc::new(cycle));
        let status = dispatcher.status();

        sink.submit(Trigger::from_module("chat")).unwrap();
        drop(sink);
        dispatcher.run().await;

        assert_eq!(decider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(status.borrow().cycles_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_in_flight_cycles() {
        let (sink, chat, _decider, dispatcher) =
            wire(Duration::from_secs(3600), CycleConfig::default());
        let mut status = dispatcher.status();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(dispatcher.run_until(async {
            stopped.await.ok();
        }));

        chat.receive("hello").unwrap();
        status.wait_for(|s| s.state == DispatchState::Busy).await.unwrap();
        stop.send(()).unwrap();
        handle.await.unwrap();

        let last = status.borrow().clone();
        assert_eq!(last.state, DispatchState::Idle);
        assert_eq!(last.in_flight, 0);
        drop(sink);
    }
}
