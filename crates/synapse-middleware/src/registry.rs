//! [`CapabilityRegistry`] – the ordered set of linked capability modules and
//! the action router.
//!
//! Link order matters: it is the order in which sessions are captured and
//! therefore the first tie-break when the merger orders equal timestamps.
//!
//! Besides routing [`ActionCall`]s, the registry owns the whole-agent
//! operations that touch every module at once: counting events, capturing
//! sessions for the summarizer, applying compressed sessions, and the
//! export/import hooks used by persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use synapse_types::{ActionCall, AgentSnapshot, CapabilityDescriptor, SessionMap, SynapseError};
use tracing::{debug, warn};

use crate::capability::CapabilityModule;

/// Ordered collection of linked modules.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    modules: Vec<Arc<dyn CapabilityModule>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name()))
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a module after those already registered.
    ///
    /// # Errors
    ///
    /// [`SynapseError::Configuration`] when a module with the same name is
    /// already linked.
    pub fn register(&mut self, module: Arc<dyn CapabilityModule>) -> Result<(), SynapseError> {
        if self.module(module.name()).is_some() {
            return Err(SynapseError::Configuration(format!(
                "capability module `{}` is already linked",
                module.name()
            )));
        }
        debug!(module = module.name(), position = self.modules.len(), "module linked");
        self.modules.push(module);
        Ok(())
    }

    /// Linked modules in link order.
    pub fn modules(&self) -> &[Arc<dyn CapabilityModule>] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&Arc<dyn CapabilityModule>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Every offered action, freshly described.
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.modules.iter().filter_map(|m| m.describe()).collect()
    }

    /// Route `call` to the module offering an action of that name.
    ///
    /// # Errors
    ///
    /// [`SynapseError::UnknownCapability`] when no linked module offers the
    /// action; otherwise whatever the module's `invoke` returns.
    pub async fn dispatch(&self, call: ActionCall) -> Result<String, SynapseError> {
        let module = self
            .modules
            .iter()
            .find(|m| m.describe().is_some_and(|d| d.name == call.name))
            .ok_or_else(|| SynapseError::UnknownCapability(call.name.clone()))?;
        debug!(action = %call.name, module = module.name(), "dispatching action");
        module.invoke(call.arguments).await
    }

    /// Combined history length across all modules.
    pub fn total_events(&self) -> usize {
        self.modules.iter().map(|m| m.core().event_count()).sum()
    }

    /// Copy of every non-empty session, keyed by module name.
    pub fn sessions(&self) -> SessionMap {
        self.modules
            .iter()
            .filter_map(|m| {
                let session = m.core().state().session?;
                (!session.is_empty()).then(|| (m.name().to_string(), session))
            })
            .collect()
    }

    /// Replace the captured prefix of each module's session with its
    /// compressed counterpart.
    ///
    /// `captured` is the map the compressed result was produced from; only
    /// that many leading events are replaced in each module.  Modules absent
    /// from `compressed` keep their history.  Returns the combined event count
    /// afterwards.
    pub fn apply_compressed(&self, captured: &SessionMap, compressed: SessionMap) -> usize {
        for (name, events) in compressed {
            let Some(module) = self.module(&name) else {
                warn!(module = %name, "compressed session for unknown module ignored");
                continue;
            };
            let consumed = captured.get(&name).map_or(0, Vec::len);
            if consumed == 0 {
                warn!(
                    module = %name,
                    "compressed session for a module that was not captured ignored"
                );
                continue;
            }
            module.core().apply_summary(consumed, events);
        }
        self.total_events()
    }

    /// Export every module's state under `agent`.
    pub fn export_state(&self, agent: &str) -> AgentSnapshot {
        let modules = self
            .modules
            .iter()
            .map(|m| (m.name().to_string(), m.core().state()))
            .collect::<BTreeMap<_, _>>();
        AgentSnapshot {
            agent: agent.to_string(),
            saved_at: Utc::now(),
            modules,
        }
    }

    /// Restore module states from `snapshot`.  Returns how many modules were
    /// restored; entries for modules that are no longer linked are skipped.
    pub fn import_state(&self, snapshot: &AgentSnapshot) -> usize {
        let mut restored = 0;
        for (name, state) in &snapshot.modules {
            match self.module(name) {
                Some(module) => {
                    module.core().restore(state.clone());
                    restored += 1;
                }
                None => warn!(
                    module = %name,
                    agent = %snapshot.agent,
                    "snapshot entry for unlinked module skipped"
                ),
            }
        }
        debug!(agent = %snapshot.agent, restored, "agent state imported");
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::parse_arguments;
    use crate::state::ModuleCore;
    use crate::trigger::TriggerSink;
    use async_trait::async_trait;
    use serde_json::json;
    use synapse_types::{CapabilityState, TimestampedEvent};

    struct Echo {
        core: ModuleCore,
        action: Option<&'static str>,
    }

    #[async_trait]
    impl CapabilityModule for Echo {
        fn core(&self) -> &ModuleCore {
            &self.core
        }

        fn describe(&self) -> Option<CapabilityDescriptor> {
            self.action.map(|name| CapabilityDescriptor {
                name: name.to_string(),
                description: "Repeat a message.".to_string(),
                parameters: json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            })
        }

        async fn invoke(&self, arguments: serde_json::Value) -> Result<String, SynapseError> {
            #[derive(serde::Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = parse_arguments(self.name(), arguments)?;
            self.core.record_event("echo", args.text.clone());
            Ok(args.text)
        }
    }

    fn echo(name: &str, action: Option<&'static str>, sink: &TriggerSink) -> Arc<Echo> {
        Arc::new(Echo {
            core: ModuleCore::new(name, CapabilityState::with_history(), sink.clone()),
            action,
        })
    }

    fn event(key: &str) -> TimestampedEvent {
        TimestampedEvent::from_raw(key, "x")
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (sink, _queue) = TriggerSink::channel();
        let mut registry = CapabilityRegistry::new();
        registry.register(echo("chat", Some("say"), &sink)).unwrap();
        let err = registry.register(echo("chat", None, &sink)).unwrap_err();
        assert!(matches!(err, SynapseError::Configuration(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn descriptors_skip_state_only_modules() {
        let (sink, _queue) = TriggerSink::channel();
        let mut registry = CapabilityRegistry::new();
        registry.register(echo("chat", Some("say"), &sink)).unwrap();
        registry.register(echo("log", None, &sink)).unwrap();
        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["say"]);
    }

    #[tokio::test]
    async fn dispatch_routes_by_action_name() {
        let (sink, _queue) = TriggerSink::channel();
        let mut registry = CapabilityRegistry::new();
        registry.register(echo("chat", Some("say"), &sink)).unwrap();

        let result = registry
            .dispatch(ActionCall {
                name: "say".into(),
                arguments: json!({"text": "hello"}),
            })
            .await
            .unwrap();
        assert_eq!(result, "hello");
        assert_eq!(registry.total_events(), 1);

        let err = registry
            .dispatch(ActionCall {
                name: "fly".into(),
                arguments: json!({}),
            })
            .await
            .unwrap_err();
        assert_eq!(err, SynapseError::UnknownCapability("fly".into()));

        let err = registry
            .dispatch(ActionCall {
                name: "say".into(),
                arguments: json!({"volume": 3}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SynapseError::InvalidArguments { .. }));
    }

    #[test]
    fn apply_compressed_replaces_only_captured_prefix() {
        let (sink, _queue) = TriggerSink::channel();
        let mut registry = CapabilityRegistry::new();
        let drive = echo("drive", None, &sink);
        let arm = echo("arm", None, &sink);
        registry.register(drive.clone()).unwrap();
        registry.register(arm.clone()).unwrap();

        let mut state = CapabilityState::with_history();
        state.session.as_mut().unwrap().extend([
            event("[2026-02-07 14:19:38] status"),
            event("[2026-02-07 14:19:40] status"),
        ]);
        drive.core().restore(state);
        arm.core().restore(CapabilityState::with_history());

        let captured = registry.sessions();
        assert_eq!(captured.len(), 1, "empty sessions are not captured");

        // Arrives while the summarizer is working.
        drive.core().record_event("status", "blocked");

        let compressed = SessionMap::from([
            ("drive".to_string(), vec![event("[2026-02-07 14:19:38] summary")]),
            ("ghost".to_string(), vec![event("[2026-02-07 14:19:38] summary")]),
        ]);
        assert_eq!(registry.apply_compressed(&captured, compressed), 2);

        let session = drive.core().state().session.unwrap();
        assert_eq!(session[0].label(), "summary");
        assert_eq!(session[1].label(), "status");
    }

    #[test]
    fn export_then_import_restores_every_module() {
        let (sink, _queue) = TriggerSink::channel();
        let mut original = CapabilityRegistry::new();
        let chat = echo("chat", Some("say"), &sink);
        original.register(chat.clone()).unwrap();
        chat.core().record_event("user", "hi");
        chat.core().set_impression(json!({"unread": 0}));

        let snapshot = original.export_state("helper");
        assert_eq!(snapshot.agent, "helper");

        let mut fresh = CapabilityRegistry::new();
        let fresh_chat = echo("chat", Some("say"), &sink);
        fresh.register(fresh_chat.clone()).unwrap();
        assert_eq!(fresh.import_state(&snapshot), 1);
        assert_eq!(fresh_chat.core().state(), chat.core().state());
    }
}
