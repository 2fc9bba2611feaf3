//! Context Assembler.
//!
//! Takes a point-in-time copy of every linked module's state.  Each module is
//! read independently; cross-module consistency holds only as of the moment
//! each copy is taken.  Later writes to a module never reach an already-built
//! [`Context`].

use std::sync::Arc;

use synapse_middleware::{CapabilityModule, CapabilityRegistry};
use synapse_types::{Context, ModuleSession, SynapseError};
use tracing::debug;

#[derive(Clone)]
pub struct ContextAssembler {
    modules: Vec<Arc<dyn CapabilityModule>>,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ContextAssembler {
    /// Assemble over `modules`, in the given order.
    ///
    /// # Errors
    ///
    /// [`SynapseError::Configuration`] when `modules` is empty.
    pub fn new(modules: Vec<Arc<dyn CapabilityModule>>) -> Result<Self, SynapseError> {
        if modules.is_empty() {
            return Err(SynapseError::Configuration(
                "a context needs at least one linked capability module".to_string(),
            ));
        }
        Ok(Self { modules })
    }

    /// Assemble over every module of `registry`, in link order.
    pub fn from_registry(registry: &CapabilityRegistry) -> Result<Self, SynapseError> {
        Self::new(registry.modules().to_vec())
    }

    /// Copy the current state of every module.
    ///
    /// Modules without history or with an empty history contribute no
    /// session; modules without an impression contribute none.
    pub fn assemble(&self) -> Context {
        let mut context = Context::default();
        for module in &self.modules {
            let state = module.core().state();
            if let Some(events) = state.session.filter(|s| !s.is_empty()) {
                context.sessions.push(ModuleSession {
                    module: module.name().to_string(),
                    events,
                });
            }
            if let Some(impression) = state.impression {
                context
                    .impressions
                    .insert(module.name().to_string(), impression);
            }
        }
        debug!(
            sessions = context.sessions.len(),
            impressions = context.impressions.len(),
            events = context.event_count(),
            "context assembled"
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use synapse_middleware::{ModuleCore, TriggerSink};
    use synapse_types::{CapabilityDescriptor, CapabilityState};

    struct Passive {
        core: ModuleCore,
    }

    #[async_trait]
    impl CapabilityModule for Passive {
        fn core(&self) -> &ModuleCore {
            &self.core
        }

        fn describe(&self) -> Option<CapabilityDescriptor> {
            None
        }

        async fn invoke(&self, _arguments: serde_json::Value) -> Result<String, SynapseError> {
            Ok(String::new())
        }
    }

    fn passive(name: &str, initial: CapabilityState) -> Arc<Passive> {
        let (sink, _queue) = TriggerSink::channel();
        Arc::new(Passive {
            core: ModuleCore::new(name, initial, sink),
        })
    }

    #[test]
    fn zero_modules_is_a_configuration_error() {
        let err = ContextAssembler::new(Vec::new()).unwrap_err();
        assert!(matches!(err, SynapseError::Configuration(_)));
        let err = ContextAssembler::from_registry(&CapabilityRegistry::new()).unwrap_err();
        assert!(matches!(err, SynapseError::Configuration(_)));
    }

    #[test]
    fn absent_and_empty_state_is_skipped() {
        let silent = passive("silent", CapabilityState::without_history());
        let quiet = passive("quiet", CapabilityState::with_history());
        let drive = passive(
            "drive",
            CapabilityState::with_history().with_impression(json!({"moving": false})),
        );
        drive.core().record_event("status", "arrived at store");

        let modules: Vec<Arc<dyn CapabilityModule>> = vec![silent, quiet, drive];
        let assembler = ContextAssembler::new(modules).unwrap();
        let context = assembler.assemble();

        assert_eq!(context.sessions.len(), 1);
        assert_eq!(context.sessions[0].module, "drive");
        assert_eq!(context.impressions.len(), 1);
        assert_eq!(context.impressions["drive"], json!({"moving": false}));
    }

    #[test]
    fn context_is_a_copy() {
        let chat = passive("chat", CapabilityState::with_history());
        chat.core().record_event("user", "hello");
        let modules: Vec<Arc<dyn CapabilityModule>> = vec![chat.clone()];
        let assembler = ContextAssembler::new(modules).unwrap();

        let context = assembler.assemble();
        chat.core().record_event("user", "are you there?");
        chat.core().set_impression(json!({"typing": true}));

        assert_eq!(context.event_count(), 1);
        assert!(context.impressions.is_empty());
        assert_eq!(assembler.assemble().event_count(), 2);
    }

    #[test]
    fn sessions_follow_link_order() {
        let mut registry = CapabilityRegistry::new();
        for name in ["chat", "drive", "arm"] {
            let module = passive(name, CapabilityState::with_history());
            module.core().record_event("status", name);
            registry.register(module).unwrap();
        }
        let context = ContextAssembler::from_registry(&registry).unwrap().assemble();
        let order: Vec<_> = context.sessions.iter().map(|s| s.module.as_str()).collect();
        assert_eq!(order, vec!["chat", "drive", "arm"]);
    }
}
