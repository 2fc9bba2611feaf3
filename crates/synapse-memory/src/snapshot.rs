//! Agent Snapshot Store.
//!
//! Persists [`AgentSnapshot`]s to a local SQLite database so an agent's
//! accumulated context survives a restart.
//!
//! # Storage layout
//!
//! A single table `agent_states` is created (if it does not already exist):
//!
//! | column   | type | description                                  |
//! |----------|------|----------------------------------------------|
//! | agent    | TEXT | Agent identity name                          |
//! | module   | TEXT | Capability module name                       |
//! | state    | TEXT | JSON-encoded `CapabilityState`               |
//! | saved_at | TEXT | RFC-3339 time of the save (UTC)              |
//!
//! `(agent, module)` is the primary key.  Saving an agent replaces all of its
//! rows in one transaction, so a load never sees half of two different saves.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use chrono::Utc;
//! use synapse_memory::snapshot::SnapshotStore;
//! use synapse_types::{AgentSnapshot, CapabilityState};
//!
//! let store = SnapshotStore::open_in_memory().unwrap();
//! let snapshot = AgentSnapshot {
//!     agent: "helper".into(),
//!     saved_at: Utc::now(),
//!     modules: BTreeMap::from([("chat".to_string(), CapabilityState::with_history())]),
//! };
//! store.save(&snapshot).unwrap();
//!
//! let loaded = store.load("helper").unwrap().unwrap();
//! assert_eq!(loaded.modules, snapshot.modules);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use synapse_middleware::StatePersistence;
use synapse_types::{AgentSnapshot, CapabilityState, SynapseError};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored state of `{agent}/{module}` is unreadable: {source}")]
    Corrupt {
        agent: String,
        module: String,
        source: serde_json::Error,
    },
    #[error("State encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Bad timestamp `{0}`")]
    Timestamp(String),
}

impl From<SnapshotError> for SynapseError {
    fn from(err: SnapshotError) -> Self {
        SynapseError::Persistence(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SnapshotStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed store of agent snapshots.
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        Self::init(Connection::open(path)?)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, SnapshotError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SnapshotError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agent_states (
                agent    TEXT NOT NULL,
                module   TEXT NOT NULL,
                state    TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                PRIMARY KEY (agent, module)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Replace everything stored for `snapshot.agent`.
    pub fn save(&self, snapshot: &AgentSnapshot) -> Result<(), SnapshotError> {
        let saved_at = snapshot.saved_at.to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM agent_states WHERE agent = ?1",
            params![snapshot.agent],
        )?;
        for (module, state) in &snapshot.modules {
            tx.execute(
                "INSERT INTO agent_states (agent, module, state, saved_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.agent,
                    module,
                    serde_json::to_string(state)?,
                    saved_at
                ],
            )?;
        }
        tx.commit()?;
        debug!(agent = %snapshot.agent, modules = snapshot.modules.len(), "agent snapshot saved");
        Ok(())
    }

    /// The stored snapshot of `agent`, or `None` if nothing was saved.
    pub fn load(&self, agent: &str) -> Result<Option<AgentSnapshot>, SnapshotError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT module, state, saved_at FROM agent_states
             WHERE agent = ?1
             ORDER BY module ASC",
        )?;
        let rows = stmt.query_map(params![agent], |row| {
            let module: String = row.get(0)?;
            let state: String = row.get(1)?;
            let saved_at: String = row.get(2)?;
            Ok((module, state, saved_at))
        })?;

        let mut modules = BTreeMap::new();
        let mut latest: Option<DateTime<Utc>> = None;
        for row in rows {
            let (module, state, saved_at) = row?;
            let state: CapabilityState =
                serde_json::from_str(&state).map_err(|source| SnapshotError::Corrupt {
                    agent: agent.to_string(),
                    module: module.clone(),
                    source,
                })?;
            let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                .map_err(|_| SnapshotError::Timestamp(saved_at.clone()))?
                .with_timezone(&Utc);
            latest = Some(latest.map_or(saved_at, |l| l.max(saved_at)));
            modules.insert(module, state);
        }

        Ok(latest.map(|saved_at| AgentSnapshot {
            agent: agent.to_string(),
            saved_at,
            modules,
        }))
    }

    /// Every agent with a stored snapshot.
    pub fn agents(&self) -> Result<Vec<String>, SnapshotError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT agent FROM agent_states ORDER BY agent ASC")?;
        let agents = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(agents)
    }

    /// Forget `agent`.  Returns the number of module rows removed.
    pub fn delete(&self, agent: &str) -> Result<usize, SnapshotError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM agent_states WHERE agent = ?1", params![agent])?;
        Ok(removed)
    }
}

impl StatePersistence for SnapshotStore {
    fn save(&self, snapshot: &AgentSnapshot) -> Result<(), SynapseError> {
        SnapshotStore::save(self, snapshot).map_err(Into::into)
    }

    fn load(&self, agent: &str) -> Result<Option<AgentSnapshot>, SynapseError> {
        SnapshotStore::load(self, agent).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use synapse_capabilities::{ArmModule, ChatModule, SimArm};
    use synapse_context::{ContextAssembler, order_context};
    use synapse_middleware::{CapabilityModule, CapabilityRegistry, TriggerSink};
    use synapse_types::TimestampedEvent;

    fn snapshot(agent: &str, modules: Vec<(&str, Vec<&str>)>) -> AgentSnapshot {
        let modules = modules
            .into_iter()
            .map(|(name, keys)| {
                let mut state = CapabilityState::with_history();
                state
                    .session
                    .as_mut()
                    .unwrap()
                    .extend(keys.into_iter().map(|k| TimestampedEvent::from_raw(k, "x")));
                (name.to_string(), state)
            })
            .collect();
        AgentSnapshot {
            agent: agent.to_string(),
            saved_at: Utc::now(),
            modules,
        }
    }

    #[test]
    fn missing_agent_loads_none() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.load("nobody").unwrap().is_none());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store
            .save(&snapshot(
                "helper",
                vec![("chat", vec!["[2026-02-07 14:00:00] user"]), ("arm", vec![])],
            ))
            .unwrap();
        let second = snapshot("helper", vec![("chat", vec!["[2026-02-07 15:00:00] user"])]);
        store.save(&second).unwrap();

        let loaded = store.load("helper").unwrap().unwrap();
        assert_eq!(loaded.modules, second.modules);
        assert_eq!(loaded.saved_at, second.saved_at);
    }

    #[test]
    fn agents_are_kept_apart() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store.save(&snapshot("helper", vec![("chat", vec![])])).unwrap();
        store.save(&snapshot("scout", vec![("navigation", vec![])])).unwrap();
        assert_eq!(store.agents().unwrap(), vec!["helper", "scout"]);

        assert_eq!(store.delete("helper").unwrap(), 1);
        assert_eq!(store.agents().unwrap(), vec!["scout"]);
        assert!(store.load("helper").unwrap().is_none());
    }

    #[test]
    fn corrupt_row_is_reported() {
        let store = SnapshotStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO agent_states VALUES ('helper', 'chat', 'not json', '2026-02-07T14:00:00Z')",
                [],
            )
            .unwrap();
        let err = store.load("helper").unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { ref module, .. } if module == "chat"));
        let err: SynapseError = err.into();
        assert!(matches!(err, SynapseError::Persistence(_)));
    }

    #[test]
    fn persistent_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let saved = snapshot("helper", vec![("chat", vec!["[2026-02-07 14:00:00] user"])]);
        SnapshotStore::open(&path).unwrap().save(&saved).unwrap();

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.load("helper").unwrap().unwrap().modules, saved.modules);
    }

    fn registry(sink: &TriggerSink) -> (CapabilityRegistry, Arc<ChatModule>, Arc<ArmModule>) {
        let (chat, _replies) = ChatModule::new(sink.clone());
        let chat = Arc::new(chat);
        let arm = Arc::new(ArmModule::new(Arc::new(SimArm::default()), sink.clone()));
        let mut registry = CapabilityRegistry::new();
        registry.register(chat.clone()).unwrap();
        registry.register(arm.clone()).unwrap();
        (registry, chat, arm)
    }

    #[test]
    fn restore_reproduces_the_ordered_context() {
        let (sink, _queue) = TriggerSink::channel();
        let (original, chat, arm) = registry(&sink);
        chat.receive("bring me breakfast").unwrap();
        arm.report_feedback(synapse_capabilities::ArmFeedback {
            gripper_closed: true,
            holding: Some("breakfast".into()),
            note: "picked up breakfast".into(),
            done: false,
        })
        .unwrap();
        let before =
            order_context(&ContextAssembler::from_registry(&original).unwrap().assemble()).unwrap();

        let store: Box<dyn StatePersistence> = Box::new(SnapshotStore::open_in_memory().unwrap());
        store.save(&original.export_state("helper")).unwrap();

        let (fresh, _, _) = registry(&sink);
        let loaded = store.load("helper").unwrap().unwrap();
        assert_eq!(fresh.import_state(&loaded), 2);
        let after =
            order_context(&ContextAssembler::from_registry(&fresh).unwrap().assemble()).unwrap();

        assert_eq!(after, before);
        assert!(!after.timeline.is_empty());
        assert_eq!(fresh.module("arm").unwrap().core().state(), arm.core().state());
    }
}
