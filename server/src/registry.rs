//! Concurrent directory of agent sessions.
//!
//! Sessions are keyed by a normalized agent id (trimmed, lower-cased) so
//! `" Alice"` and `"alice"` name the same learner. Each session sits behind
//! its own lock; the map itself is sharded, so work on different agents
//! never contends.

use dashmap::{mapref::entry::Entry, DashMap};
use engine_core::{GridEnvironment, ValueStore};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::error::ProtocolError;
use crate::metrics;
use crate::session::{AgentSession, SessionSettings};

/// Canonical form of an agent id, or `None` if it is blank.
pub fn normalize_agent_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// A registered session plus a lock-free handle on its value tables.
pub struct SessionHandle {
    agent_id: String,
    session: Mutex<AgentSession>,
    values: Arc<ValueStore>,
}

impl SessionHandle {
    fn new(session: AgentSession) -> Self {
        Self {
            agent_id: session.agent_id().to_string(),
            values: Arc::clone(session.values()),
            session: Mutex::new(session),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Lock the episode state. A panic in another holder does not leave
    /// the session unusable.
    pub fn lock(&self) -> MutexGuard<'_, AgentSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The server's value tables for this agent; usable without the
    /// session lock.
    pub fn values(&self) -> &Arc<ValueStore> {
        &self.values
    }
}

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    settings: Arc<SessionSettings>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Build one throwaway world to surface an infeasible hazard
    /// configuration at startup instead of on the first join.
    pub fn preflight(&self) -> Result<(), ProtocolError> {
        GridEnvironment::new(&self.settings.world, ChaCha20Rng::seed_from_u64(0))?;
        Ok(())
    }

    fn session_rng(&self, agent_id: &str) -> ChaCha20Rng {
        match self.settings.world.seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                agent_id.hash(&mut hasher);
                ChaCha20Rng::seed_from_u64(seed ^ hasher.finish())
            }
            None => ChaCha20Rng::from_entropy(),
        }
    }

    /// Register a fresh session for `agent_id`.
    ///
    /// Returns `Ok(false)` if the agent already has one. The check and the
    /// insert happen under the same shard lock, so concurrent joins for the
    /// same id create exactly one session.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedMessage`] for a blank id; an engine error
    /// if the world cannot be built.
    pub fn add_session(&self, agent_id: &str) -> Result<bool, ProtocolError> {
        let key = normalize_agent_id(agent_id)
            .ok_or_else(|| ProtocolError::MalformedMessage("agent_id cannot be empty".into()))?;

        match self.sessions.entry(key) {
            Entry::Occupied(entry) => {
                warn!(agent_id = %entry.key(), "Session already exists");
                Ok(false)
            }
            Entry::Vacant(entry) => {
                let rng = self.session_rng(entry.key());
                let session = AgentSession::new(entry.key().clone(), &self.settings, rng)?;
                entry.insert(Arc::new(SessionHandle::new(session)));
                metrics::SESSIONS_CREATED.inc();
                metrics::SESSIONS_ACTIVE.inc();
                info!(agent_id = %agent_id.trim(), "Session created");
                Ok(true)
            }
        }
    }

    /// Register an already built session under its own agent id.
    ///
    /// Returns `false`, dropping `session`, if the id is blank or taken.
    pub fn insert_session(&self, session: AgentSession) -> bool {
        let Some(key) = normalize_agent_id(session.agent_id()) else {
            return false;
        };
        match self.sessions.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(SessionHandle::new(session)));
                metrics::SESSIONS_CREATED.inc();
                metrics::SESSIONS_ACTIVE.inc();
                true
            }
        }
    }

    /// Remove and clean up the session for `agent_id`, returning whether
    /// one existed.
    pub fn remove_session(&self, agent_id: &str) -> bool {
        let Some(key) = normalize_agent_id(agent_id) else {
            return false;
        };
        match self.sessions.remove(&key) {
            Some((_, handle)) => {
                handle.lock().cleanup();
                metrics::SESSIONS_ACTIVE.dec();
                info!(agent_id = %key, "Session removed");
                true
            }
            None => false,
        }
    }

    pub fn get_session(&self, agent_id: &str) -> Option<Arc<SessionHandle>> {
        let key = normalize_agent_id(agent_id)?;
        self.sessions.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn has_session(&self, agent_id: &str) -> bool {
        self.get_session(agent_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sorted list of registered (normalized) agent ids.
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Remove every session.
    pub fn clear(&self) {
        for id in self.agent_ids() {
            self.remove_session(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn registry() -> SessionRegistry {
        let mut settings = SessionSettings::default();
        settings.world.seed = Some(42);
        SessionRegistry::new(settings)
    }

    #[test]
    fn normalization_trims_and_folds_case() {
        assert_eq!(normalize_agent_id("  Alice "), Some("alice".to_string()));
        assert_eq!(normalize_agent_id("   "), None);
        assert_eq!(normalize_agent_id(""), None);
    }

    #[test]
    fn add_twice_admits_once() {
        let registry = registry();
        assert!(registry.add_session("alice").unwrap());
        assert!(!registry.add_session("alice").unwrap());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn keys_are_normalized() {
        let registry = registry();
        assert!(registry.add_session("Alice").unwrap());
        assert!(!registry.add_session("  alice  ").unwrap());
        assert!(registry.has_session("ALICE"));
        assert_eq!(registry.agent_ids(), vec!["alice".to_string()]);
    }

    #[test]
    fn blank_id_is_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.add_session("  "),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn remove_reports_existence() {
        let registry = registry();
        registry.add_session("bob").unwrap();
        let handle = registry.get_session("bob").unwrap();
        assert!(registry.remove_session("BOB"));
        assert!(!registry.remove_session("bob"));
        assert!(registry.get_session("bob").is_none());
        assert_eq!(registry.active_count(), 0);
        // The removed session has released its world.
        assert!(handle.lock().environment().hazards().is_empty());
    }

    #[test]
    fn seeded_sessions_are_reproducible_per_agent() {
        let a = registry();
        let b = registry();
        a.add_session("carol").unwrap();
        b.add_session("Carol").unwrap();
        let hazards = |registry: &SessionRegistry| {
            let handle = registry.get_session("carol").unwrap();
            let session = handle.lock();
            session.environment().hazards().to_vec()
        };
        assert_eq!(hazards(&a), hazards(&b));
    }

    #[test]
    fn concurrent_adds_for_same_agent_create_one_session() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.add_session("dave").unwrap())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn concurrent_add_and_remove_for_same_agent() {
        let registry = Arc::new(registry());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut net = 0i64;
                    for _ in 0..50 {
                        let changed = if i % 2 == 0 {
                            registry.add_session("hank").unwrap()
                        } else {
                            registry.remove_session(" HANK ")
                        };
                        if changed {
                            net += if i % 2 == 0 { 1 } else { -1 };
                        }
                        assert!(registry.active_count() <= 1);
                    }
                    net
                })
            })
            .collect();
        let net: i64 = workers.into_iter().map(|w| w.join().unwrap()).sum();

        // Every successful add is matched by at most one successful remove.
        assert_eq!(net, registry.active_count() as i64);
        assert!(registry.active_count() <= 1);
        assert_eq!(registry.active_count() == 1, registry.has_session("hank"));
    }

    #[test]
    fn concurrent_adds_for_distinct_agents() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.add_session(&format!("agent-{i}")).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(registry.active_count(), 16);
        registry.clear();
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn values_handle_shares_the_session_table() {
        let registry = registry();
        registry.add_session("erin").unwrap();
        let handle = registry.get_session("erin").unwrap();
        handle.values().set_v(3, 1.25).unwrap();
        assert_eq!(handle.lock().values().get_v(3).unwrap(), 1.25);
    }

    #[test]
    fn insert_prebuilt_session() {
        let registry = registry();
        let session = AgentSession::new("Frank", registry.settings(), ChaCha20Rng::seed_from_u64(3))
            .unwrap();
        assert!(registry.insert_session(session));
        assert!(registry.has_session("frank"));

        let again = AgentSession::new("frank", registry.settings(), ChaCha20Rng::seed_from_u64(3))
            .unwrap();
        assert!(!registry.insert_session(again));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn preflight_detects_infeasible_world() {
        let mut settings = SessionSettings::default();
        settings.world.grid_size = 3;
        settings.world.max_hazards = 3;
        let registry = SessionRegistry::new(settings);
        assert!(registry.preflight().is_err());
        assert!(SessionRegistry::new(SessionSettings::default())
            .preflight()
            .is_ok());
    }
}
