//! Registry of live sessions, at most one per [`SessionKey`].
//!
//! The registry lock guards map mutation only. Starting and stopping a
//! session (file I/O, thread join) happen after the lock is released, so a
//! slow stop on one key never blocks calls for another. A key whose previous
//! session is still stopping is not reopened until that stop returns, so two
//! sessions never append to the same stream at once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::config::MetricsConfig;
use crate::key::SessionKey;
use crate::probe::{ProbeFactory, platform_probes};
use crate::session::{Session, lock};

#[derive(Default)]
struct Registry {
    live: HashMap<SessionKey, Arc<Session>>,
    /// Removed from `live` but `stop()` has not returned yet.
    stopping: HashSet<SessionKey>,
}

pub struct Manager {
    config: MetricsConfig,
    probes: ProbeFactory,
    registry: Mutex<Registry>,
    stopped: Condvar,
}

impl Manager {
    /// A manager sampling the platform probes.
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_probe_factory(config, platform_probes())
    }

    /// A manager whose sessions sample from `factory`.
    pub fn with_probe_factory(config: MetricsConfig, factory: ProbeFactory) -> Self {
        Self {
            config,
            probes: factory,
            registry: Mutex::new(Registry::default()),
            stopped: Condvar::new(),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Return the session for `key`, creating and starting one if absent.
    ///
    /// Repeated calls return the same session. Its start is idempotent, so a
    /// caller racing the creator may call it again harmlessly. If the key's
    /// previous session is still stopping, this waits for that stop.
    pub fn ensure_active(&self, key: impl Into<SessionKey>) -> Arc<Session> {
        let key = key.into();
        let session = {
            let registry = lock(&self.registry);
            let mut registry = self
                .stopped
                .wait_while(registry, |r| r.stopping.contains(&key))
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = registry.live.get(&key) {
                return Arc::clone(existing);
            }
            let session = Arc::new(Session::new(
                key.clone(),
                self.config.clone(),
                (self.probes)(&self.config),
            ));
            registry.live.insert(key, Arc::clone(&session));
            session
        };
        session.start();
        session
    }

    /// Forward a latency observation; ignored for unknown keys.
    pub fn note_latency(&self, key: impl Into<SessionKey>, value_ms: f64) {
        if let Some(session) = self.get(key) {
            session.note_latency(value_ms);
        }
    }

    /// Unregister and stop the session for `key`. `false` if none was registered.
    pub fn stop(&self, key: impl Into<SessionKey>) -> bool {
        let key = key.into();
        let removed = {
            let mut registry = lock(&self.registry);
            let removed = registry.live.remove(&key);
            if removed.is_some() {
                registry.stopping.insert(key.clone());
            }
            removed
        };
        let Some(session) = removed else {
            return false;
        };
        session.stop();
        lock(&self.registry).stopping.remove(&key);
        self.stopped.notify_all();
        true
    }

    /// Stop every registered session; returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let keys: Vec<SessionKey> = lock(&self.registry).live.keys().cloned().collect();
        keys.into_iter().filter(|key| self.stop(key.clone())).count()
    }

    pub fn get(&self, key: impl Into<SessionKey>) -> Option<Arc<Session>> {
        lock(&self.registry).live.get(&key.into()).cloned()
    }

    /// Registered keys, sorted.
    pub fn active_keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = lock(&self.registry).live.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        let stopped = self.stop_all();
        if stopped > 0 {
            log::info!("stopped {stopped} session(s) on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::tests::mock_probes;
    use std::time::Duration;

    fn manager(dir: &std::path::Path) -> Manager {
        let config = MetricsConfig::new(dir)
            .with_interval(Duration::from_millis(20))
            .with_accelerator(false);
        Manager::with_probe_factory(config, Arc::new(|_: &MetricsConfig| mock_probes(0)))
    }

    #[test]
    fn ensure_active_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let a = m.ensure_active(("p1", 1));
        let b = m.ensure_active(("p1", 1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(m.len(), 1);
        assert!(a.is_running());
    }

    #[test]
    fn stop_removes_then_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let s = m.ensure_active(("p1", 1));
        assert!(m.stop(("p1", 1)));
        assert!(!s.is_running());
        assert!(m.is_empty());
        assert!(!m.stop(("p1", 1)));
        assert!(!m.stop(("nobody", 9)));
    }

    #[test]
    fn fresh_session_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let first = m.ensure_active(("p1", 1));
        m.stop(("p1", 1));
        let second = m.ensure_active(("p1", 1));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.id(), second.id());
        assert!(second.is_running());
    }

    #[test]
    fn stop_all_clears_registry() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.ensure_active(("p1", 1));
        m.ensure_active(("p2", 1));
        m.ensure_active(("p1", 2));
        assert_eq!(
            m.active_keys(),
            vec![
                SessionKey::new("p1", 1),
                SessionKey::new("p1", 2),
                SessionKey::new("p2", 1),
            ]
        );
        assert_eq!(m.stop_all(), 3);
        assert!(m.is_empty());
    }

    #[test]
    fn latency_for_unknown_key_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.note_latency(("ghost", 1), 10.0);
        assert!(m.get(("ghost", 1)).is_none());
    }
}
