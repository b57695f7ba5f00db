//! # Session registry
//!
//! Hosts serving several users concurrently keep one [`Session`] per user id in a
//! [`SessionRegistry`]. Each session sits behind its own `Mutex`, so writes to the
//! working sets, staging and derived collection of one session are serialized while
//! different sessions never contend with each other beyond the short registry lookup.
//!
//! A panic while a session lock is held poisons that session; further access to it
//! returns [`ApZeroError::SessionPoisoned`] instead of panicking in turn.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;

use crate::{apzero_errors::ApZeroError, calibration::CalibrationParams, session::Session};

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    params: CalibrationParams,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose new sessions use `params`.
    pub fn with_params(params: CalibrationParams) -> Self {
        SessionRegistry {
            params,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The session of `id`, created empty on first access.
    pub fn session(&self, id: &str) -> Result<SharedSession, ApZeroError> {
        let mut sessions = lock(&self.sessions, "registry")?;
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!("new session {id}");
            Arc::new(Mutex::new(Session::with_params(self.params.clone())))
        });
        Ok(Arc::clone(session))
    }

    /// The session of `id`, if it exists.
    pub fn get(&self, id: &str) -> Result<Option<SharedSession>, ApZeroError> {
        Ok(lock(&self.sessions, "registry")?.get(id).cloned())
    }

    /// Run `f` with exclusive access to the session of `id`, creating it if needed.
    ///
    /// Arguments
    /// -----------------
    /// * `id`: session identifier.
    /// * `f`: the operation, typically one [`Session`] call.
    ///
    /// Return
    /// ----------
    /// * What `f` returned, or [`ApZeroError::SessionPoisoned`].
    pub fn with_session<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, ApZeroError> {
        let shared = self.session(id)?;
        let mut session = lock(&shared, id)?;
        Ok(f(&mut session))
    }

    /// Drop the session of `id`.
    ///
    /// Return
    /// ----------
    /// * `true` if it existed.
    pub fn remove(&self, id: &str) -> Result<bool, ApZeroError> {
        Ok(lock(&self.sessions, "registry")?.remove(id).is_some())
    }

    pub fn len(&self) -> Result<usize, ApZeroError> {
        Ok(lock(&self.sessions, "registry")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ApZeroError> {
        Ok(self.len()? == 0)
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ApZeroError> {
    mutex
        .lock()
        .map_err(|_| ApZeroError::SessionPoisoned(what.to_string()))
}

#[cfg(test)]
mod registry_test {
    use super::*;
    use std::thread;

    #[test]
    fn test_sessions_are_independent() {
        let registry = SessionRegistry::new();
        registry
            .with_session("alice", |s| s.clear_derived())
            .unwrap();
        let alice = registry.session("alice").unwrap();
        let bob = registry.session("bob").unwrap();
        assert!(!Arc::ptr_eq(&alice, &bob));
        assert!(Arc::ptr_eq(&alice, &registry.session("alice").unwrap()));
        assert_eq!(registry.len().unwrap(), 2);

        assert!(registry.remove("bob").unwrap());
        assert!(registry.get("bob").unwrap().is_none());
    }

    #[test]
    fn test_poisoned_session() {
        let registry = SessionRegistry::new();
        let shared = registry.session("carol").unwrap();

        let handle = thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("boom");
        });
        assert!(handle.join().is_err());

        let err = registry.with_session("carol", |_| ()).unwrap_err();
        assert!(matches!(err, ApZeroError::SessionPoisoned(_)));
        // other sessions still work
        assert!(registry.with_session("dave", |_| ()).is_ok());
    }
}
