use crate::session::Session;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    by_session: HashMap<String, Arc<Session>>,
    by_user: HashMap<u64, Arc<Session>>,
}

/// Both maps live under one mutex; no lock is held across I/O.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Records a freshly accepted session under its session id.
    pub fn insert(&self, session: Arc<Session>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .by_session
            .insert(session.session_id().to_string(), session);
    }

    /// Last writer wins; returns the displaced session so the caller can
    /// kick it.
    pub fn bind_user(&self, uid: u64, session: Arc<Session>) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_user.insert(uid, session)
    }

    pub fn lookup_user(&self, uid: u64) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        inner.by_user.get(&uid).cloned()
    }

    pub fn lookup_session(&self, session_id: &str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        inner.by_session.get(session_id).cloned()
    }

    /// Removes the session from both maps and closes it. The user binding
    /// is only removed while it still points at this session, so evicting
    /// a kicked session never drops the binding of its successor. Returns
    /// true for the caller that actually removed the session; follow-up
    /// cleanup belongs to that caller alone.
    pub fn evict(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let uid = session.user_id();
            if uid != 0 {
                let same = inner
                    .by_user
                    .get(&uid)
                    .map(|s| s.session_id() == session.session_id())
                    .unwrap_or(false);
                if same {
                    inner.by_user.remove(&uid);
                }
            }
            inner.by_session.remove(session.session_id()).is_some()
        };
        session.close();
        removed
    }

    pub fn live_sessions(&self) -> usize {
        self.inner.lock().unwrap().by_session.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> Arc<Session> {
        Session::new(8).0
    }

    #[test]
    pub fn test_insert_lookup_evict() {
        let registry = SessionRegistry::new();
        let s = session();
        registry.insert(s.clone());
        assert!(registry.lookup_session(s.session_id()).is_some());
        assert!(registry.evict(&s));
        assert!(registry.lookup_session(s.session_id()).is_none());
        assert!(s.is_closed());
        // second eviction is a no-op
        assert!(!registry.evict(&s));
    }

    #[test]
    pub fn test_last_binding_wins() {
        let registry = SessionRegistry::new();
        let first = session();
        let second = session();
        registry.insert(first.clone());
        registry.insert(second.clone());
        first.bind_uid(42);
        second.bind_uid(42);

        assert!(registry.bind_user(42, first.clone()).is_none());
        let displaced = registry.bind_user(42, second.clone()).unwrap();
        assert_eq!(displaced.session_id(), first.session_id());

        // evicting the displaced session must not remove the new binding
        assert!(registry.evict(&first));
        let bound = registry.lookup_user(42).unwrap();
        assert_eq!(bound.session_id(), second.session_id());

        // evicting the owner removes the binding
        assert!(registry.evict(&second));
        assert!(registry.lookup_user(42).is_none());
    }
}
