//! Registry of live tag sessions.
//!
//! Maps driver-assigned handles to sessions. One lock guards the map and is
//! held for bookkeeping only; anything that can block (disconnects) happens
//! outside it.

use crate::session::TagSession;
use nearfield_core::TagHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Thread-safe handle → session map.
#[derive(Debug, Default)]
pub struct TagRegistry {
    sessions: Mutex<HashMap<TagHandle, Arc<TagSession>>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its own handle.
    ///
    /// Handles are driver-assigned and unique while a session is live, so a
    /// collision cannot happen in a correct driver; if it does, the newer
    /// session wins.
    pub fn register(&self, session: Arc<TagSession>) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.handle(), session);
    }

    /// Look a session up by handle.
    ///
    /// A miss is logged for diagnostics but is not an error: stale handles
    /// from callers are expected after a tag leaves.
    pub fn find(&self, handle: TagHandle) -> Option<Arc<TagSession>> {
        let sessions = self.sessions.lock().unwrap();
        let found = sessions.get(&handle).cloned();
        if found.is_none() {
            warn!(%handle, "handle not found");
        }
        found
    }

    /// Remove a session; no-op when the handle is absent.
    pub fn unregister(&self, handle: TagHandle) -> Option<Arc<TagSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(&handle)
    }

    /// Drop all entries without disconnecting them.
    ///
    /// Used when the adapter comes up: sessions from a previous power cycle
    /// are stale and have nothing left to disconnect.
    pub fn clear(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.clear();
    }

    /// Atomically drain the registry, then disconnect every session.
    ///
    /// The snapshot-then-disconnect split keeps the lock from being held
    /// across the potentially blocking disconnect calls and keeps the map
    /// from being mutated while iterating it.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<Arc<TagSession>> = {
            let mut map = self.sessions.lock().unwrap();
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            debug!(handle = %session.handle(), "disconnecting");
            session.disconnect().await;
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use nearfield_core::TagTechnology;
    use nearfield_driver::{AnyRadioDriver, MockRadio, TargetInfo};
    use tokio::sync::mpsc;

    fn make_session(handle: u32) -> Arc<TagSession> {
        let (radio, _mock) = MockRadio::new();
        let (lost_tx, _lost_rx) = mpsc::unbounded_channel();
        let target = TargetInfo::new(vec![0x01, handle as u8], TagTechnology::NfcA, vec![]).unwrap();
        TagSession::new(
            TagHandle::new(handle),
            target,
            Arc::new(AnyRadioDriver::Mock(radio)),
            lost_tx,
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_register_find_unregister() {
        let registry = TagRegistry::new();
        let session = make_session(7);

        registry.register(Arc::clone(&session));
        let found = registry.find(TagHandle::new(7)).unwrap();
        assert_eq!(found.handle(), session.handle());

        registry.unregister(TagHandle::new(7));
        assert!(registry.find(TagHandle::new(7)).is_none());
        // Unregistering again is a no-op.
        assert!(registry.unregister(TagHandle::new(7)).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_all_drains_and_disconnects() {
        let registry = TagRegistry::new();
        let first = make_session(1);
        let second = make_session(2);
        first.start_presence_check();
        second.start_presence_check();
        registry.register(Arc::clone(&first));
        registry.register(Arc::clone(&second));
        assert_eq!(registry.len(), 2);

        registry.disconnect_all().await;

        assert!(registry.is_empty());
        assert!(!first.is_present());
        assert!(!second.is_present());
    }

    #[tokio::test]
    async fn test_clear_does_not_disconnect() {
        let registry = TagRegistry::new();
        let session = make_session(1);
        session.start_presence_check();
        registry.register(Arc::clone(&session));

        registry.clear();
        assert!(registry.is_empty());
        // clear is bookkeeping only; the session itself was not torn down.
        assert!(session.is_present());
        session.disconnect().await;
    }
}
