//! # Session Registry
//!
//! Maps an owner (a guild, a room, a user) to its live [`SessionHandle`].
//! One session per owner: inserting over a live session is refused, while a
//! closed one is replaced. The map is behind a `parking_lot::Mutex`, each
//! operation takes the lock once, and nothing iterates the map without
//! holding it.

use crate::error::{PlaybackError, Result};
use crate::session::SessionHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use tracing::debug;

/// Owner → session registry.
pub struct SessionRegistry<K> {
    sessions: Mutex<HashMap<K, SessionHandle>>,
}

impl<K> Default for SessionRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> SessionRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handle` for `owner` unless the owner has a live session.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::SessionExists`] if a session for `owner` is
    /// still accepting commands.
    pub fn insert_if_absent(&self, owner: K, handle: SessionHandle) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&owner) {
            if !existing.is_closed() {
                return Err(PlaybackError::SessionExists(format!("{:?}", owner)));
            }
        }
        debug!(owner = ?owner, session = handle.id(), "Session registered");
        sessions.insert(owner, handle);
        Ok(())
    }

    /// The owner's session, if it is still live.
    pub fn get(&self, owner: &K) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(owner)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    pub fn remove(&self, owner: &K) -> Option<SessionHandle> {
        self.sessions.lock().remove(owner)
    }

    /// Drop every closed session, returning how many were removed.
    pub fn prune_closed(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());
        before - sessions.len()
    }

    /// Owners with a registered session, live or not.
    pub fn owners(&self) -> Vec<K> {
        self.sessions.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl<K> fmt::Debug for SessionRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}
