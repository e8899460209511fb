//! Registry of active sessions keyed by info hash

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::SwarmSession;
use crate::engine::InfoHash;

/// Outcome of publishing a session.
pub enum Insertion {
    /// The session is now registered
    Inserted(Arc<SwarmSession>),
    /// Another session with the same id was already registered; it is returned
    /// and the offered session was not stored
    Existing(Arc<SwarmSession>),
}

/// Active sessions, shared by the API and streaming servers.
///
/// Guards are only held for map operations, never across an await.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<InfoHash, Arc<SwarmSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &InfoHash) -> Option<Arc<SwarmSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &InfoHash) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Publishes a session unless its id is already taken. First writer wins.
    pub fn insert_if_absent(&self, session: SwarmSession) -> Insertion {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(&session.id()) {
            return Insertion::Existing(existing.clone());
        }
        let session = Arc::new(session);
        sessions.insert(session.id(), session.clone());
        Insertion::Inserted(session)
    }

    pub fn remove(&self, id: &InfoHash) -> Option<Arc<SwarmSession>> {
        self.sessions.write().remove(id)
    }

    /// Snapshot of every registered session.
    pub fn list(&self) -> Vec<Arc<SwarmSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Removes and returns every session.
    pub fn drain(&self) -> Vec<Arc<SwarmSession>> {
        self.sessions.write().drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
