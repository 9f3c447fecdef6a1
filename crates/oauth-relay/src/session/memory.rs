//! In-process sessions.
//!
//! Intended for tests and single-instance deployments. Sessions are lost
//! on restart and are not shared between processes.

use std::sync::Arc;

use ::cookie::Key;
use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    Session, SessionOptions, SessionStore, StoredRecord, generate_session_id,
    read_private_cookie, removal_cookie, sealed_cookie,
};
use crate::AuthResult;
use crate::request::{AuthRequest, AuthResponse};

/// Session store backed by a concurrent map.
///
/// Clones share the same sessions.
#[derive(Clone)]
pub struct MemoryStore {
    sessions: Arc<DashMap<String, StoredRecord>>,
    key: Key,
    options: SessionOptions,
}

impl MemoryStore {
    /// Creates an empty store with a random cookie key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            key: super::random_key(),
            options: SessionOptions::default(),
        }
    }

    /// Sets the cookie attributes for new sessions.
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops expired sessions, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired());
        before - self.sessions.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn get(&self, req: &AuthRequest, name: &str) -> AuthResult<Option<Session>> {
        let Some(id) = read_private_cookie(req.headers(), name, &self.key) else {
            return Ok(None);
        };

        let record = self.sessions.get(&id).map(|entry| entry.value().clone());
        match record {
            Some(record) if record.is_expired() => {
                self.sessions.remove(&id);
                Ok(None)
            }
            Some(record) => Ok(Some(Session::restored(
                name,
                Some(id),
                record.values,
                self.options.clone(),
            ))),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        _req: &AuthRequest,
        resp: &mut AuthResponse,
        session: &mut Session,
    ) -> AuthResult<()> {
        if session.is_invalidated() {
            if let Some(id) = session.id() {
                self.sessions.remove(id);
            }
            resp.set_cookie(removal_cookie(session.name(), session.options()));
            return Ok(());
        }

        let id = match session.id() {
            Some(id) => id.to_string(),
            None => {
                let id = generate_session_id();
                session.set_id(id.clone());
                id
            }
        };

        self.sessions
            .insert(id.clone(), StoredRecord::from_session(session)?);
        resp.set_cookie(sealed_cookie(session.name(), id, session.options(), &self.key)?);
        Ok(())
    }
}
