//! Client-side sessions.
//!
//! The session values are serialized to JSON and carried in a single
//! encrypted cookie. Nothing is kept on the server.

use std::collections::HashMap;

use ::cookie::Key;
use async_trait::async_trait;

use super::{
    Session, SessionOptions, SessionStore, read_private_cookie, removal_cookie, sealed_cookie,
};
use crate::AuthResult;
use crate::error::AuthError;
use crate::request::{AuthRequest, AuthResponse};

/// Largest `Set-Cookie` value browsers are required to accept.
pub const MAX_COOKIE_BYTES: usize = 4096;

/// Session store keeping everything in an encrypted cookie.
pub struct CookieStore {
    key: Key,
    options: SessionOptions,
}

impl CookieStore {
    /// Creates a store whose cookies are encrypted with a key derived from
    /// `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: super::derive_key(secret),
            options: SessionOptions::default(),
        }
    }

    /// Sets the cookie attributes for new sessions.
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl SessionStore for CookieStore {
    fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn get(&self, req: &AuthRequest, name: &str) -> AuthResult<Option<Session>> {
        let Some(raw) = read_private_cookie(req.headers(), name, &self.key) else {
            return Ok(None);
        };

        match serde_json::from_str::<HashMap<String, String>>(&raw) {
            Ok(values) => Ok(Some(Session::restored(
                name,
                None,
                values,
                self.options.clone(),
            ))),
            Err(e) => {
                tracing::debug!(session = name, error = %e, "Ignoring unreadable session cookie");
                Ok(None)
            }
        }
    }

    async fn save(
        &self,
        _req: &AuthRequest,
        resp: &mut AuthResponse,
        session: &mut Session,
    ) -> AuthResult<()> {
        if session.is_invalidated() {
            resp.set_cookie(removal_cookie(session.name(), session.options()));
            return Ok(());
        }

        let payload = serde_json::to_string(session.values())
            .map_err(|e| AuthError::store(format!("failed to serialize session: {e}")))?;
        let cookie = sealed_cookie(session.name(), payload, session.options(), &self.key)?;

        let size = cookie.to_string().len();
        if size > MAX_COOKIE_BYTES {
            return Err(AuthError::store(format!(
                "session cookie is {size} bytes, larger than the {MAX_COOKIE_BYTES} byte limit"
            )));
        }

        resp.set_cookie(cookie);
        Ok(())
    }
}
