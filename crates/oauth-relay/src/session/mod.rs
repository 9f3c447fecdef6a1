//! Session storage.
//!
//! A [`Session`] is a named string map bound to one user agent. The bridge
//! keeps one entry per provider name, holding that provider's compressed
//! session. [`SessionStore`] abstracts where sessions live:
//!
//! - [`CookieStore`] - the whole session, encrypted, in a cookie
//! - [`FilesystemStore`] - session files on disk, id in an encrypted cookie
//! - [`MemoryStore`] - process memory, id in an encrypted cookie
//!
//! Stores never write to a response directly; they record cookies on an
//! [`AuthResponse`] which the handler returns.

pub mod cookie;
pub mod filesystem;
pub mod memory;

use std::collections::HashMap;

use ::cookie::{Cookie, CookieJar, Key, SameSite};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::request::{AuthRequest, AuthResponse};

pub use self::cookie::CookieStore;
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// Default session lifetime: 30 days.
pub const DEFAULT_MAX_AGE: i64 = 86_400 * 30;

/// Longest session lifetime accepted: 400 days, the cap browsers apply to
/// cookie expiry.
pub const MAX_MAX_AGE: i64 = 86_400 * 400;

/// Cookie attributes applied when a session is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Cookie path.
    pub path: String,
    /// Cookie domain; host-only when `None`.
    pub domain: Option<String>,
    /// Lifetime in seconds. `0` makes a browser-session cookie, a negative
    /// value deletes the session on save.
    pub max_age: i64,
    /// Send the cookie over HTTPS only.
    pub secure: bool,
    /// Hide the cookie from scripts.
    pub http_only: bool,
    /// Cross-site policy.
    pub same_site: SameSite,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// A named key-value session bound to the current user agent.
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    id: Option<String>,
    values: HashMap<String, String>,
    options: SessionOptions,
    is_new: bool,
}

impl Session {
    /// Creates an empty session that has never been saved.
    #[must_use]
    pub fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            name: name.into(),
            id: None,
            values: HashMap::new(),
            options,
            is_new: true,
        }
    }

    /// Rebuilds a session loaded from a store.
    #[must_use]
    pub fn restored(
        name: impl Into<String>,
        id: Option<String>,
        values: HashMap<String, String>,
        options: SessionOptions,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            values,
            options,
            is_new: false,
        }
    }

    /// Session (cookie) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side identifier, assigned by stores that keep data off the
    /// client.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Stores a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// All stored values.
    #[must_use]
    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cookie attributes used on save.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Mutable cookie attributes.
    pub fn options_mut(&mut self) -> &mut SessionOptions {
        &mut self.options
    }

    /// Returns `true` if the session was created rather than loaded.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Clears all values and marks the session for immediate expiry.
    pub fn invalidate(&mut self) {
        self.values.clear();
        self.options.max_age = -1;
    }

    /// Returns `true` once the session has been marked for expiry.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.options.max_age < 0
    }
}

/// Backend that loads and persists sessions for a request.
///
/// Writes to a single session identity must be atomic in the backend; the
/// bridge does not coordinate concurrent requests.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Default cookie attributes for sessions created by this store.
    fn options(&self) -> &SessionOptions;

    /// Loads the named session for the request. Never creates one.
    ///
    /// A missing, expired or tampered session is `Ok(None)`.
    async fn get(&self, req: &AuthRequest, name: &str) -> AuthResult<Option<Session>>;

    /// Loads the named session, or returns a fresh one if there is none.
    async fn get_or_create(&self, req: &AuthRequest, name: &str) -> AuthResult<Session> {
        match self.get(req, name).await? {
            Some(session) => Ok(session),
            None => Ok(Session::new(name, self.options().clone())),
        }
    }

    /// Persists the session and records the cookie to send back.
    async fn save(
        &self,
        req: &AuthRequest,
        resp: &mut AuthResponse,
        session: &mut Session,
    ) -> AuthResult<()>;

    /// Clears the session, marks it expired and saves it.
    async fn invalidate(
        &self,
        req: &AuthRequest,
        resp: &mut AuthResponse,
        session: &mut Session,
    ) -> AuthResult<()> {
        session.invalidate();
        self.save(req, resp, session).await
    }
}

/// Server-side session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub values: HashMap<String, String>,
    /// Unix timestamp after which the record is stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl StoredRecord {
    pub fn from_session(session: &Session) -> AuthResult<Self> {
        let expires_at = if session.options.max_age > 0 {
            let at = OffsetDateTime::now_utc()
                .unix_timestamp()
                .checked_add(session.options.max_age)
                .ok_or_else(|| out_of_range(session.options.max_age))?;
            Some(at)
        } else {
            None
        };

        Ok(Self {
            values: session.values.clone(),
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= OffsetDateTime::now_utc().unix_timestamp())
    }
}

/// Derives a cookie encryption key from a secret of any length.
pub(crate) fn derive_key(secret: &[u8]) -> Key {
    Key::from(Sha512::digest(secret).as_slice())
}

/// Generates a random cookie encryption key.
pub(crate) fn random_key() -> Key {
    let mut bytes = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Key::from(&bytes[..])
}

/// Generates a random server-side session id (256 bits, base64url).
pub(crate) fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Returns `true` if `id` could have come from [`generate_session_id`].
pub(crate) fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Reads and decrypts the cookie `name` from the request headers.
pub(crate) fn read_private_cookie(headers: &HeaderMap, name: &str, key: &Key) -> Option<String> {
    let mut jar = CookieJar::new();
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(raw.to_string()).flatten() {
            jar.add_original(cookie);
        }
    }

    jar.private(key).get(name).map(|c| c.value().to_string())
}

/// Builds the encrypted cookie carrying `value` for a session.
pub(crate) fn sealed_cookie(
    name: &str,
    value: String,
    options: &SessionOptions,
    key: &Key,
) -> AuthResult<Cookie<'static>> {
    let mut cookie = base_cookie(name, value, options);
    if options.max_age > 0 {
        let max_age = time::Duration::seconds(options.max_age);
        let expires = OffsetDateTime::now_utc()
            .checked_add(max_age)
            .ok_or_else(|| out_of_range(options.max_age))?;
        cookie.set_max_age(max_age);
        cookie.set_expires(expires);
    }

    let mut jar = CookieJar::new();
    jar.private_mut(key).add(cookie);
    jar.get(name)
        .cloned()
        .ok_or_else(|| AuthError::store(format!("failed to encrypt cookie {name}")))
}

fn out_of_range(max_age: i64) -> AuthError {
    AuthError::store(format!("session max_age {max_age}s is out of range"))
}

/// Builds a cookie that deletes the session cookie in the browser.
pub(crate) fn removal_cookie(name: &str, options: &SessionOptions) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new(), options);
    cookie.make_removal();
    cookie
}

fn base_cookie(name: &str, value: String, options: &SessionOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value))
        .path(options.path.clone())
        .secure(options.secure)
        .http_only(options.http_only)
        .same_site(options.same_site);
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}
