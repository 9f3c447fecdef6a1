//! Login flow orchestration.
//!
//! [`AuthBridge`] drives the two halves of a browser login:
//!
//! - [`begin_auth`](AuthBridge::begin_auth) resolves the provider, starts a
//!   provider session bound to a state token, stores it compressed in the
//!   user's session and returns the authorization URL to redirect to.
//! - [`complete_auth`](AuthBridge::complete_auth) restores that provider
//!   session on the callback, checks the state token, exchanges the code
//!   if needed and returns the user's profile. The stored session is
//!   always cleared afterwards so a callback cannot be replayed.
//!
//! A bridge owns its store, provider registry and resolver. Bridges are
//! cheap to clone and independent of each other.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::AuthResult;
use crate::codec;
use crate::config::{BridgeConfig, DEFAULT_SESSION_NAME};
use crate::error::{AuthError, ConfigError};
use crate::provider::{AuthorizationState, Provider, ProviderRegistry, ProviderSession, UserProfile};
use crate::request::{AuthRequest, AuthResponse};
use crate::resolver::ProviderResolver;
use crate::scope::{CallerContext, guarded};
use crate::session::SessionStore;
use crate::state::{generate_state, validate_state};

/// Produces the state token for a new authorization attempt.
pub type StateGenerator = Arc<dyn Fn(&AuthRequest) -> String + Send + Sync>;

/// Session-state bridge for browser OAuth logins.
#[derive(Clone)]
pub struct AuthBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    session_name: String,
    store: Option<Arc<dyn SessionStore>>,
    registry: Arc<ProviderRegistry>,
    resolver: ProviderResolver,
    state_generator: StateGenerator,
    warned_unconfigured: AtomicBool,
}

impl AuthBridge {
    /// Starts building a bridge.
    #[must_use]
    pub fn builder() -> AuthBridgeBuilder {
        AuthBridgeBuilder::default()
    }

    /// Builds a bridge from configuration.
    ///
    /// A configuration without a secret yields a bridge that answers every
    /// operation with [`AuthError::NotConfigured`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(
        config: &BridgeConfig,
        registry: Arc<ProviderRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = Self::builder()
            .session_name(config.session_name.clone())
            .registry(registry);
        if let Some(store) = config.build_store()? {
            builder = builder.store(store);
        }
        Ok(builder.build())
    }

    /// The provider registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// Name of the session holding provider state.
    #[must_use]
    pub fn session_name(&self) -> &str {
        &self.inner.session_name
    }

    /// Returns `true` if a session store is available.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.store.is_some()
    }

    fn store(&self) -> AuthResult<&dyn SessionStore> {
        match &self.inner.store {
            Some(store) => Ok(store.as_ref()),
            None => {
                if !self.inner.warned_unconfigured.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "No session store is configured; set SESSION_SECRET or configure a store. \
                         All login operations will fail"
                    );
                }
                Err(AuthError::NotConfigured)
            }
        }
    }

    /// Resolves the provider name for a request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderRequired`] if no provider can be found.
    pub async fn resolve_provider_name(&self, req: &AuthRequest) -> AuthResult<String> {
        self.inner
            .resolver
            .resolve(
                req,
                self.inner.store.as_deref(),
                &self.inner.session_name,
                &self.inner.registry,
            )
            .await
    }

    /// Starts a login and returns the authorization URL to redirect to.
    ///
    /// # Errors
    ///
    /// Propagates resolver, provider and store failures unchanged.
    pub async fn begin_auth(
        &self,
        req: &AuthRequest,
        resp: &mut AuthResponse,
    ) -> AuthResult<String> {
        let store = self.store()?;
        let name = self.resolve_provider_name(req).await?;
        let provider = self.inner.registry.get(&name).await?;

        let state = (self.inner.state_generator)(req);
        let ctx = req.extensions().get::<CallerContext>();
        let session = guarded(ctx, async {
            provider.begin_auth(&state).await.map_err(AuthError::from)
        })
        .await?;

        let auth_url = session.auth_url()?;
        store_value(store, &self.inner.session_name, &name, &session.marshal(), req, resp).await?;

        tracing::debug!(provider = %name, "Started authentication");
        Ok(auth_url)
    }

    /// Finishes a login on the provider's callback and returns the user.
    ///
    /// Once the stored provider session has been found, the user's session
    /// is cleared whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionNotFound`] if no login was started for the
    ///   provider; the provider is not contacted
    /// - [`AuthError::StateTokenMismatch`] if the callback's state differs
    /// - provider and store failures, unchanged
    pub async fn complete_auth(
        &self,
        req: &AuthRequest,
        resp: &mut AuthResponse,
    ) -> AuthResult<UserProfile> {
        let store = self.store()?;
        let name = self.resolve_provider_name(req).await?;
        let provider = self.inner.registry.get(&name).await?;
        let value = load_value(store, &self.inner.session_name, &name, req).await?;

        let result = self
            .finish_auth(store, provider.as_ref(), &name, &value, req, resp)
            .await;

        if let Err(e) = self.logout(req, resp).await {
            tracing::warn!(provider = %name, error = %e, "Failed to clear session after callback");
        }

        match &result {
            Ok(user) => {
                tracing::info!(provider = %name, user_id = %user.user_id, "Completed authentication");
            }
            Err(e) => {
                tracing::debug!(provider = %name, error = %e, "Authentication failed");
            }
        }
        result
    }

    async fn finish_auth(
        &self,
        store: &dyn SessionStore,
        provider: &dyn Provider,
        name: &str,
        value: &str,
        req: &AuthRequest,
        resp: &mut AuthResponse,
    ) -> AuthResult<UserProfile> {
        let mut session = provider.unmarshal_session(value)?;
        validate_state(req, session.as_ref())?;

        let ctx = req.extensions().get::<CallerContext>();
        match session.authorization_state() {
            AuthorizationState::Authorized => {
                return fetch_user(ctx, provider, session.as_ref()).await;
            }
            AuthorizationState::Unknown => match fetch_user(ctx, provider, session.as_ref()).await
            {
                Ok(user) => return Ok(user),
                Err(e @ (AuthError::Canceled | AuthError::Timeout)) => return Err(e),
                Err(e) => {
                    tracing::debug!(provider = %name, error = %e, "Session not yet authorized, exchanging code");
                }
            },
            AuthorizationState::Pending => {}
        }

        let params = req.callback_params();
        guarded(ctx, async {
            session
                .authorize(provider, &params)
                .await
                .map_err(AuthError::from)
        })
        .await?;

        store_value(store, &self.inner.session_name, name, &session.marshal(), req, resp).await?;
        fetch_user(ctx, provider, session.as_ref()).await
    }

    /// Clears the user's session and expires its cookie.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::LogoutFailed`] if the cleared session cannot be
    /// saved.
    pub async fn logout(&self, req: &AuthRequest, resp: &mut AuthResponse) -> AuthResult<()> {
        let store = self.store()?;
        let mut session = store.get_or_create(req, &self.inner.session_name).await?;
        store
            .invalidate(req, resp, &mut session)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Session invalidation failed");
                AuthError::LogoutFailed
            })?;

        tracing::info!(session = %self.inner.session_name, "Cleared user session");
        Ok(())
    }

    /// Compresses `value` and stores it under `key` in the user's session,
    /// creating the session if needed.
    ///
    /// # Errors
    ///
    /// Returns a store error if the session cannot be loaded or saved.
    pub async fn store_in_session(
        &self,
        key: &str,
        value: &str,
        req: &AuthRequest,
        resp: &mut AuthResponse,
    ) -> AuthResult<()> {
        let store = self.store()?;
        store_value(store, &self.inner.session_name, key, value, req, resp).await
    }

    /// Reads and decompresses the value stored under `key`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionNotFound`] if there is no session or no value
    /// - [`AuthError::CorruptPayload`] if the value does not decompress
    pub async fn get_from_session(&self, key: &str, req: &AuthRequest) -> AuthResult<String> {
        let store = self.store()?;
        load_value(store, &self.inner.session_name, key, req).await
    }
}

impl fmt::Debug for AuthBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBridge")
            .field("session_name", &self.inner.session_name)
            .field("configured", &self.is_configured())
            .field("resolver", &self.inner.resolver)
            .finish_non_exhaustive()
    }
}

async fn store_value(
    store: &dyn SessionStore,
    session_name: &str,
    key: &str,
    value: &str,
    req: &AuthRequest,
    resp: &mut AuthResponse,
) -> AuthResult<()> {
    let mut session = store.get_or_create(req, session_name).await?;
    session.insert(key, codec::encode_session_value(value)?);
    store.save(req, resp, &mut session).await
}

async fn load_value(
    store: &dyn SessionStore,
    session_name: &str,
    key: &str,
    req: &AuthRequest,
) -> AuthResult<String> {
    let session = store
        .get(req, session_name)
        .await?
        .ok_or(AuthError::SessionNotFound)?;
    let stored = session.get(key).ok_or(AuthError::SessionNotFound)?;
    codec::decode_session_value(stored)
}

async fn fetch_user(
    ctx: Option<&CallerContext>,
    provider: &dyn Provider,
    session: &dyn ProviderSession,
) -> AuthResult<UserProfile> {
    guarded(ctx, async {
        provider.fetch_user(session).await.map_err(AuthError::from)
    })
    .await
}

/// Builder for [`AuthBridge`].
pub struct AuthBridgeBuilder {
    session_name: String,
    store: Option<Arc<dyn SessionStore>>,
    registry: Option<Arc<ProviderRegistry>>,
    resolver: ProviderResolver,
    state_generator: StateGenerator,
}

impl Default for AuthBridgeBuilder {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            store: None,
            registry: None,
            resolver: ProviderResolver::new(),
            state_generator: Arc::new(generate_state),
        }
    }
}

impl AuthBridgeBuilder {
    /// Sets the session name.
    #[must_use]
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// Sets the session store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the provider registry. Defaults to an empty registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the provider resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: ProviderResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces state token generation.
    #[must_use]
    pub fn state_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&AuthRequest) -> String + Send + Sync + 'static,
    {
        self.state_generator = Arc::new(generator);
        self
    }

    /// Builds the bridge.
    #[must_use]
    pub fn build(self) -> AuthBridge {
        AuthBridge {
            inner: Arc::new(BridgeInner {
                session_name: self.session_name,
                store: self.store,
                registry: self.registry.unwrap_or_default(),
                resolver: self.resolver,
                state_generator: self.state_generator,
                warned_unconfigured: AtomicBool::new(false),
            }),
        }
    }
}
