//! Provider name resolution.
//!
//! Applications pass the provider through different routing and middleware
//! stacks, so the name is looked up by an ordered chain of
//! [`ProviderLookup`]s. The first non-empty match wins. When the chain
//! finds nothing, the resolver scans the user's session for a provider
//! that already has a flow in progress.
//!
//! Default chain:
//!
//! 1. query parameter `provider`
//! 2. query parameter `:provider`
//! 3. router path parameter `provider`
//! 4. `"provider"` in the request's [`ContextValues`]
//! 5. `provider` in [`RouteParams`] set by another routing layer
//! 6. the typed [`ProviderName`] extension
//! 7. session scan over registered providers, in registration order

use std::fmt;

use crate::AuthResult;
use crate::error::AuthError;
use crate::provider::ProviderRegistry;
use crate::request::{AuthRequest, ContextValues, ProviderName, RouteParams};
use crate::session::SessionStore;

/// Key under which every builtin lookup searches.
pub const PROVIDER_KEY: &str = "provider";

/// One strategy for reading the provider name from a request.
///
/// Closures `Fn(&AuthRequest) -> Option<String>` implement this trait.
pub trait ProviderLookup: Send + Sync {
    /// Returns the provider name, or `None` to fall through to the next
    /// lookup.
    fn lookup(&self, req: &AuthRequest) -> Option<String>;
}

impl<F> ProviderLookup for F
where
    F: Fn(&AuthRequest) -> Option<String> + Send + Sync,
{
    fn lookup(&self, req: &AuthRequest) -> Option<String> {
        self(req)
    }
}

/// Reads a query parameter.
#[derive(Debug, Clone, Copy)]
pub struct QueryParam(pub &'static str);

impl ProviderLookup for QueryParam {
    fn lookup(&self, req: &AuthRequest) -> Option<String> {
        req.query_value(self.0)
    }
}

/// Reads a path parameter extracted by the axum router.
#[derive(Debug, Clone, Copy)]
pub struct PathParam(pub &'static str);

impl ProviderLookup for PathParam {
    fn lookup(&self, req: &AuthRequest) -> Option<String> {
        req.path_param(self.0).map(str::to_string)
    }
}

/// Reads a key from the [`ContextValues`] extension.
#[derive(Debug, Clone, Copy)]
pub struct ContextValue(pub &'static str);

impl ProviderLookup for ContextValue {
    fn lookup(&self, req: &AuthRequest) -> Option<String> {
        req.extensions()
            .get::<ContextValues>()
            .and_then(|values| values.get(self.0))
            .map(str::to_string)
    }
}

/// Reads a parameter from the [`RouteParams`] extension.
#[derive(Debug, Clone, Copy)]
pub struct RouteParam(pub &'static str);

impl ProviderLookup for RouteParam {
    fn lookup(&self, req: &AuthRequest) -> Option<String> {
        req.extensions()
            .get::<RouteParams>()
            .and_then(|params| params.get(self.0))
            .map(str::to_string)
    }
}

/// Reads the typed [`ProviderName`] extension.
#[derive(Debug, Clone, Copy)]
pub struct TypedContext;

impl ProviderLookup for TypedContext {
    fn lookup(&self, req: &AuthRequest) -> Option<String> {
        req.extensions()
            .get::<ProviderName>()
            .map(|name| name.0.clone())
    }
}

/// Ordered chain of provider lookups followed by a session scan.
pub struct ProviderResolver {
    lookups: Vec<Box<dyn ProviderLookup>>,
    scan_session: bool,
}

impl ProviderResolver {
    /// Creates the default chain.
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
            .with_lookup(QueryParam(PROVIDER_KEY))
            .with_lookup(QueryParam(":provider"))
            .with_lookup(PathParam(PROVIDER_KEY))
            .with_lookup(ContextValue(PROVIDER_KEY))
            .with_lookup(RouteParam(PROVIDER_KEY))
            .with_lookup(TypedContext)
    }

    /// Creates a resolver with no request lookups. Only the session scan
    /// remains.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lookups: Vec::new(),
            scan_session: true,
        }
    }

    /// Appends a lookup to the chain. It runs after the existing lookups
    /// and before the session scan.
    #[must_use]
    pub fn with_lookup(mut self, lookup: impl ProviderLookup + 'static) -> Self {
        self.lookups.push(Box::new(lookup));
        self
    }

    /// Enables or disables the session scan fallback.
    #[must_use]
    pub fn with_session_scan(mut self, enabled: bool) -> Self {
        self.scan_session = enabled;
        self
    }

    /// Runs the request lookups only.
    #[must_use]
    pub fn resolve_from_request(&self, req: &AuthRequest) -> Option<String> {
        self.lookups
            .iter()
            .filter_map(|lookup| lookup.lookup(req))
            .find(|name| !name.is_empty())
    }

    /// Resolves the provider name for a request.
    ///
    /// The session scan needs a store; without one it is skipped. Store
    /// failures during the scan count as "no session".
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderRequired`] if nothing matches.
    pub async fn resolve(
        &self,
        req: &AuthRequest,
        store: Option<&dyn SessionStore>,
        session_name: &str,
        registry: &ProviderRegistry,
    ) -> AuthResult<String> {
        if let Some(name) = self.resolve_from_request(req) {
            return Ok(name);
        }

        if self.scan_session
            && let Some(store) = store
            && let Some(name) = scan_session(req, store, session_name, registry).await
        {
            tracing::debug!(provider = %name, "Resolved provider from session");
            return Ok(name);
        }

        Err(AuthError::ProviderRequired)
    }
}

impl Default for ProviderResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderResolver")
            .field("lookups", &self.lookups.len())
            .field("scan_session", &self.scan_session)
            .finish()
    }
}

async fn scan_session(
    req: &AuthRequest,
    store: &dyn SessionStore,
    session_name: &str,
    registry: &ProviderRegistry,
) -> Option<String> {
    let session = match store.get(req, session_name).await {
        Ok(Some(session)) => session,
        Ok(None) => return None,
        Err(e) => {
            tracing::debug!(error = %e, "Session unavailable for provider scan");
            return None;
        }
    };

    registry
        .list()
        .await
        .iter()
        .map(|provider| provider.name())
        .find(|name| session.contains_key(name))
        .map(str::to_string)
}
