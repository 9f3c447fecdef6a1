//! Shared fixtures for the login flow tests.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::COOKIE;
use axum::http::{HeaderValue, Method};
use oauth_relay::{
    AuthBridge, AuthRequest, AuthResponse, AuthorizationState, CallbackParams, MemoryStore,
    Provider, ProviderError, ProviderRegistry, ProviderSession, UserProfile,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Counts the calls a provider receives.
#[derive(Debug, Default)]
pub struct Calls {
    pub begin: AtomicUsize,
    pub authorize: AtomicUsize,
    pub fetch: AtomicUsize,
}

impl Calls {
    pub fn begin(&self) -> usize {
        self.begin.load(Ordering::SeqCst)
    }

    pub fn authorize(&self) -> usize {
        self.authorize.load(Ordering::SeqCst)
    }

    pub fn fetch(&self) -> usize {
        self.fetch.load(Ordering::SeqCst)
    }
}

/// In-flight session of [`MockProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockSession {
    pub auth_url: String,
    pub access_token: Option<String>,
    pub reports_state: bool,
    #[serde(skip)]
    calls: Option<Arc<Calls>>,
}

#[async_trait]
impl ProviderSession for MockSession {
    fn marshal(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn auth_url(&self) -> Result<String, ProviderError> {
        if self.auth_url.is_empty() {
            return Err(ProviderError::MissingAuthUrl);
        }
        Ok(self.auth_url.clone())
    }

    async fn authorize(
        &mut self,
        provider: &dyn Provider,
        params: &CallbackParams,
    ) -> Result<String, ProviderError> {
        if let Some(calls) = &self.calls {
            calls.authorize.fetch_add(1, Ordering::SeqCst);
        }
        let code = params
            .get("code")
            .ok_or_else(|| ProviderError::upstream(provider.name(), "missing code"))?;
        let token = format!("token-{code}");
        self.access_token = Some(token.clone());
        Ok(token)
    }

    fn authorization_state(&self) -> AuthorizationState {
        match (self.reports_state, &self.access_token) {
            (false, _) => AuthorizationState::Unknown,
            (true, Some(_)) => AuthorizationState::Authorized,
            (true, None) => AuthorizationState::Pending,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scriptable provider for flow tests.
pub struct MockProvider {
    name: String,
    pub calls: Arc<Calls>,
    embed_state: bool,
    reports_state: bool,
    pre_authorized: bool,
    fetch_delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(Calls::default()),
            embed_state: true,
            reports_state: false,
            pre_authorized: false,
            fetch_delay: None,
        }
    }

    /// Leaves the state token out of the authorization URL.
    pub fn without_state(mut self) -> Self {
        self.embed_state = false;
        self
    }

    /// Sessions report Pending / Authorized instead of Unknown.
    pub fn reporting_state(mut self) -> Self {
        self.reports_state = true;
        self
    }

    /// Sessions already hold an access token when created.
    pub fn pre_authorized(mut self) -> Self {
        self.pre_authorized = true;
        self
    }

    /// Slows down profile fetches.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>, ProviderError> {
        self.calls.begin.fetch_add(1, Ordering::SeqCst);

        let mut url = Url::parse(&format!("https://{}.example/authorize", self.name))
            .map_err(|e| ProviderError::upstream(&self.name, e.to_string()))?;
        url.query_pairs_mut().append_pair("client_id", "relay-test");
        if self.embed_state {
            url.query_pairs_mut().append_pair("state", state);
        }

        Ok(Box::new(MockSession {
            auth_url: url.to_string(),
            access_token: self.pre_authorized.then(|| "pre-issued".to_string()),
            reports_state: self.reports_state,
            calls: Some(self.calls.clone()),
        }))
    }

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn ProviderSession>, ProviderError> {
        let mut session: MockSession = serde_json::from_str(data)
            .map_err(|e| ProviderError::invalid_session(e.to_string()))?;
        session.calls = Some(self.calls.clone());
        Ok(Box::new(session))
    }

    async fn fetch_user(&self, session: &dyn ProviderSession) -> Result<UserProfile, ProviderError> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let session = session
            .as_any()
            .downcast_ref::<MockSession>()
            .ok_or_else(|| ProviderError::invalid_session("foreign session"))?;
        let token = session
            .access_token
            .clone()
            .ok_or_else(|| ProviderError::upstream(&self.name, "cannot get user information without accessToken"))?;

        let mut user = UserProfile::new(&self.name, "1001");
        user.email = Some("octo@example.com".to_string());
        user.access_token = Some(token);
        Ok(user)
    }
}

/// A bridge over a fresh memory store with the given providers registered.
pub async fn bridge_with(providers: Vec<MockProvider>) -> (AuthBridge, Arc<MemoryStore>) {
    let registry = Arc::new(ProviderRegistry::new());
    for provider in providers {
        registry.register(Arc::new(provider)).await;
    }
    let store = Arc::new(MemoryStore::new());
    let bridge = AuthBridge::builder()
        .store(store.clone())
        .registry(registry)
        .build();
    (bridge, store)
}

pub fn request(method: Method, uri: &str) -> AuthRequest {
    AuthRequest::new(method, uri.parse().expect("valid uri"))
}

/// A request carrying the cookies set on `resp`, as a browser would send
/// them on the next hop.
pub fn follow(resp: &AuthResponse, method: Method, uri: &str) -> AuthRequest {
    let cookies = resp
        .cookies()
        .iter()
        .filter(|c| !c.value().is_empty())
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ");

    let req = request(method, uri);
    if cookies.is_empty() {
        return req;
    }
    req.with_header(COOKIE, HeaderValue::from_str(&cookies).expect("cookie header"))
}

/// The `state` query value of an authorization URL.
pub fn state_of(auth_url: &str) -> Option<String> {
    Url::parse(auth_url)
        .expect("authorization URL")
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
}
