//! # oauth-relay
//!
//! Session-state bridge for browser OAuth logins.
//!
//! The crate sits between an HTTP application and a set of identity
//! providers. It works out which provider a request is for, keeps each
//! provider's in-flight session in the user's session across the redirect
//! round-trip, and checks the CSRF state token on the callback. The OAuth
//! protocol itself is left to [`Provider`] implementations.
//!
//! ## Modules
//!
//! - [`bridge`] - begin / complete / logout flows
//! - [`provider`] - provider traits, user profile and registry
//! - [`resolver`] - provider name lookup chain
//! - [`state`] - state token generation and validation
//! - [`session`] - session stores (cookie, filesystem, memory)
//! - [`codec`] - compression of stored session values
//! - [`request`] - request/response model and axum extractor
//! - [`scope`] - caller deadlines and cancellation
//! - [`config`] - configuration loading and store construction
//! - [`http`] - axum handler that starts a login
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use oauth_relay::prelude::*;
//!
//! let registry = Arc::new(ProviderRegistry::new());
//! registry.register(Arc::new(GithubProvider::new(client_id, secret))).await;
//!
//! let config = BridgeConfig::load(Some("oauth.toml".as_ref()))?;
//! let bridge = AuthBridge::from_config(&config, registry)?;
//!
//! async fn callback(State(bridge): State<AuthBridge>, req: AuthRequest) -> Response {
//!     let mut resp = AuthResponse::new();
//!     match bridge.complete_auth(&req, &mut resp).await {
//!         Ok(user) => (resp, Json(user)).into_response(),
//!         Err(e) => (resp, StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
//!     }
//! }
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod request;
pub mod resolver;
pub mod scope;
pub mod session;
pub mod state;

pub use bridge::{AuthBridge, AuthBridgeBuilder, StateGenerator};
pub use config::BridgeConfig;
pub use error::{AuthError, ConfigError, ErrorCategory};
pub use http::begin_auth_handler;
pub use provider::{
    AuthorizationState, Provider, ProviderError, ProviderRegistry, ProviderSession, UserProfile,
};
pub use request::{
    AuthRequest, AuthResponse, CallbackParams, ContextValues, ProviderName, RouteParams,
};
pub use resolver::{ProviderLookup, ProviderResolver};
pub use scope::CallerContext;
pub use session::{
    CookieStore, FilesystemStore, MemoryStore, Session, SessionOptions, SessionStore,
};

/// Type alias for bridge results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use oauth_relay::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::bridge::{AuthBridge, AuthBridgeBuilder};
    pub use crate::config::{BridgeConfig, StoreBackend};
    pub use crate::error::{AuthError, ConfigError, ErrorCategory};
    pub use crate::http::begin_auth_handler;
    pub use crate::provider::{
        AuthorizationState, Provider, ProviderError, ProviderRegistry, ProviderSession,
        UserProfile,
    };
    pub use crate::request::{
        AuthRequest, AuthResponse, CallbackParams, ContextValues, ProviderName, RouteParams,
    };
    pub use crate::resolver::{ProviderLookup, ProviderResolver};
    pub use crate::scope::CallerContext;
    pub use crate::session::{
        CookieStore, FilesystemStore, MemoryStore, Session, SessionOptions, SessionStore,
    };
}
