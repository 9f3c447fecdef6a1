//! External identity provider abstraction.
//!
//! The bridge does not speak OAuth itself. Building authorization URLs,
//! exchanging codes and fetching profiles are delegated to a [`Provider`]
//! and the [`ProviderSession`] it creates. The bridge only decides which
//! provider applies, persists the session between the redirect and the
//! callback, and checks the state token.

pub mod registry;

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::request::CallbackParams;

pub use registry::ProviderRegistry;

/// Errors raised by provider implementations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No provider is registered under the requested name.
    #[error("no provider for {0} exists")]
    NotFound(String),

    /// A stored session could not be turned back into a provider session.
    #[error("invalid provider session: {0}")]
    InvalidSession(String),

    /// The provider session has no authorization URL.
    #[error("an AuthURL has not been set")]
    MissingAuthUrl,

    /// The provider's endpoints reported a failure.
    #[error("{provider} responded with an error: {message}")]
    Upstream {
        /// The provider name.
        provider: String,
        /// Description of the failure.
        message: String,
    },
}

impl ProviderError {
    /// Creates a new `InvalidSession` error.
    #[must_use]
    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::InvalidSession(message.into())
    }

    /// Creates a new `Upstream` error.
    #[must_use]
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Whether a provider session has completed its token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationState {
    /// Tokens are present; the profile can be fetched directly.
    Authorized,
    /// The code has not been exchanged yet.
    Pending,
    /// The session cannot tell. The bridge tries a fetch first and falls
    /// back to the exchange if it fails.
    #[default]
    Unknown,
}

/// In-flight OAuth state created by a [`Provider`].
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// Serializes the session for storage.
    fn marshal(&self) -> String;

    /// The authorization URL this session was created with.
    fn auth_url(&self) -> Result<String, ProviderError>;

    /// Exchanges the callback parameters for tokens, returning the access
    /// token.
    async fn authorize(
        &mut self,
        provider: &dyn Provider,
        params: &CallbackParams,
    ) -> Result<String, ProviderError>;

    /// Reports whether the token exchange already happened.
    fn authorization_state(&self) -> AuthorizationState {
        AuthorizationState::Unknown
    }

    /// Access to the concrete type, for providers reading their own
    /// session back in [`Provider::fetch_user`].
    fn as_any(&self) -> &dyn Any;
}

/// An external identity service.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier such as `"github"`.
    fn name(&self) -> &str;

    /// Starts a login, binding it to `state`.
    async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>, ProviderError>;

    /// Restores a session produced by [`ProviderSession::marshal`].
    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn ProviderSession>, ProviderError>;

    /// Fetches the user's profile with the tokens held by `session`.
    async fn fetch_user(&self, session: &dyn ProviderSession)
    -> Result<UserProfile, ProviderError>;
}

/// The profile returned after a successful login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Provider response as received.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub raw_data: HashMap<String, serde_json::Value>,

    /// Name of the provider that authenticated the user.
    pub provider: String,

    /// Provider-side user identifier.
    pub user_id: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Full name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Login or handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,

    /// Profile description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Avatar image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Free-form location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// OAuth access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// OAuth 1.0a token secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,

    /// OAuth refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token expiry.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,

    /// OpenID Connect ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl UserProfile {
    /// Creates a profile with the required fields.
    #[must_use]
    pub fn new(provider: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the access token has an expiry in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= OffsetDateTime::now_utc())
    }
}
