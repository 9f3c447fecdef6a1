//! Error types for the login bridge.
//!
//! Every failure the bridge can report is a variant of [`AuthError`].
//! Errors raised by a [`Provider`](crate::provider::Provider) are carried
//! through unchanged so callers see the provider's own message.

use std::fmt;

use crate::provider::ProviderError;

/// Errors that can occur while beginning or completing a login.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No provider could be resolved from the request.
    #[error("you must select a provider")]
    ProviderRequired,

    /// The session holds no stored state for the resolved provider.
    #[error("could not find a matching session for this request")]
    SessionNotFound,

    /// The `state` echoed on the callback differs from the one sent out.
    #[error("state token mismatch")]
    StateTokenMismatch,

    /// The caller canceled the request while a provider call was running.
    #[error("operation was canceled")]
    Canceled,

    /// The caller's deadline passed while a provider call was running.
    #[error("operation timed out")]
    Timeout,

    /// A stored session value is not a valid compressed stream.
    #[error("corrupt session payload: {message}")]
    CorruptPayload {
        /// Description of the decoding failure.
        message: String,
    },

    /// No session store was configured for this bridge.
    #[error("session store unavailable")]
    NotConfigured,

    /// The session backend failed to load or persist a session.
    #[error("session store error: {message}")]
    Store {
        /// Description of the backend failure.
        message: String,
    },

    /// The request carries data that cannot be interpreted.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// The session could not be cleared during logout.
    #[error("could not delete user session")]
    LogoutFailed,

    /// Error returned by the external provider abstraction.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AuthError {
    /// Creates a new `CorruptPayload` error.
    #[must_use]
    pub fn corrupt_payload(message: impl Into<String>) -> Self {
        Self::CorruptPayload {
            message: message.into(),
        }
    }

    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Returns `true` if the request itself is at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderRequired
                | Self::SessionNotFound
                | Self::StateTokenMismatch
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if the failure lies with the backend or configuration.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured
                | Self::Store { .. }
                | Self::CorruptPayload { .. }
                | Self::LogoutFailed
                | Self::Provider(_)
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderRequired | Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::SessionNotFound | Self::CorruptPayload { .. } | Self::LogoutFailed => {
                ErrorCategory::Session
            }
            Self::StateTokenMismatch => ErrorCategory::Csrf,
            Self::Canceled | Self::Timeout => ErrorCategory::Caller,
            Self::NotConfigured => ErrorCategory::Configuration,
            Self::Store { .. } => ErrorCategory::Infrastructure,
            Self::Provider(_) => ErrorCategory::Provider,
        }
    }
}

/// Categories of bridge errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or incomplete requests.
    Validation,
    /// Missing or unreadable session state.
    Session,
    /// CSRF state token failures.
    Csrf,
    /// Deadline or cancellation imposed by the caller.
    Caller,
    /// Missing or invalid configuration.
    Configuration,
    /// Session backend I/O failures.
    Infrastructure,
    /// Failures reported by the external provider.
    Provider,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Session => write!(f, "session"),
            Self::Csrf => write!(f, "csrf"),
            Self::Caller => write!(f, "caller"),
            Self::Configuration => write!(f, "configuration"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Provider => write!(f, "provider"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}
