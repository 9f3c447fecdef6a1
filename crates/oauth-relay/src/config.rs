//! Bridge configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! session_name = "_oauth_relay_session"
//!
//! [store]
//! backend = "filesystem"
//! path = "/var/lib/app/sessions"
//!
//! [cookie]
//! max_age = "30d"
//! secure = true
//! same_site = "lax"
//! ```
//!
//! The secret is normally not written to the file. It is read from
//! `OAUTH_RELAY__SECRET`, or from `SESSION_SECRET` as a fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ::cookie::SameSite;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::{
    CookieStore, DEFAULT_MAX_AGE, FilesystemStore, MAX_MAX_AGE, SessionOptions, SessionStore,
};

/// Default session cookie name.
pub const DEFAULT_SESSION_NAME: &str = "_oauth_relay_session";

/// Prefix of environment overrides, e.g. `OAUTH_RELAY__COOKIE__SECURE=true`.
pub const ENV_PREFIX: &str = "OAUTH_RELAY";

/// Environment variable consulted when no secret is configured.
pub const SECRET_ENV: &str = "SESSION_SECRET";

/// Minimum secret length in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Root configuration for an [`AuthBridge`](crate::AuthBridge).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the session (and its cookie).
    pub session_name: String,

    /// Key material for cookie encryption. Without one no store is built.
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    /// Session backend.
    pub store: StoreConfig,

    /// Cookie attributes.
    pub cookie: CookieConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            secret: None,
            store: StoreConfig::default(),
            cookie: CookieConfig::default(),
        }
    }
}

/// Which backend keeps sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Encrypted client-side cookie.
    #[default]
    Cookie,
    /// Files on the server, id in an encrypted cookie.
    Filesystem,
}

/// Session backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind.
    pub backend: StoreBackend,

    /// Session directory for the filesystem backend. Empty means the
    /// system temporary directory.
    pub path: PathBuf,
}

/// Session cookie attributes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie path.
    pub path: String,

    /// Cookie domain; host-only when unset.
    pub domain: Option<String>,

    /// Session lifetime. Zero makes a browser-session cookie.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Send over HTTPS only.
    pub secure: bool,

    /// Hide from scripts.
    pub http_only: bool,

    /// `lax`, `strict` or `none`.
    pub same_site: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: Duration::from_secs(DEFAULT_MAX_AGE.unsigned_abs()),
            secure: false,
            http_only: true,
            same_site: "lax".to_string(),
        }
    }
}

impl CookieConfig {
    /// Parses the `same_site` setting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for anything but `lax`, `strict`
    /// or `none`.
    pub fn same_site(&self) -> Result<SameSite, ConfigError> {
        match self.same_site.to_ascii_lowercase().as_str() {
            "lax" => Ok(SameSite::Lax),
            "strict" => Ok(SameSite::Strict),
            "none" => Ok(SameSite::None),
            other => Err(ConfigError::InvalidValue(format!(
                "cookie.same_site must be lax, strict or none, got {other:?}"
            ))),
        }
    }

    /// Converts the settings into session options.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `same_site` is unknown or
    /// `max_age` exceeds 400 days.
    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        let max_age = i64::try_from(self.max_age.as_secs())
            .ok()
            .filter(|secs| *secs <= MAX_MAX_AGE)
            .ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "cookie.max_age must be at most {} days",
                    MAX_MAX_AGE / 86_400
                ))
            })?;

        Ok(SessionOptions {
            path: self.path.clone(),
            domain: self.domain.clone().filter(|d| !d.is_empty()),
            max_age,
            secure: self.secure,
            http_only: self.http_only,
            same_site: self.same_site()?,
        })
    }
}

impl BridgeConfig {
    /// Loads configuration from an optional TOML file and `OAUTH_RELAY__*`
    /// environment overrides, then applies the `SESSION_SECRET` fallback.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Source` if the file cannot be read or the
    /// merged values do not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config.with_secret_fallback(std::env::var(SECRET_ENV).ok()))
    }

    /// Uses `fallback` as the secret if none is configured.
    #[must_use]
    pub fn with_secret_fallback(mut self, fallback: Option<String>) -> Self {
        if self.secret().is_none() {
            self.secret = fallback.filter(|s| !s.is_empty());
        }
        self
    }

    /// The configured secret, treating an empty string as unset.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `session_name` is empty
    /// - `cookie.same_site` is unknown
    /// - `cookie.max_age` exceeds 400 days
    /// - the secret is shorter than 32 bytes
    /// - `same_site = "none"` is used without `secure`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "session_name cannot be empty".to_string(),
            ));
        }

        let same_site = self.cookie.session_options()?.same_site;
        if same_site == SameSite::None && !self.cookie.secure {
            return Err(ConfigError::InvalidValue(
                "cookie.same_site = \"none\" requires cookie.secure = true".to_string(),
            ));
        }

        if let Some(secret) = self.secret()
            && secret.len() < MIN_SECRET_BYTES
        {
            return Err(ConfigError::InvalidValue(format!(
                "secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }

        Ok(())
    }

    /// Builds the configured session store.
    ///
    /// Returns `Ok(None)` when no secret is available. The bridge then
    /// reports every operation as not configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the cookie settings are
    /// invalid.
    pub fn build_store(&self) -> Result<Option<Arc<dyn SessionStore>>, ConfigError> {
        let Some(secret) = self.secret() else {
            return Ok(None);
        };
        let options = self.cookie.session_options()?;

        let store: Arc<dyn SessionStore> = match self.store.backend {
            StoreBackend::Cookie => {
                Arc::new(CookieStore::new(secret.as_bytes()).with_options(options))
            }
            StoreBackend::Filesystem => Arc::new(
                FilesystemStore::new(self.store.path.clone(), secret.as_bytes())
                    .with_options(options),
            ),
        };
        Ok(Some(store))
    }
}
