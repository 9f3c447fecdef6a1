//! CSRF state tokens.
//!
//! A state token is bound to one authorization attempt: it is embedded in
//! the provider's authorization URL when the flow begins and must come
//! back unchanged on the callback.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;
use crate::provider::ProviderSession;
use crate::request::AuthRequest;

/// Name of the state parameter in URLs and forms.
pub const STATE_PARAM: &str = "state";

/// Raw entropy in a generated token.
pub const STATE_BYTES: usize = 64;

/// Returns the state token for a new authorization attempt.
///
/// A `state` query value already on the request is passed through
/// unchanged, so callers can pre-generate their own token. Otherwise a new
/// token of [`STATE_BYTES`] random bytes is returned, base64url-encoded.
///
/// # Panics
///
/// Panics if the operating system's random source is unavailable. There is
/// no safe way to continue a login flow without one.
#[must_use]
pub fn generate_state(req: &AuthRequest) -> String {
    if let Some(state) = req.query_value(STATE_PARAM).filter(|s| !s.is_empty()) {
        return state;
    }

    let mut nonce = [0u8; STATE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    URL_SAFE_NO_PAD.encode(nonce)
}

/// Reads the state token echoed back on a callback.
///
/// The token is read from the query string, or from the form body for a
/// POST without query parameters. A missing token is an empty string.
#[must_use]
pub fn extract_state(req: &AuthRequest) -> String {
    let value = if req.uses_form_params() {
        req.form_value(STATE_PARAM)
    } else {
        req.query_value(STATE_PARAM)
    };
    value.unwrap_or_default()
}

/// Checks the callback's state token against the one in the session's
/// authorization URL.
///
/// An authorization URL without a `state` parameter disables the check:
/// integrations that never set a token are not rejected. Every other
/// difference is a mismatch.
///
/// # Errors
///
/// - [`AuthError::StateTokenMismatch`] if the tokens differ
/// - [`AuthError::InvalidRequest`] if the stored authorization URL does
///   not parse
/// - [`AuthError::Provider`] if the session has no authorization URL
pub fn validate_state(req: &AuthRequest, session: &dyn ProviderSession) -> AuthResult<()> {
    let raw = session.auth_url()?;
    let auth_url = Url::parse(&raw)
        .map_err(|e| AuthError::invalid_request(format!("unparsable authorization URL: {e}")))?;

    let original = auth_url
        .query_pairs()
        .find(|(k, _)| k == STATE_PARAM)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    if original.is_empty() {
        tracing::debug!("Authorization URL carries no state token, skipping CSRF check");
        return Ok(());
    }

    if original != extract_state(req) {
        return Err(AuthError::StateTokenMismatch);
    }

    Ok(())
}
