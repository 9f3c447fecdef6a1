//! Axum handler that starts a login.
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use oauth_relay::http::begin_auth_handler;
//!
//! let app = Router::new()
//!     .route("/auth/{provider}", get(begin_auth_handler))
//!     .with_state(bridge);
//! ```
//!
//! Completing the login and logging out have no handler here; the
//! application calls [`AuthBridge::complete_auth`] and
//! [`AuthBridge::logout`] from its own routes and renders the result.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::bridge::AuthBridge;
use crate::request::{AuthRequest, AuthResponse};

/// Redirects the user agent to the provider's authorization URL.
///
/// Responds `307 Temporary Redirect` with the session cookie on success,
/// or `400 Bad Request` with the error text.
pub async fn begin_auth_handler(State(bridge): State<AuthBridge>, req: AuthRequest) -> Response {
    let mut resp = AuthResponse::new();
    match bridge.begin_auth(&req, &mut resp).await {
        Ok(url) => (resp, Redirect::temporary(&url)).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not start authentication");
            (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response()
        }
    }
}
