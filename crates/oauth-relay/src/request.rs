//! Request and response model for the login flows.
//!
//! [`AuthRequest`] is the bridge's view of an inbound HTTP request: method,
//! URI, headers, extensions, router path parameters and (for form POSTs)
//! the parsed body. It is an axum extractor, and can also be assembled by
//! hand for other HTTP stacks.
//!
//! [`AuthResponse`] collects the `Set-Cookie` writes made by session
//! stores. Handlers return it as response parts next to their body.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{FromRequest, FromRequestParts, RawPathParams, Request};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, IntoResponseParts, Response, ResponseParts};
use cookie::Cookie;
use url::form_urlencoded;

/// Upper bound for form bodies read by the extractor.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Name-value pairs in request order.
type Pairs = Vec<(String, String)>;

/// An inbound request as seen by the login bridge.
#[derive(Debug, Default)]
pub struct AuthRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
    path_params: Pairs,
    form: Option<Pairs>,
}

impl AuthRequest {
    /// Creates a request with no headers, extensions or body.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            ..Self::default()
        }
    }

    /// Builds a request from already-split HTTP parts.
    ///
    /// `body` is parsed as `application/x-www-form-urlencoded` when given.
    #[must_use]
    pub fn from_parts(
        parts: axum::http::request::Parts,
        path_params: Pairs,
        body: Option<&[u8]>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
            path_params,
            form: body.map(parse_pairs),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: axum::http::HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Adds a router-extracted path parameter.
    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Sets the parsed form body.
    #[must_use]
    pub fn with_form(mut self, body: &[u8]) -> Self {
        self.form = Some(parse_pairs(body));
        self
    }

    /// Inserts a typed value into the request extensions.
    #[must_use]
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Returns the request carrying `provider` under the typed
    /// [`ProviderName`] context key.
    #[must_use]
    pub fn with_provider(self, provider: impl Into<String>) -> Self {
        self.with_extension(ProviderName(provider.into()))
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request extensions (the request's ambient context).
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Decoded query parameters in order.
    #[must_use]
    pub fn query_pairs(&self) -> Pairs {
        self.uri.query().map(str::as_bytes).map(parse_pairs).unwrap_or_default()
    }

    /// First value of the query parameter `name`, if present.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<String> {
        first_value(&self.query_pairs(), name)
    }

    /// Returns `true` if the URI carries at least one query parameter.
    #[must_use]
    pub fn has_query(&self) -> bool {
        !self.query_pairs().is_empty()
    }

    /// Path parameter `name` as extracted by the router.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of `name` in the form body, if one was read.
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<String> {
        self.form.as_ref().and_then(|form| first_value(form, name))
    }

    /// Returns `true` for a POST without query parameters, where callback
    /// values travel in the form body instead.
    #[must_use]
    pub fn uses_form_params(&self) -> bool {
        self.method == Method::POST && !self.has_query()
    }

    /// Parameters of a provider callback: the query string, or the form
    /// body for a POST with an empty query.
    #[must_use]
    pub fn callback_params(&self) -> CallbackParams {
        if self.uses_form_params() {
            CallbackParams(self.form.clone().unwrap_or_default())
        } else {
            CallbackParams(self.query_pairs())
        }
    }
}

impl<S> FromRequest<S> for AuthRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let path_params = match RawPathParams::from_request_parts(&mut parts, state).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => Vec::new(),
        };

        let is_form = parts.method == Method::POST
            && parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        let body = if is_form {
            let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
            Some(bytes)
        } else {
            None
        };

        Ok(Self::from_parts(parts, path_params, body.as_deref()))
    }
}

fn parse_pairs(input: &[u8]) -> Pairs {
    form_urlencoded::parse(input).into_owned().collect()
}

fn first_value(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// String-keyed values placed in the request context by middleware.
///
/// The resolver looks for a provider under the `"provider"` key.
#[derive(Debug, Clone, Default)]
pub struct ContextValues(HashMap<String, String>);

impl ContextValues {
    /// Creates an empty set of values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Path parameters captured by a routing layer other than the axum router
/// that produced the request, such as a nested router or a middleware
/// that matches paths itself.
#[derive(Debug, Clone, Default)]
pub struct RouteParams(Pairs);

impl RouteParams {
    /// Creates route parameters from name-value pairs.
    pub fn new<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Typed context key carrying the provider chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderName(pub String);

/// Callback parameters handed to a provider session for code exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams(Pairs);

impl CallbackParams {
    /// First value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of `name` in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<Pairs> for CallbackParams {
    fn from(pairs: Pairs) -> Self {
        Self(pairs)
    }
}

/// Cookie writes accumulated while handling a request.
///
/// A later write to a cookie name replaces an earlier one, so a session
/// that is stored and then invalidated in the same request ends up with
/// only the removal cookie.
#[derive(Debug, Default)]
pub struct AuthResponse {
    cookies: Vec<Cookie<'static>>,
}

impl AuthResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cookie to be sent, replacing any earlier cookie with the
    /// same name.
    pub fn set_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookies.retain(|c| c.name() != cookie.name());
        self.cookies.push(cookie);
    }

    /// Returns the pending cookie named `name`.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().find(|c| c.name() == name)
    }

    /// All pending cookies.
    #[must_use]
    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    /// Renders the pending cookies as `Set-Cookie` header values.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<HeaderValue> {
        self.cookies
            .iter()
            .filter_map(|c| match HeaderValue::from_str(&c.to_string()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(cookie = c.name(), error = %e, "Dropping unencodable cookie");
                    None
                }
            })
            .collect()
    }
}

impl IntoResponseParts for AuthResponse {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for value in self.set_cookie_headers() {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}
