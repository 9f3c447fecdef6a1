mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oauth_relay::config::StoreBackend;
use oauth_relay::{
    AuthBridge, AuthError, AuthResponse, BridgeConfig, CallerContext, ProviderRegistry,
    SessionStore, begin_auth_handler,
};
use tower::ServiceExt;

use common::{MockProvider, bridge_with, follow, request, state_of};

#[tokio::test]
async fn begin_auth_stores_compressed_provider_session() {
    let provider = MockProvider::new("github");
    let calls = provider.calls.clone();
    let (bridge, store) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");

    assert!(auth_url.starts_with("https://github.example/authorize?"));
    assert_eq!(calls.begin(), 1);
    let state = state_of(&auth_url).expect("state in url");
    assert!(state.len() >= 86, "64 random bytes, base64url encoded");

    let next = follow(&resp, Method::GET, "/auth/callback");
    let session = store
        .get(&next, bridge.session_name())
        .await
        .expect("store read")
        .expect("session exists");
    let raw = STANDARD
        .decode(session.get("github").expect("github entry"))
        .expect("base64 value");
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let marshaled = bridge
        .get_from_session("github", &next)
        .await
        .expect("stored session");
    assert!(marshaled.contains(&auth_url));
}

#[tokio::test]
async fn begin_auth_passes_through_caller_state() {
    let (bridge, _) = bridge_with(vec![MockProvider::new("github")]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(
            &request(Method::GET, "/auth?provider=github&state=caller-token"),
            &mut resp,
        )
        .await
        .expect("begin auth");
    assert_eq!(state_of(&auth_url).as_deref(), Some("caller-token"));
}

#[tokio::test]
async fn begin_auth_uses_custom_state_generator() {
    let registry = Arc::new(ProviderRegistry::new());
    registry.register(Arc::new(MockProvider::new("github"))).await;
    let bridge = AuthBridge::builder()
        .store(Arc::new(oauth_relay::MemoryStore::new()))
        .registry(registry)
        .state_generator(|_| "fixed".to_string())
        .build();

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    assert_eq!(state_of(&auth_url).as_deref(), Some("fixed"));
}

#[tokio::test]
async fn begin_auth_unknown_provider() {
    let (bridge, _) = bridge_with(vec![MockProvider::new("github")]).await;

    let mut resp = AuthResponse::new();
    let err = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=bitbucket"), &mut resp)
        .await
        .expect_err("unknown provider");
    assert_eq!(err.to_string(), "no provider for bitbucket exists");
    assert!(resp.cookies().is_empty());
}

#[tokio::test]
async fn complete_auth_without_session_does_not_contact_provider() {
    let provider = MockProvider::new("github");
    let calls = provider.calls.clone();
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let err = bridge
        .complete_auth(
            &request(Method::GET, "/auth/callback?provider=github&code=c&state=s"),
            &mut resp,
        )
        .await
        .expect_err("no session");

    assert!(matches!(err, AuthError::SessionNotFound));
    assert_eq!(calls.fetch(), 0);
    assert_eq!(calls.authorize(), 0);
}

#[tokio::test]
async fn complete_auth_with_authorized_session_skips_exchange() {
    let provider = MockProvider::new("github").pre_authorized();
    let calls = provider.calls.clone();
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    let state = state_of(&auth_url).expect("state");

    let callback = follow(
        &resp,
        Method::GET,
        &format!("/auth/callback?provider=github&state={state}"),
    );
    let mut resp = AuthResponse::new();
    let user = bridge
        .complete_auth(&callback, &mut resp)
        .await
        .expect("complete auth");

    assert_eq!(user.provider, "github");
    assert_eq!(user.access_token.as_deref(), Some("pre-issued"));
    assert_eq!(calls.fetch(), 1);
    assert_eq!(calls.authorize(), 0);

    let cookie = resp.cookie(bridge.session_name()).expect("session cookie");
    assert_eq!(cookie.value(), "", "session expired after callback");
    assert!(matches!(
        bridge.get_from_session("github", &callback).await,
        Err(AuthError::SessionNotFound)
    ));
}

#[tokio::test]
async fn complete_auth_exchanges_code_when_fetch_fails() {
    let provider = MockProvider::new("github");
    let calls = provider.calls.clone();
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    let state = state_of(&auth_url).expect("state");

    let callback = follow(
        &resp,
        Method::GET,
        &format!("/auth/callback?provider=github&code=abc&state={state}"),
    );
    let mut resp = AuthResponse::new();
    let user = bridge
        .complete_auth(&callback, &mut resp)
        .await
        .expect("complete auth");

    assert_eq!(user.access_token.as_deref(), Some("token-abc"));
    assert_eq!(calls.fetch(), 2);
    assert_eq!(calls.authorize(), 1);
    assert_eq!(resp.cookie(bridge.session_name()).expect("cookie").value(), "");
}

#[tokio::test]
async fn complete_auth_pending_session_goes_straight_to_exchange() {
    let provider = MockProvider::new("github").reporting_state();
    let calls = provider.calls.clone();
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    let state = state_of(&auth_url).expect("state");

    let callback = follow(
        &resp,
        Method::GET,
        &format!("/auth/callback?provider=github&code=xyz&state={state}"),
    );
    let user = bridge
        .complete_auth(&callback, &mut AuthResponse::new())
        .await
        .expect("complete auth");

    assert_eq!(user.access_token.as_deref(), Some("token-xyz"));
    assert_eq!(calls.fetch(), 1);
    assert_eq!(calls.authorize(), 1);
}

#[tokio::test]
async fn complete_auth_rejects_state_mismatch_and_clears_session() {
    let provider = MockProvider::new("github").pre_authorized();
    let calls = provider.calls.clone();
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");

    let callback = follow(
        &resp,
        Method::GET,
        "/auth/callback?provider=github&code=abc&state=forged",
    );
    let mut resp = AuthResponse::new();
    let err = bridge
        .complete_auth(&callback, &mut resp)
        .await
        .expect_err("forged state");

    assert!(matches!(err, AuthError::StateTokenMismatch));
    assert_eq!(calls.fetch(), 0);
    assert_eq!(resp.cookie(bridge.session_name()).expect("cookie").value(), "");
    assert!(matches!(
        bridge.get_from_session("github", &callback).await,
        Err(AuthError::SessionNotFound)
    ));
}

#[tokio::test]
async fn complete_auth_without_original_state_skips_check() {
    let provider = MockProvider::new("github").without_state();
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    assert_eq!(state_of(&auth_url), None);

    let callback = follow(
        &resp,
        Method::GET,
        "/auth/callback?provider=github&code=abc&state=anything",
    );
    let user = bridge
        .complete_auth(&callback, &mut AuthResponse::new())
        .await
        .expect("complete auth");
    assert_eq!(user.access_token.as_deref(), Some("token-abc"));
}

#[tokio::test]
async fn form_post_callback_resolves_provider_from_session() {
    let (bridge, _) =
        bridge_with(vec![MockProvider::new("twitter"), MockProvider::new("apple")]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=apple"), &mut resp)
        .await
        .expect("begin auth");
    let state = state_of(&auth_url).expect("state");

    let body = format!("code=form-code&state={state}");
    let callback = follow(&resp, Method::POST, "/auth/callback").with_form(body.as_bytes());
    assert_eq!(
        bridge.resolve_provider_name(&callback).await.expect("resolved"),
        "apple"
    );

    let user = bridge
        .complete_auth(&callback, &mut AuthResponse::new())
        .await
        .expect("complete auth");
    assert_eq!(user.provider, "apple");
    assert_eq!(user.access_token.as_deref(), Some("token-form-code"));
}

#[tokio::test]
async fn complete_auth_reports_caller_timeout() {
    let provider = MockProvider::new("github")
        .pre_authorized()
        .with_fetch_delay(Duration::from_secs(5));
    let (bridge, _) = bridge_with(vec![provider]).await;

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    let state = state_of(&auth_url).expect("state");

    let callback = follow(
        &resp,
        Method::GET,
        &format!("/auth/callback?provider=github&state={state}"),
    )
    .with_extension(CallerContext::new().with_timeout(Duration::from_millis(20)));

    let mut resp = AuthResponse::new();
    let err = bridge
        .complete_auth(&callback, &mut resp)
        .await
        .expect_err("deadline");
    assert!(matches!(err, AuthError::Timeout));
    assert_eq!(resp.cookie(bridge.session_name()).expect("cookie").value(), "");
}

#[tokio::test]
async fn logout_leaves_a_fresh_session() {
    let (bridge, store) = bridge_with(vec![MockProvider::new("github")]).await;

    let mut resp = AuthResponse::new();
    bridge
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");
    let next = follow(&resp, Method::GET, "/logout");

    let mut resp = AuthResponse::new();
    bridge.logout(&next, &mut resp).await.expect("logout");

    let cookie = resp.cookie(bridge.session_name()).expect("removal cookie");
    assert_eq!(cookie.value(), "");
    assert!(store.is_empty());

    let session = store
        .get_or_create(&next, bridge.session_name())
        .await
        .expect("session");
    assert!(session.is_new());
    assert!(session.is_empty());
}

#[tokio::test]
async fn bridges_do_not_share_sessions() {
    let (first, _) = bridge_with(vec![MockProvider::new("github")]).await;
    let (second, _) = bridge_with(vec![MockProvider::new("github")]).await;

    let mut resp = AuthResponse::new();
    first
        .begin_auth(&request(Method::GET, "/auth?provider=github"), &mut resp)
        .await
        .expect("begin auth");

    let callback = follow(&resp, Method::GET, "/auth/callback?provider=github");
    assert!(first.get_from_session("github", &callback).await.is_ok());
    assert!(matches!(
        second.get_from_session("github", &callback).await,
        Err(AuthError::SessionNotFound)
    ));
}

#[tokio::test]
async fn configured_filesystem_bridge_completes_login() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut config = BridgeConfig::default()
        .with_secret_fallback(Some("filesystem-flow-secret-0123456789".to_string()));
    config.store.backend = StoreBackend::Filesystem;
    config.store.path = dir.path().to_path_buf();

    let registry = Arc::new(ProviderRegistry::new());
    registry.register(Arc::new(MockProvider::new("gitlab"))).await;
    let bridge = AuthBridge::from_config(&config, registry).expect("bridge");

    let mut resp = AuthResponse::new();
    let auth_url = bridge
        .begin_auth(&request(Method::GET, "/auth?provider=gitlab"), &mut resp)
        .await
        .expect("begin auth");
    let state = state_of(&auth_url).expect("state");
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 1);

    let callback = follow(
        &resp,
        Method::GET,
        &format!("/auth/callback?provider=gitlab&code=fs&state={state}"),
    );
    let user = bridge
        .complete_auth(&callback, &mut AuthResponse::new())
        .await
        .expect("complete auth");
    assert_eq!(user.access_token.as_deref(), Some("token-fs"));
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
}

#[tokio::test]
async fn handler_redirects_to_authorization_url() {
    let (bridge, _) = bridge_with(vec![MockProvider::new("github")]).await;
    let app = Router::new()
        .route("/auth/{provider}", get(begin_auth_handler))
        .with_state(bridge.clone());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/github")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location");
    assert!(location.starts_with("https://github.example/authorize?"));
    assert!(state_of(location).is_some());

    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("set-cookie");
    assert!(set_cookie.starts_with(&format!("{}=", bridge.session_name())));
    assert!(set_cookie.contains("HttpOnly"));
}
