//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hub_client::HubClient;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An unsigned JWT-shaped token expiring `secs` from now. `tag` keeps tokens distinct.
pub fn token_expiring_in(secs: i64, tag: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + secs;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"kim","exp":{},"tag":"{}"}}"#, exp, tag));
    format!("{}.{}.signature", header, payload)
}

pub fn token_body(token: &str) -> serde_json::Value {
    json!({
        "timestamp": "2026-01-01T00:00:00Z",
        "requestId": "req-1",
        "status": 200,
        "code": "ok",
        "message": "ok",
        "path": "/",
        "result": {"accessToken": token, "dpopBound": true}
    })
}

pub fn client_for(server: &MockServer) -> HubClient {
    HubClient::builder()
        .base_url(server.uri())
        .build()
        .expect("client builds")
}

pub async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
        .mount(server)
        .await;
}

pub async fn mount_current_user(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "result": {"username": "kim", "nickname": "Kim", "email": "kim@example.com", "social": null}
        })))
        .mount(server)
        .await;
}

pub async fn mount_confirm(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/confirm"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Log in with `token` and load the user so the session marker is set.
pub async fn signed_in_client(server: &MockServer, token: &str) -> HubClient {
    mount_login(server, token).await;
    mount_current_user(server).await;

    let client = client_for(server);
    client.auth().login("kim", "hunter2").await.expect("login");
    client.users().current().await.expect("current user");
    assert!(client.auth_state().is_logged_in());
    client
}

/// `Authorization` headers of every request received at `endpoint`, in order.
pub async fn authorization_headers(server: &MockServer, endpoint: &str) -> Vec<Option<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == endpoint)
        .map(|request| {
            request
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}

/// Paths of every request received, in order.
pub async fn request_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|request| request.url.path().to_string())
        .collect()
}
