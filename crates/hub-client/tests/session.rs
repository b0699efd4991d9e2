//! Login, persistence across restarts, and logout.

mod common;

use common::*;
use hub_client::{ClientConfig, ClientError, HubClient, RequestSpec};
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn persistent_client(server: &MockServer, data_dir: &std::path::Path) -> HubClient {
    HubClient::builder()
        .config(
            ClientConfig::default()
                .with_base_url(server.uri())
                .with_data_dir(data_dir),
        )
        .build()
        .unwrap()
}

async fn mount_posts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/posts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fresh_device_generates_key_and_logs_in() {
    let server = MockServer::start().await;
    let token = token_expiring_in(3600, "first");
    mount_login(&server, &token).await;
    mount_posts(&server).await;

    let data_dir = tempdir().unwrap();
    let client = persistent_client(&server, data_dir.path());
    assert!(!client.is_ready());

    client.initialize().await.unwrap();
    assert!(client.is_ready());
    assert!(data_dir.path().join("dpop-key.json").exists());

    let credential = client.auth().login("u", "p").await.unwrap();
    assert_eq!(client.auth_state().credential(), Some(credential.clone()));
    assert!(!credential.ciphertext.contains(&token));

    // The stored ciphertext decrypts back to exactly the issued token.
    client
        .dispatch(&RequestSpec::get("listPosts", "/posts"))
        .await
        .unwrap();
    assert_eq!(
        authorization_headers(&server, "/posts").await,
        vec![Some(format!("DPoP {}", token))]
    );

    // Login is exempt: proof only.
    assert_eq!(authorization_headers(&server, "/login").await, vec![None]);
}

#[tokio::test]
async fn exchange_stores_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/exchange"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("x.y.z")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.auth().exchange_social_login_cookie().await.unwrap();
    assert!(client.auth_state().has_credential());
}

#[tokio::test]
async fn session_survives_restart() {
    let server = MockServer::start().await;
    let token = token_expiring_in(3600, "kept");
    let data_dir = tempdir().unwrap();

    {
        mount_login(&server, &token).await;
        mount_current_user(&server).await;
        let client = persistent_client(&server, data_dir.path());
        client.auth().login("kim", "pw").await.unwrap();
        client.users().current().await.unwrap();
        client.save_session().await.unwrap();
    }

    mount_posts(&server).await;
    let restarted = persistent_client(&server, data_dir.path());
    assert!(restarted.restore_session().await.unwrap());
    assert_eq!(
        restarted.auth_state().user().map(|u| u.username),
        Some("kim".to_string())
    );

    restarted
        .dispatch(&RequestSpec::get("listPosts", "/posts"))
        .await
        .unwrap();
    assert_eq!(
        authorization_headers(&server, "/posts").await,
        vec![Some(format!("DPoP {}", token))]
    );
    assert_eq!(restarted.rotation().refresh_count(), 0);
}

#[tokio::test]
async fn logout_clears_everything_even_when_backend_fails() {
    let server = MockServer::start().await;
    let data_dir = tempdir().unwrap();
    mount_login(&server, &token_expiring_in(3600, "old")).await;
    mount_current_user(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = persistent_client(&server, data_dir.path());
    client.auth().login("kim", "pw").await.unwrap();
    client.users().current().await.unwrap();
    client.save_session().await.unwrap();
    let session_file = data_dir.path().join("session.json");
    assert!(session_file.exists());
    let old_thumbprint = client.key_thumbprint();

    client.auth().logout().await.unwrap();

    assert!(!client.auth_state().has_credential());
    assert!(!client.auth_state().is_logged_in());
    assert!(!client.is_ready());
    assert!(!data_dir.path().join("dpop-key.json").exists());
    assert!(!session_file.exists());
    assert_eq!(authorization_headers(&server, "/auth/logout").await, vec![None]);

    client.initialize().await.unwrap();
    assert_ne!(client.key_thumbprint(), old_thumbprint);
}

#[tokio::test]
async fn credential_from_before_logout_is_unusable() {
    let server = MockServer::start().await;
    let data_dir = tempdir().unwrap();
    mount_login(&server, &token_expiring_in(3600, "old")).await;
    mount_current_user(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = persistent_client(&server, data_dir.path());
    client.auth().login("kim", "pw").await.unwrap();
    client.users().current().await.unwrap();
    client.save_session().await.unwrap();
    let saved_session = data_dir.path().join("saved-session.json");
    std::fs::copy(data_dir.path().join("session.json"), &saved_session).unwrap();

    client.auth().logout().await.unwrap();

    // Replay the pre-logout session against the new key pair.
    let new = token_expiring_in(3600, "new");
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(&new)))
        .expect(1)
        .mount(&server)
        .await;
    mount_confirm(&server).await;
    mount_posts(&server).await;

    let replayed = HubClient::builder()
        .config(
            ClientConfig::default()
                .with_base_url(server.uri())
                .with_data_dir(data_dir.path()),
        )
        .session_file(&saved_session)
        .build()
        .unwrap();
    assert!(replayed.restore_session().await.unwrap());
    assert!(replayed.auth_state().has_credential());

    replayed
        .dispatch(&RequestSpec::get("listPosts", "/posts"))
        .await
        .unwrap();
    // The old ciphertext could not be decrypted, so it was dropped and rotated.
    assert_eq!(
        authorization_headers(&server, "/posts").await,
        vec![Some(format!("DPoP {}", new))]
    );
    server.verify().await;
}

#[tokio::test]
async fn undecryptable_credential_is_dropped_on_first_use() {
    let server = MockServer::start().await;
    let data_dir = tempdir().unwrap();
    mount_login(&server, &token_expiring_in(3600, "orphaned")).await;
    mount_posts(&server).await;

    // Signed in without fetching the profile, so no user marker is saved.
    let client = persistent_client(&server, data_dir.path());
    client.auth().login("kim", "pw").await.unwrap();
    client.save_session().await.unwrap();
    std::fs::remove_file(data_dir.path().join("dpop-key.json")).unwrap();

    let restarted = persistent_client(&server, data_dir.path());
    assert!(!restarted.restore_session().await.unwrap());
    assert!(restarted.auth_state().has_credential());

    let err = restarted
        .dispatch(&RequestSpec::get("listPosts", "/posts"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Dpop(ref e) if e.is_cipher()));
    assert!(!restarted.auth_state().has_credential());

    // The next call no longer trips over it.
    restarted
        .dispatch(&RequestSpec::get("listPosts", "/posts"))
        .await
        .unwrap();
    assert_eq!(authorization_headers(&server, "/posts").await, vec![None]);
    assert_eq!(restarted.rotation().refresh_count(), 0);
}

#[tokio::test]
async fn current_user_failure_clears_marker() {
    let server = MockServer::start().await;
    mount_login(&server, &token_expiring_in(3600, "t")).await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"username": "kim"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": "user.not_found"})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.auth().login("kim", "pw").await.unwrap();
    client.users().current().await.unwrap();
    assert!(client.auth_state().is_logged_in());

    let err = client.users().current().await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!client.auth_state().is_logged_in());
}

#[tokio::test]
async fn register_and_username_check() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": 201})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/exist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .users()
        .register(&hub_client::RegisterRequest {
            username: "kim".to_string(),
            password: "pw".to_string(),
            nickname: Some("Kim".to_string()),
            email: None,
        })
        .await
        .unwrap();

    assert!(!client.users().check_username_available("kim").await.unwrap());
    // Both calls are exempt.
    assert_eq!(authorization_headers(&server, "/user").await, vec![None]);
    server.verify().await;
}
