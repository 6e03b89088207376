//! Integration tests for the REST client against a mock HTTP backend.

mod common;

use common::make_jwt;
use maintrack::config::Config;
use maintrack::server::{ApiClient, ApiError, AuthApi};
use maintrack::session::RealtimeSession;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn login_posts_credentials_and_parses_the_payload() {
    common::init_logging();
    let server = MockServer::start().await;
    let token = make_jwt(3600);
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"username": "kbl", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "access_token": token,
            "refresh_token": "refresh-1",
            "data": {"id": "u-1", "username": "kbl"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).expect("client");
    let resp = client.login("kbl", "hunter2").await.expect("login");

    assert!(resp.success);
    assert_eq!(resp.access_token, token);
    assert_eq!(resp.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(resp.data.map(|u| u.id).as_deref(), Some("u-1"));
}

#[tokio::test]
async fn server_side_refusal_is_an_error_even_with_http_200() {
    common::init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "access_token": ""
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).expect("client");
    let result = client.login("kbl", "wrong").await;

    assert!(matches!(result, Err(ApiError::Rejected(_))));
}

#[tokio::test]
async fn refresh_propagates_http_status() {
    common::init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "stale"})))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).expect("client");
    let result = client.refresh("stale").await;

    assert!(matches!(result, Err(ApiError::Status(401))));
}

#[tokio::test]
async fn unread_sends_the_bearer_token_and_parses_the_envelope() {
    common::init_logging();
    let server = MockServer::start().await;
    let token = make_jwt(3600);
    Mock::given(method("GET"))
        .and(path("/notifications/unread"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notifications": [{
                "id": 9,
                "user_id": "u-1",
                "title": "Pending approval",
                "message": "EQ-0009 awaits review",
                "type": "warning",
                "timestamp": "2026-08-20T10:15:00Z",
                "is_read": false,
                "broadcast": false
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).expect("client");
    let frames = client.unread_notifications(&token).await.expect("unread");

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, Some(9));
    assert_eq!(frames[0].user_id.as_deref(), Some("u-1"));
}

#[tokio::test]
async fn mark_read_posts_the_notification_id() {
    common::init_logging();
    let server = MockServer::start().await;
    let token = make_jwt(3600);
    Mock::given(method("POST"))
        .and(path("/notifications/mark-read"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .and(body_json(json!({"id": 7})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri()).expect("client");
    client.mark_read(&token, 7).await.expect("acknowledged");
}

#[tokio::test]
async fn session_logs_in_and_out_over_real_http() {
    common::init_logging();
    let server = MockServer::start().await;
    let token = make_jwt(3600);
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "access_token": token,
            "refresh_token": "refresh-1",
            "data": {"id": "u-1", "username": "kbl"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notifications": [{
                "id": 1,
                "user_id": "u-1",
                "title": "Pending approval",
                "message": "EQ-0001 awaits review",
                "type": "info",
                "timestamp": "2026-08-20T10:15:00Z",
                "is_read": false,
                "broadcast": false
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(body_json(json!({"username": "kbl"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // The channel endpoint is unroutable; this test covers the REST side.
    let cfg = Config::new(server.uri(), "ws://127.0.0.1:1/ws/notifications");
    let session = RealtimeSession::new(cfg).expect("session");

    let user = session.login("kbl", "hunter2").await.expect("login");
    assert_eq!(user.username, "kbl");
    assert_eq!(session.unread_count(), 1);

    session.logout().await;
    assert!(session.user().is_none());
    assert_eq!(session.unread_count(), 0);
}
