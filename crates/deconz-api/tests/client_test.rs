// Integration tests for `ApiClient` using wiremock.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deconz_api::{ApiClient, ClientConfig, ClientEvent, Error};

// ── Helpers ─────────────────────────────────────────────────────────

const KEY: &str = "0123456789ABCDEF";

fn config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::new(server.uri());
    config.retry_delay = Duration::from_millis(1);
    config.put_delay = Duration::ZERO;
    config.group_put_delay = Duration::ZERO;
    config
}

async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::with_client(
        reqwest::Client::new(),
        config(&server).with_api_key(SecretString::from(KEY.to_owned())),
    )
    .unwrap();
    (server, client)
}

async fn setup_without_key() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::with_client(reqwest::Client::new(), config(&server)).unwrap();
    (server, client)
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_resource() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{KEY}/lights/1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Desk",
            "state": {"on": true, "bri": 254}
        })))
        .mount(&server)
        .await;

    let light = client.get("/lights/1").await.unwrap();
    assert_eq!(light["name"], "Desk");
}

#[tokio::test]
async fn test_get_leaf_projects_attribute() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{KEY}/lights/1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": {"on": true, "bri": 254}
        })))
        .expect(2)
        .mount(&server)
        .await;

    assert_eq!(client.get("/lights/1/state/on").await.unwrap(), json!(true));

    let err = client.get("/lights/1/state/ct").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert!(matches!(err, Error::NotFound { ref path } if path == "/state/ct"));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_put_success_envelope() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/lights/1/state")))
        .and(body_json(json!({"on": true, "bri": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": {"/lights/1/state/on": true}},
            {"success": {"/lights/1/state/bri": 100}}
        ])))
        .mount(&server)
        .await;

    let response = client
        .put("/lights/1/state", json!({"on": true, "bri": 100}))
        .await
        .unwrap();

    assert_eq!(
        response.success_at("/lights/1/state"),
        Some(&json!({"on": true, "bri": 100}))
    );
    assert!(response.errors.is_empty());
}

#[tokio::test]
async fn test_put_non_critical_error_is_collected() {
    let (server, client) = setup().await;
    let mut events = client.subscribe();

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/lights/1/state")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": {"/lights/1/state/on": true}},
            {"error": {"type": 201, "address": "/lights/1/state/bri", "description": "parameter, bri, is not modifiable. Device is set to off."}}
        ])))
        .mount(&server)
        .await;

    let response = client
        .put("/lights/1/state", json!({"on": false, "bri": 1}))
        .await
        .unwrap();

    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, 201);
    assert_eq!(response.success_at("/lights/1/state/on"), Some(&json!(true)));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Error {
            api_type, fatal, ..
        } = event
        {
            assert_eq!(api_type, Some(201));
            assert!(!fatal);
            saw_error = true;
        }
    }
    assert!(saw_error, "non-critical error was not observed");
}

#[tokio::test]
async fn test_put_critical_error_fails() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/lights/9/state")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"error": {"type": 3, "address": "/lights/9", "description": "resource, /lights/9, not available"}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .put("/lights/9/state", json!({"on": true}))
        .await
        .unwrap_err();
    assert_eq!(err.api_error_type(), Some(3));
    assert!(err.is_not_found());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_errors_after_critical_one_are_observed() {
    let (server, client) = setup().await;
    let mut events = client.subscribe();

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/lights/9/state")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"error": {"type": 3, "address": "/lights/9", "description": "resource, /lights/9, not available"}},
            {"error": {"type": 201, "address": "/lights/9/state/bri", "description": "parameter, bri, is not modifiable. Device is set to off."}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .put("/lights/9/state", json!({"on": true, "bri": 1}))
        .await
        .unwrap_err();
    assert_eq!(err.api_error_type(), Some(3));

    let mut observed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Error {
            api_type, fatal, ..
        } = event
        {
            observed.push((api_type, fatal));
        }
    }
    observed.sort_unstable();
    assert_eq!(observed, vec![(Some(3), true), (Some(201), false)]);
}

#[tokio::test]
async fn test_unauthorized_key() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{KEY}/config")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!([
            {"error": {"type": 1, "address": "/", "description": "unauthorized user"}}
        ])))
        .mount(&server)
        .await;

    let err = client.get("/config").await.unwrap_err();
    assert!(err.is_unauthorized(), "got {err:?}");
}

// ── Retry ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_503_is_resent() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{KEY}/sensors")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{KEY}/sensors")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.get("/sensors").await.unwrap(), json!({}));
}

#[tokio::test]
async fn test_overload_error_is_resent() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/groups/0/action")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"error": {"type": 901, "address": "/groups/0/action", "description": "overloaded"}}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/groups/0/action")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": {"/groups/0/action/on": true}}
        ])))
        .mount(&server)
        .await;

    let response = client
        .put("/groups/0/action", json!({"on": true}))
        .await
        .unwrap();
    assert_eq!(response.success_at("/groups/0/action/on"), Some(&json!(true)));
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let (server, client) = setup().await;
    let mut events = client.subscribe();

    Mock::given(method("GET"))
        .and(path(format!("/api/{KEY}/lights")))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let err = client.get("/lights").await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 503, .. }), "got {err:?}");

    let mut retrying = 0;
    let mut fatal = 0;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Error {
            retrying: r,
            fatal: f,
            ..
        } = event
        {
            retrying += usize::from(r);
            fatal += usize::from(f);
        }
    }
    assert_eq!(retrying, 4);
    assert_eq!(fatal, 1);
}

// ── Keys ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gateway_info_without_key() {
    let (server, client) = setup_without_key().await;

    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bridgeid": "00212EFFFF012345",
            "apiversion": "1.16.0",
            "name": "Phoscon-GW",
            "swversion": "2.26.3"
        })))
        .mount(&server)
        .await;

    let info = client.gateway_info().await.unwrap();
    assert_eq!(info.bridge_id, "00212EFFFF012345");
    assert_eq!(info.sw_version.as_deref(), Some("2.26.3"));
}

#[tokio::test]
async fn test_create_key_while_locked() {
    let (server, client) = setup_without_key().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_json(json!({"devicetype": "deconz-sync"})))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!([
            {"error": {"type": 101, "address": "", "description": "link button not pressed"}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.create_api_key("deconz-sync").await.unwrap_err();
    assert!(err.is_gateway_locked(), "got {err:?}");
    assert_eq!(err.api_error_type(), Some(101));
    assert!(!client.has_api_key());
}

#[tokio::test]
async fn test_create_and_delete_key() {
    let (server, client) = setup_without_key().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": {"username": "NEWKEY1234"}}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/NEWKEY1234/config/whitelist/NEWKEY1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": "/config/whitelist/NEWKEY1234 deleted."}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let key = client.create_api_key("deconz-sync").await.unwrap();
    assert_eq!(key.expose_secret(), "NEWKEY1234");
    assert!(client.has_api_key());

    client.delete_api_key().await.unwrap();
    assert!(!client.has_api_key());

    let err = client.delete_api_key().await.unwrap_err();
    assert!(matches!(err, Error::NoApiKey));
}

#[tokio::test]
async fn test_unlock() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(format!("/api/{KEY}/config")))
        .and(body_json(json!({"unlock": 60})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"success": {"/config/unlock": 60}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    client.unlock().await.unwrap();
}
