//! Settings-object upsert semantics: external ids, conflict retries, and
//! in-place updates of imported objects.

use cascade::client::settings::{external_id, SettingsClient};
use cascade::http::auth::Auth;
use cascade::http::retry::RetryConfig;
use cascade::http::{ClientOptions, RestClient};
use cascade::project::Coordinate;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_client(server: &MockServer) -> SettingsClient {
    let options = ClientOptions {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        },
        ..ClientOptions::default()
    };
    SettingsClient::Live {
        rest: Arc::new(RestClient::new(server.uri(), Auth::None, options).unwrap()),
    }
}

fn coordinate() -> Coordinate {
    Coordinate::new("proj", "settings-schema", "user-provided-id")
}

#[tokio::test]
async fn upsert_posts_exactly_one_record_with_the_derived_external_id() {
    let server = MockServer::start().await;

    let expected_external_id = external_id("builtin:alerting.profile", "user-provided-id");
    Mock::given(method("POST"))
        .and(path("/api/v2/settings/objects"))
        .and(body_json(serde_json::json!([{
            "externalId": expected_external_id,
            "scope": "tenant",
            "schemaId": "builtin:alerting.profile",
            "value": {}
        }])))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"objectId": "x"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = settings_client(&server);
    let entity = client
        .upsert(
            &coordinate(),
            "builtin:alerting.profile",
            None,
            "tenant",
            "user-provided-id",
            None,
            &serde_json::json!({}),
        )
        .await
        .unwrap();

    assert_eq!(entity.id, "x");
}

#[tokio::test]
async fn upsert_conflict_is_retried_until_it_lands() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(409).set_body_string("concurrent modification"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"objectId": "y"}])),
        )
        .mount(&server)
        .await;

    let client = settings_client(&server);
    let entity = client
        .upsert(
            &coordinate(),
            "builtin:tagging",
            None,
            "environment",
            "n",
            None,
            &serde_json::json!({"enabled": true}),
        )
        .await
        .unwrap();

    assert_eq!(entity.id, "y");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn origin_object_id_updates_in_place() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v2/settings/objects/origin-123"))
        .and(body_json(serde_json::json!({
            "value": {"enabled": false},
            "schemaVersion": "1.2"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"objectId": "origin-123"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = settings_client(&server);
    let entity = client
        .upsert(
            &coordinate(),
            "builtin:tagging",
            Some("1.2"),
            "environment",
            "n",
            Some("origin-123"),
            &serde_json::json!({"enabled": false}),
        )
        .await
        .unwrap();

    assert_eq!(entity.id, "origin-123");
    // No POST happened
    let posts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.to_string().eq_ignore_ascii_case("POST"))
        .count();
    assert_eq!(posts, 0);
}

#[tokio::test]
async fn non_conflict_errors_surface_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(400).set_body_string("schema violation"))
        .expect(1)
        .mount(&server)
        .await;

    let client = settings_client(&server);
    let error = client
        .upsert(
            &coordinate(),
            "builtin:tagging",
            None,
            "environment",
            "n",
            None,
            &serde_json::json!({}),
        )
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(400));
}
