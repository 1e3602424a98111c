//! Bucket lifecycle: idempotent upsert with active-polling and guarded
//! deletes.

use cascade::client::bucket::{bucket_name, BucketClient};
use cascade::http::auth::Auth;
use cascade::http::{ClientOptions, RestClient};
use cascade::project::Coordinate;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bucket_client(server: &MockServer) -> BucketClient {
    BucketClient::Live {
        rest: Arc::new(
            RestClient::new(server.uri(), Auth::None, ClientOptions::default()).unwrap(),
        ),
    }
}

fn coordinate() -> Coordinate {
    Coordinate::new("proj", "bucket", "audit-logs")
}

#[tokio::test]
async fn upsert_puts_by_name_and_polls_until_active() {
    let server = MockServer::start().await;
    let name = bucket_name("proj", "audit-logs");
    let bucket_path = format!("/platform/storage/management/v1/bucket-definitions/{name}");

    Mock::given(method("PUT"))
        .and(path(bucket_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucketName": name,
            "status": "creating"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(bucket_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucketName": name,
            "status": "creating"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(bucket_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucketName": name,
            "status": "active"
        })))
        .mount(&server)
        .await;

    let client = bucket_client(&server);
    let entity = client
        .upsert(
            &coordinate(),
            &name,
            &serde_json::json!({"table": "logs", "retentionDays": 35}),
        )
        .await
        .unwrap();

    assert_eq!(entity.id, name);
    // PUT + not-yet-active GET + active GET
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    let put = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
    assert_eq!(body.get("bucketName").unwrap(), name.as_str());
}

#[tokio::test]
async fn delete_waits_for_the_bucket_to_disappear() {
    let server = MockServer::start().await;
    let name = bucket_name("proj", "audit-logs");
    let bucket_path = format!("/platform/storage/management/v1/bucket-definitions/{name}");

    Mock::given(method("DELETE"))
        .and(path(bucket_path.as_str()))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(bucket_path.as_str()))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let client = bucket_client(&server);
    client.delete(&coordinate(), &name).await.unwrap();
}

#[tokio::test]
async fn built_in_buckets_are_never_deleted() {
    let server = MockServer::start().await;

    let client = bucket_client(&server);
    client
        .delete(&coordinate(), "default_logs")
        .await
        .unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}
