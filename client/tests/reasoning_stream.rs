//! Reasoning-stream reader tests against a mocked SSE endpoint.

use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lumen_client::stream::spawn_reasoning_stream;
use lumen_client::{ApiClient, ClientError};
use lumen_types::{ApiSettings, AuthToken};

fn client_for(server: &MockServer) -> ApiClient {
    let settings = ApiSettings::new(&server.uri(), Duration::from_secs(5)).unwrap();
    ApiClient::new(settings)
        .unwrap()
        .with_token(AuthToken::new("tok-stream").unwrap())
}

async fn mount_stream_body(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/v1/system/runtime/reasoning-stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn records_arrive_in_wire_order() {
    let server = MockServer::start().await;
    let body = "\
event: thought_start\ndata: {\"thought_id\":\"h1\",\"task_id\":\"t1\",\"seq\":1}\n\n\
event: planning\ndata: {\"thought_id\":\"h1\",\"task_id\":\"t1\",\"seq\":2}\n\n\
event: conclusion\ndata: {\"thought_id\":\"h1\",\"task_id\":\"t1\",\"seq\":3}\n\n";
    mount_stream_body(&server, body.to_owned()).await;

    let (tx, mut rx) = mpsc::channel(16);
    client_for(&server).stream_reasoning(tx).await.unwrap();

    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }

    let events: Vec<&str> = records.iter().map(|r| r.event.as_str()).collect();
    assert_eq!(events, ["thought_start", "planning", "conclusion"]);
    let seqs: Vec<u64> = records
        .iter()
        .map(|r| r.payload["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, [1, 2, 3]);
}

#[tokio::test]
async fn malformed_json_records_are_dropped_not_fatal() {
    let server = MockServer::start().await;
    let body = "\
event: planning\ndata: {\"thought_id\":\"h1\",\"task_id\":\"t1\"}\n\n\
event: step_update\ndata: {broken\n\n\
event: conclusion\ndata: {\"thought_id\":\"h1\",\"task_id\":\"t1\"}\n\n";
    mount_stream_body(&server, body.to_owned()).await;

    let (tx, mut rx) = mpsc::channel(16);
    client_for(&server).stream_reasoning(tx).await.unwrap();

    let mut events = Vec::new();
    while let Some(record) = rx.recv().await {
        events.push(record.event);
    }
    assert_eq!(events, ["planning", "conclusion"]);
}

#[tokio::test]
async fn multiline_data_is_joined_before_parsing() {
    let server = MockServer::start().await;
    // A JSON object split across two data: lines is still one record.
    let body = "event: planning\ndata: {\"thought_id\":\"h1\",\ndata: \"task_id\":\"t1\"}\n\n";
    mount_stream_body(&server, body.to_owned()).await;

    let (tx, mut rx) = mpsc::channel(16);
    client_for(&server).stream_reasoning(tx).await.unwrap();

    let record = rx.recv().await.unwrap();
    assert_eq!(record.payload["task_id"], "t1");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn unauthorized_connect_fails_before_any_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/system/runtime/reasoning-stream"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"message": "Unauthorized"})),
        )
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    let err = client_for(&server).stream_reasoning(tx).await.unwrap_err();
    assert!(err.is_definitive_auth_failure());
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn missing_endpoint_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/system/runtime/reasoning-stream"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let (tx, _rx) = mpsc::channel(16);
    let err = client_for(&server).stream_reasoning(tx).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { .. }));
}

#[tokio::test]
async fn abort_releases_a_pending_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/system/runtime/reasoning-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("event: planning\ndata: {}\n\n")
                .insert_header("content-type", "text/event-stream")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let (tx, _rx) = mpsc::channel(16);
    let handle = spawn_reasoning_stream(client_for(&server), tx);
    handle.abort();

    // The abort unwinds the in-flight connect; no error surfaces anywhere.
    tokio::time::timeout(Duration::from_secs(5), handle.finished())
        .await
        .expect("aborted stream task should finish promptly");
}

#[tokio::test]
async fn receiver_drop_ends_the_stream_without_error() {
    let server = MockServer::start().await;
    let mut body = String::new();
    for n in 0..50 {
        body.push_str(&format!(
            "event: step_update\ndata: {{\"thought_id\":\"h1\",\"task_id\":\"t1\",\"n\":{n}}}\n\n"
        ));
    }
    mount_stream_body(&server, body).await;

    let (tx, mut rx) = mpsc::channel(1);
    let client = client_for(&server);
    let reader = tokio::spawn(async move { client.stream_reasoning(tx).await });

    // Take one record, then walk away.
    let first = rx.recv().await.unwrap();
    assert_eq!(first.payload["n"], 0);
    drop(rx);

    let result = reader.await.unwrap();
    assert!(result.is_ok());
}
