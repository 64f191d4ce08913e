// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Publish API tests against a mock DSPS server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dsps_client::{DspsClient, DspsConfig, DspsError, RetryConfig};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryConfig {
    RetryConfig::new(2, 0.001, 1.0, 0.0)
}

fn client_for(server: &MockServer) -> DspsClient {
    DspsClient::new(DspsConfig::reqwest(server.uri()).with_api_retry(fast_retry())).unwrap()
}

#[tokio::test]
async fn test_publish_sends_content_and_returns_server_ids() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/channel/chat/message/msg-1"))
        .and(body_json(json!({"hi": "hello"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"channelID": "chat", "messageID": "msg-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let msg = client
        .channel("chat")
        .publish(Some("msg-1"), &json!({"hi": "hello"}))
        .await
        .unwrap();

    assert_eq!(msg.channel_id, "chat");
    assert_eq!(msg.message_id, "msg-1");
    assert_eq!(msg.content, json!({"hi": "hello"}));
}

#[tokio::test]
async fn test_publish_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/channel/chat/message/msg-1"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/channel/chat/message/msg-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"channelID": "chat", "messageID": "msg-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let msg = client
        .channel("chat")
        .publish(Some("msg-1"), &json!(1))
        .await
        .unwrap();
    assert_eq!(msg.message_id, "msg-1");
}

#[tokio::test]
async fn test_publish_failure_reports_api_failed_event() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = Arc::new(AtomicU32::new(0));
    let counter = events.clone();
    client.add_api_failed_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let err = client
        .channel("chat")
        .publish(Some("msg-1"), &json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DspsError::Transport(_)));
    // One event after retries are exhausted, not one per attempt.
    assert_eq!(events.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_publish_sends_jwt_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/channel/chat/message/msg-1"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"channelID": "chat", "messageID": "msg-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = DspsClient::new(
        DspsConfig::reqwest(server.uri())
            .with_api_retry(fast_retry())
            .with_jwt("secret-token"),
    )
    .unwrap();
    client
        .channel("chat")
        .publish(Some("msg-1"), &json!(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_publish_generates_distinct_message_ids() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"channelID": "chat", "messageID": "x"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let channel = client.channel("chat");
    channel.publish(None, &json!(1)).await.unwrap();
    channel.publish(None, &json!(2)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0], paths[1]);
    for p in &paths {
        assert!(p.starts_with("/channel/chat/message/msg-"), "got {p}");
    }
}
