//! Integration tests for the batch plugin

use crate::integration::test_utils::{json_response, raw_response, MockTransport};
use futures::future::join_all;
use querypipe::plugins::{BatchOptions, BatchPlugin};
use querypipe::{plugin_fn, Client, ClientOptions, OperationRequest, Plugin};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn batch_client(transport: Arc<MockTransport>, max_operation_count: usize) -> Client {
    batch_client_with(transport, max_operation_count, Vec::new())
}

fn batch_client_with(
    transport: Arc<MockTransport>,
    max_operation_count: usize,
    mut before: Vec<Arc<dyn Plugin>>,
) -> Client {
    before.push(Arc::new(BatchPlugin::new(
        transport,
        BatchOptions {
            max_operation_count,
            window: Duration::from_millis(10),
        },
    )));
    Client::new(ClientOptions::new("https://test.com/graphql").plugins(before)).unwrap()
}

/// Echo each operation's `$id` back at its position
fn echo_transport() -> Arc<MockTransport> {
    MockTransport::new(|request, _| {
        let entries: Vec<Value> = request
            .body
            .as_array()
            .map(|bodies| {
                bodies
                    .iter()
                    .map(|body| json!({ "data": { "id": body["variables"]["id"].clone() } }))
                    .collect()
            })
            .unwrap_or_default();
        Ok(json_response(200, &Value::Array(entries)))
    })
    .shared()
}

fn query(id: i64) -> OperationRequest {
    OperationRequest::new("query ($id: ID!) { post(id: $id) { id } }").with_variable("id", id)
}

#[tokio::test]
async fn test_operations_within_window_share_one_request() {
    let transport = echo_transport();
    let client = batch_client(Arc::clone(&transport), 10);

    let results = join_all((1..=3).map(|id| client.execute_query(query(id), None))).await;

    assert_eq!(transport.call_count(), 1);
    let request = &transport.requests()[0];
    assert_eq!(request.body.as_array().map(Vec::len), Some(3));
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().data, Some(json!({ "id": i + 1 })));
    }
}

#[tokio::test]
async fn test_max_operation_count_splits_batches() {
    let transport = echo_transport();
    let client = batch_client(Arc::clone(&transport), 2);

    let results = join_all((1..=5).map(|id| client.execute_query(query(id), None))).await;

    assert_eq!(transport.call_count(), 3);
    let sizes: Vec<usize> = transport
        .requests()
        .iter()
        .filter_map(|r| r.body.as_array().map(Vec::len))
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().data, Some(json!({ "id": i + 1 })));
    }
}

#[tokio::test]
async fn test_null_body_is_empty_response_for_every_operation() {
    let transport = MockTransport::new(|_, _| Ok(raw_response(200, "OK", "null"))).shared();
    let client = batch_client(transport, 10);

    let results = join_all((1..=2).map(|id| client.execute_query(query(id), None))).await;
    for result in results {
        assert_eq!(
            result.unwrap().error.unwrap().message(),
            "[Network] Received empty response"
        );
    }
}

#[tokio::test]
async fn test_per_operation_errors_on_server_error() {
    let transport = MockTransport::new(|_, _| {
        Ok(json_response(
            500,
            &json!([
                { "errors": [{ "message": "Not authenticated" }] },
                { "data": { "id": 2 } }
            ]),
        ))
    })
    .shared();
    let client = batch_client(transport, 10);

    let mut results = join_all((1..=2).map(|id| client.execute_query(query(id), None))).await;
    let second = results.pop().unwrap().unwrap();
    let first = results.pop().unwrap().unwrap();

    let first_error = first.error.unwrap();
    assert!(first_error.is_graphql_error());
    assert_eq!(first_error.message(), "[GraphQL] Not authenticated");

    // No entry-level errors, so the status itself is the error
    let second_error = second.error.unwrap();
    assert!(second_error.is_network_error());
    assert_eq!(second.data, Some(json!({ "id": 2 })));
}

#[tokio::test]
async fn test_headers_from_earlier_plugins_are_sent() {
    let transport = echo_transport();
    let auth = plugin_fn("auth", |ctx| {
        ctx.fetch_options_mut()
            .headers
            .insert("authorization".to_string(), "Bearer token".to_string());
    });
    let client = batch_client_with(Arc::clone(&transport), 10, vec![auth]);

    client.execute_query(query(1), None).await.unwrap();

    let request = &transport.requests()[0];
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer token")
    );
}

#[tokio::test]
async fn test_subscriptions_are_rejected() {
    let transport = echo_transport();
    let client = batch_client(Arc::clone(&transport), 10);

    // The batch plugin publishes a result, not a stream, for subscriptions
    let err = client
        .execute_subscription(OperationRequest::new("subscription { newMessages { id } }"), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        querypipe::ClientError::UnexpectedOutcome { expected: "subscription", .. }
    ));
    assert_eq!(transport.call_count(), 0);
}
