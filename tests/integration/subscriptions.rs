//! Integration tests for subscription forwarding

use crate::integration::test_utils::{posts_body, MockTransport, POSTS_QUERY};
use futures::StreamExt;
use querypipe::error::NetworkError;
use querypipe::plugins::{FetchPlugin, SubscriptionPlugin};
use parking_lot::Mutex;
use querypipe::{
    Client, ClientError, ClientOptions, GraphQLError, OperationRequest, QueryContext,
    StandardResult,
};
use serde_json::json;
use std::sync::Arc;

const SUBSCRIPTION: &str = "subscription { newMessages { id text } }";

#[tokio::test]
async fn test_stream_items_are_normalized() {
    let subscription = SubscriptionPlugin::new(|operation, _| {
        assert_eq!(operation.query_text().unwrap(), SUBSCRIPTION);
        futures::stream::iter(vec![
            Ok(StandardResult {
                data: Some(json!({ "newMessages": { "id": 1, "text": "hi" } })),
                errors: None,
            }),
            Ok(StandardResult {
                data: None,
                errors: Some(vec![GraphQLError::new("Channel closed")]),
            }),
            Err(NetworkError::Stream("socket reset".into())),
        ])
        .boxed()
    });
    let client = Client::new(
        ClientOptions::new("https://test.com/graphql").plugins(vec![Arc::new(subscription)]),
    )
    .unwrap();

    let items: Vec<_> = client
        .execute_subscription(OperationRequest::new(SUBSCRIPTION), None)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(
        items[0].data,
        Some(json!({ "newMessages": { "id": 1, "text": "hi" } }))
    );
    assert!(items[0].error.is_none());
    assert_eq!(
        items[1].error.as_ref().map(|e| e.message()),
        Some("[GraphQL] Channel closed".to_string())
    );
    assert_eq!(
        items[2].error.as_ref().map(|e| e.message()),
        Some("[Network] socket reset".to_string())
    );
}

#[tokio::test]
async fn test_forwarder_receives_merged_headers() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let subscription = SubscriptionPlugin::new(move |_, options| {
        *sink.lock() = Some((options.url.clone(), options.headers.clone()));
        futures::stream::empty().boxed()
    });
    let client = Client::new(
        ClientOptions::new("https://test.com/graphql")
            .header("x-client", "querypipe")
            .plugins(vec![Arc::new(subscription)]),
    )
    .unwrap();

    let items: Vec<_> = client
        .execute_subscription(
            OperationRequest::new(SUBSCRIPTION),
            Some(QueryContext::new().header("authorization", "Bearer sub")),
        )
        .await
        .unwrap()
        .collect()
        .await;
    assert!(items.is_empty());

    let (url, headers) = seen.lock().clone().unwrap();
    assert_eq!(url, "https://test.com/graphql");
    assert_eq!(headers.get("authorization").map(String::as_str), Some("Bearer sub"));
    assert_eq!(headers.get("x-client").map(String::as_str), Some("querypipe"));
}

#[tokio::test]
async fn test_missing_forwarder_is_fatal() {
    let client = Client::new(
        ClientOptions::new("https://test.com/graphql")
            .plugins(vec![Arc::new(SubscriptionPlugin::default())]),
    )
    .unwrap();

    let err = client
        .execute_subscription(OperationRequest::new(SUBSCRIPTION), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ClientError::NoSubscriptionForwarder));
    assert_eq!(err.to_string(), "No subscription forwarder was set");
}

#[tokio::test]
async fn test_queries_pass_through_to_fetch() {
    let transport = MockTransport::always_json(200, posts_body()).shared();
    let client = Client::new(ClientOptions::new("https://test.com/graphql").plugins(vec![
        Arc::new(SubscriptionPlugin::default()),
        Arc::new(FetchPlugin::new(transport.clone())),
    ]))
    .unwrap();

    let result = client
        .execute_query(OperationRequest::new(POSTS_QUERY), None)
        .await
        .unwrap();
    assert_eq!(result.data, posts_body().get("data").cloned());
    assert_eq!(transport.call_count(), 1);
}
