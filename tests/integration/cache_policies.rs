//! Integration tests for cache policies over the default chain

use crate::integration::test_utils::{json_response, posts_body, MockTransport, POSTS_QUERY};
use parking_lot::Mutex;
use querypipe::plugins::default_plugins;
use querypipe::{CachePolicy, Client, ClientOptions, OperationRequest, QueryContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SETTLE: Option<Duration> = Some(Duration::from_secs(2));

fn client_over(transport: Arc<MockTransport>) -> Client {
    Client::new(ClientOptions::new("https://test.com/graphql").plugins(default_plugins(transport)))
        .unwrap()
}

/// Transport that answers `{ count: <call index> }`
fn counting_transport() -> Arc<MockTransport> {
    MockTransport::new(|_, index| Ok(json_response(200, &json!({ "data": { "count": index } }))))
        .shared()
}

#[tokio::test]
async fn test_cache_first_serves_second_call_from_cache() {
    let transport = MockTransport::always_json(200, posts_body()).shared();
    let client = client_over(Arc::clone(&transport));

    let first = client
        .execute_query(OperationRequest::new(POSTS_QUERY), None)
        .await
        .unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();
    let second = client
        .execute_query(OperationRequest::new(POSTS_QUERY), None)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.data, posts_body().get("data").cloned());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_cache_only_miss_returns_empty_without_network() {
    let transport = MockTransport::always_json(200, posts_body()).shared();
    let client = client_over(Arc::clone(&transport));

    let result = client
        .execute_query(
            OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::CacheOnly),
            None,
        )
        .await
        .unwrap();

    assert!(result.data.is_none());
    assert!(result.error.is_none());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_cache_only_hit_after_network_fill() {
    let transport = MockTransport::always_json(200, posts_body()).shared();
    let client = client_over(Arc::clone(&transport));

    client
        .execute_query(OperationRequest::new(POSTS_QUERY), None)
        .await
        .unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();

    let cached = client
        .execute_query(
            OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::CacheOnly),
            None,
        )
        .await
        .unwrap();
    assert_eq!(cached.data, posts_body().get("data").cloned());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_network_only_always_fetches() {
    let transport = counting_transport();
    let client = client_over(Arc::clone(&transport));
    let request = || OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::NetworkOnly);

    let first = client.execute_query(request(), None).await.unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();
    let second = client.execute_query(request(), None).await.unwrap();

    assert_eq!(first.data, Some(json!({ "count": 0 })));
    assert_eq!(second.data, Some(json!({ "count": 1 })));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_network_only_does_not_populate_cache() {
    let transport = counting_transport();
    let client = client_over(Arc::clone(&transport));

    client
        .execute_query(
            OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::NetworkOnly),
            None,
        )
        .await
        .unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();

    let cached = client
        .execute_query(
            OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::CacheOnly),
            None,
        )
        .await
        .unwrap();
    assert!(cached.data.is_none());
}

#[tokio::test]
async fn test_cache_and_network_serves_cache_then_refreshes() {
    let transport = counting_transport();
    let client = client_over(Arc::clone(&transport));

    let first = client
        .execute_query(OperationRequest::new(POSTS_QUERY), None)
        .await
        .unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();
    assert_eq!(first.data, Some(json!({ "count": 0 })));

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    let context = QueryContext::new().on_result_changed(move |outcome| {
        sink.lock().push(outcome.as_result().and_then(|r| r.data.clone()));
    });
    let immediate = client
        .execute_query(
            OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::CacheAndNetwork),
            Some(context),
        )
        .await
        .unwrap();
    assert_eq!(immediate.data, Some(json!({ "count": 0 })));

    client.wait_for_idle(SETTLE).await.unwrap();
    assert_eq!(changes.lock().as_slice(), &[Some(json!({ "count": 1 }))]);
    assert_eq!(transport.call_count(), 2);

    // The refreshed value replaced the cached one
    let cached = client
        .execute_query(
            OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::CacheOnly),
            None,
        )
        .await
        .unwrap();
    assert_eq!(cached.data, Some(json!({ "count": 1 })));
}

#[tokio::test]
async fn test_variables_partition_cache_regardless_of_order() {
    let transport = counting_transport();
    let client = client_over(Arc::clone(&transport));
    let query = "query ($a: Int, $b: Int) { sum(a: $a, b: $b) }";

    client
        .execute_query(
            OperationRequest::new(query).with_variable("a", 1).with_variable("b", 2),
            None,
        )
        .await
        .unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();

    // Same variables, different insertion order: cache hit
    client
        .execute_query(
            OperationRequest::new(query).with_variable("b", 2).with_variable("a", 1),
            None,
        )
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 1);

    // Different values: miss
    client
        .execute_query(
            OperationRequest::new(query).with_variable("a", 1).with_variable("b", 3),
            None,
        )
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_mutations_are_never_cached() {
    let transport = counting_transport();
    let client = client_over(Arc::clone(&transport));
    let mutation = "mutation { likePost(id: 1) { likes } }";

    client
        .execute_mutation(OperationRequest::new(mutation), None)
        .await
        .unwrap();
    client.wait_for_idle(SETTLE).await.unwrap();
    let second = client
        .execute_mutation(OperationRequest::new(mutation), None)
        .await
        .unwrap();

    assert_eq!(second.data, Some(json!({ "count": 1 })));
    assert_eq!(transport.call_count(), 2);
}
