//! Integration tests for in-flight query deduplication

use crate::integration::test_utils::{json_response, posts_body, MockTransport, POSTS_QUERY};
use futures::future::join_all;
use querypipe::error::TransportError;
use querypipe::plugins::default_plugins;
use querypipe::{CachePolicy, Client, ClientOptions, OperationRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client_over(transport: Arc<MockTransport>) -> Client {
    Client::new(ClientOptions::new("https://test.com/graphql").plugins(default_plugins(transport)))
        .unwrap()
}

#[tokio::test]
async fn test_concurrent_identical_queries_share_one_request() {
    let transport = MockTransport::always_json(200, posts_body())
        .with_delay(Duration::from_millis(50))
        .shared();
    let client = client_over(Arc::clone(&transport));

    let calls = (0..5).map(|_| {
        let client = client.clone();
        async move {
            client
                .execute_query(
                    OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::NetworkOnly),
                    None,
                )
                .await
        }
    });
    let results = join_all(calls).await;

    assert_eq!(transport.call_count(), 1);
    for result in results {
        assert_eq!(result.unwrap().data, posts_body().get("data").cloned());
    }
}

#[tokio::test]
async fn test_followers_share_leader_failure() {
    let transport = MockTransport::new(|_, _| Err(TransportError::Connect("refused".into())))
        .with_delay(Duration::from_millis(30))
        .shared();
    let client = client_over(Arc::clone(&transport));

    let calls = (0..3).map(|_| client.execute_query(OperationRequest::new(POSTS_QUERY), None));
    let results = join_all(calls).await;

    assert_eq!(transport.call_count(), 1);
    for result in results {
        let error = result.unwrap().error.unwrap();
        assert!(error.is_network_error());
        assert_eq!(error.message(), "[Network] Connection error: refused");
    }
}

#[tokio::test]
async fn test_different_variables_are_not_deduplicated() {
    let transport = MockTransport::new(|request, _| {
        let id = request.body["variables"]["id"].clone();
        Ok(json_response(200, &json!({ "data": { "post": { "id": id } } })))
    })
    .with_delay(Duration::from_millis(20))
    .shared();
    let client = client_over(Arc::clone(&transport));
    let query = "query ($id: ID!) { post(id: $id) { id } }";

    let calls = (1..=3).map(|id| {
        client.execute_query(OperationRequest::new(query).with_variable("id", id), None)
    });
    let results = join_all(calls).await;

    assert_eq!(transport.call_count(), 3);
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(
            result.unwrap().data,
            Some(json!({ "post": { "id": i + 1 } }))
        );
    }
}

#[tokio::test]
async fn test_pending_entry_cleared_after_settlement() {
    let transport = MockTransport::always_json(200, posts_body())
        .with_delay(Duration::from_millis(10))
        .shared();
    let client = client_over(Arc::clone(&transport));
    let request = || OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::NetworkOnly);

    client.execute_query(request(), None).await.unwrap();
    client.wait_for_idle(Some(Duration::from_secs(2))).await.unwrap();
    client.execute_query(request(), None).await.unwrap();

    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_mutations_each_reach_the_network() {
    let transport = MockTransport::always_json(200, json!({ "data": { "likePost": { "likes": 1 } } }))
        .with_delay(Duration::from_millis(20))
        .shared();
    let client = client_over(Arc::clone(&transport));

    let calls = (0..3).map(|_| {
        client.execute_mutation(OperationRequest::new("mutation { likePost(id: 1) { likes } }"), None)
    });
    for result in join_all(calls).await {
        assert!(result.unwrap().is_ok());
    }
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_abandoned_leader_still_serves_followers() {
    fn request() -> OperationRequest {
        OperationRequest::new(POSTS_QUERY).with_cache_policy(CachePolicy::NetworkOnly)
    }

    let transport = MockTransport::always_json(200, posts_body())
        .with_delay(Duration::from_millis(50))
        .shared();
    let client = client_over(Arc::clone(&transport));

    let leader = {
        let client = client.clone();
        tokio::spawn(async move {
            tokio::time::timeout(Duration::from_millis(10), client.execute_query(request(), None))
                .await
                .is_err()
        })
    };
    tokio::time::sleep(Duration::from_millis(2)).await;
    let followers = join_all((0..3).map(|_| client.execute_query(request(), None))).await;

    assert!(leader.await.unwrap(), "leader should give up before the response");
    for result in followers {
        assert_eq!(result.unwrap().data, posts_body().get("data").cloned());
    }
    client.wait_for_idle(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(transport.call_count(), 1);
}
